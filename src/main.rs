mod args;

use args::Args;
use img_recog::locator::TemplateParams;
use img_recog::{ImgRecogEngine, LocatorSpec, RecogResult, ResolvedElement, ScreenProfile};

fn main() {
    let Some(args) = Args::parse() else {
        return;
    };

    let default_filter = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::debug!("Starting with {args:?}");
    if let Err(e) = run(&args) {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> RecogResult<()> {
    let defaults = TemplateParams::default();
    let params = TemplateParams {
        match_threshold: args.threshold.unwrap_or(defaults.match_threshold),
        resize_factor: args.factor.unwrap_or(defaults.resize_factor),
        resize_max_attempts: args.attempts.unwrap_or(defaults.resize_max_attempts),
        ..defaults
    };
    let mut builder = LocatorSpec::builder(params).template_path(args.template.clone());
    if let Some(cutout) = args.cutout {
        builder = builder.cutout(cutout);
    }
    let spec = builder.build()?;

    let screen = ScreenProfile {
        window_size: args.window,
        ..ScreenProfile::default()
    };
    let engine = ImgRecogEngine::new(screen);

    let screenshot = image::open(&args.source)?;
    println!(
        "📸 Screenshot {} ({}x{})",
        args.source.display(),
        screenshot.width(),
        screenshot.height()
    );

    if args.find_all {
        let elements = engine.find_elements(&spec, &screenshot)?;
        if elements.is_empty() {
            println!("❌ No match for {}", args.template.display());
        }
        for (i, element) in elements.iter().enumerate() {
            print_element(&format!("#{}", i + 1), element);
        }
    } else {
        match engine.find_element(&spec, &screenshot)? {
            Some(element) => print_element("Found", &element),
            None => println!("❌ No match for {}", args.template.display()),
        }
    }
    Ok(())
}

fn print_element(label: &str, element: &ResolvedElement) {
    let rect = element.rect();
    let centre = element.centre();
    println!(
        "✅ {label}: x={} y={} w={} h={} centre=({}, {}) score={:.4}",
        rect.x,
        rect.y,
        rect.width,
        rect.height,
        centre.x,
        centre.y,
        element.score()
    );
}
