use img_recog::{FractionalRectangle, Size};
use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Args {
    pub source: PathBuf,
    pub template: PathBuf,
    pub threshold: Option<f32>,
    pub factor: Option<f64>,
    pub attempts: Option<u32>,
    pub cutout: Option<FractionalRectangle>,
    pub window: Option<Size>,
    pub find_all: bool,
    pub debug_mode: bool,
}

impl Args {
    pub fn parse() -> Option<Self> {
        let args: Vec<String> = env::args().collect();

        let mut source: Option<PathBuf> = None;
        let mut template: Option<PathBuf> = None;
        let mut threshold: Option<f32> = None;
        let mut factor: Option<f64> = None;
        let mut attempts: Option<u32> = None;
        let mut cutout: Option<FractionalRectangle> = None;
        let mut window: Option<Size> = None;
        let mut find_all = false;
        let mut debug_mode = false;

        for arg in args.iter().skip(1) {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "Img Recog v{} (built {})",
                    env!("IMG_RECOG_VERSION"),
                    env!("IMG_RECOG_BUILD_YEAR")
                );
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--all" {
                find_all = true;
            } else if let Some(val) = arg.strip_prefix("--source=") {
                source = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--template=") {
                template = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--threshold=") {
                threshold = Some(parse_value("threshold", val)?);
            } else if let Some(val) = arg.strip_prefix("--factor=") {
                factor = Some(parse_value("factor", val)?);
            } else if let Some(val) = arg.strip_prefix("--attempts=") {
                attempts = Some(parse_value("attempts", val)?);
            } else if let Some(val) = arg.strip_prefix("--cutout=") {
                match FractionalRectangle::parse("cutout", val) {
                    Ok(rect) => cutout = Some(rect),
                    Err(e) => {
                        eprintln!("❌ {e}");
                        return None;
                    }
                }
            } else if let Some(val) = arg.strip_prefix("--window=") {
                window = Some(parse_window(val)?);
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        let (Some(source), Some(template)) = (source, template) else {
            eprintln!("❌ Both --source and --template are required");
            print_help();
            return None;
        };

        Some(Args {
            source,
            template,
            threshold,
            factor,
            attempts,
            cutout,
            window,
            find_all,
            debug_mode,
        })
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, val: &str) -> Option<T> {
    match val.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("❌ Invalid {} value: {}", name, val);
            None
        }
    }
}

fn parse_window(val: &str) -> Option<Size> {
    let parsed = val
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some(Size::new(w.trim().parse().ok()?, h.trim().parse().ok()?)));
    if parsed.is_none() {
        eprintln!("❌ Invalid window size: {} (expected WIDTHxHEIGHT)", val);
    }
    parsed
}

fn print_help() {
    println!("🔍 Img Recog: locate a template in a screenshot");
    println!();
    println!("USAGE:");
    println!("    img-recog --source=<png> --template=<png> [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    --source=PATH       Screenshot to search");
    println!("    --template=PATH     Image of the element to find");
    println!("    --threshold=N       Minimum correlation score, 0.0 to 1.0 (default 0.8)");
    println!("    --factor=N          Scale step between attempts, > 1 (default 1.052)");
    println!("    --attempts=N        Grow/shrink steps besides the original scale (default 4)");
    println!("    --cutout=x,y,w,h    Only search this fraction of the screenshot");
    println!("    --window=WxH        Device window size, to map results onto the screen");
    println!("    --all               List every match instead of the best one");
    println!("    --debug             Enable debug logging");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    img-recog --source=screen.png --template=ok_button.png");
    println!("    img-recog --source=screen.png --template=icon.png --cutout=0,0.5,1,0.5 --all");
}
