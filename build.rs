//! Stamps the version line printed by `img-recog --version`.

use std::env;
use std::process::Command;
use time::OffsetDateTime;

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rustc-env=IMG_RECOG_BUILD_YEAR={}", build_year());

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let release = env::var("PROFILE").is_ok_and(|profile| profile == "release");
    println!(
        "cargo:rustc-env=IMG_RECOG_VERSION={}",
        version_label(&version, release)
    );
}

/// Year of `SOURCE_DATE_EPOCH` for reproducible builds, else the current year.
fn build_year() -> i32 {
    env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
        .year()
}

/// Plain version on release builds and tagged checkouts, `-dev` suffixed otherwise.
fn version_label(version: &str, release: bool) -> String {
    if release {
        return version.to_string();
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");

    let tagged = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .is_some_and(|tag| tag.trim() == format!("v{version}"));
    if tagged {
        version.to_string()
    } else {
        format!("{version}-dev")
    }
}
