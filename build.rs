//! Build script checking for system libraries needed by optional features.
//!
//! Live capture (`opencv` feature) needs a system OpenCV install found via
//! pkg-config. The default build has no system requirements.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_OPENCV").is_some() {
        check_pkg_config();
        check_opencv();
    }

    println!(
        "cargo:rustc-env=BUILD_TARGET={}",
        env::var("TARGET").unwrap_or_default()
    );
}

fn pkg_config_version(args: &[&str]) -> Option<String> {
    let output = Command::new("pkg-config").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_opencv() {
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");

    let version = pkg_config_version(&["--modversion", "opencv4"])
        .or_else(|| pkg_config_version(&["--modversion", "opencv"]));

    match version {
        Some(version) => println!("cargo:warning=Found OpenCV version: {version}"),
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. The `opencv` feature needs it for live capture.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libopencv-dev");
            println!("cargo:warning=On macOS: brew install opencv");
        }
    }
}

fn check_pkg_config() {
    if pkg_config_version(&["--version"]).is_none() {
        println!("cargo:warning=pkg-config not found. This is required to find system libraries.");
        println!("cargo:warning=On Ubuntu: sudo apt-get install pkg-config");
        println!("cargo:warning=On macOS: brew install pkg-config");
    }
}
