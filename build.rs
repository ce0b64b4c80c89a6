//! Build script - copies the linker script into the output directory
//! so that the linker can find it at link time, and stamps the firmware
//! build time into `BUILD_TIMESTAMP`.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to OUT_DIR
    fs::copy("memory.x", out_dir.join("memory.x")).unwrap();

    // Tell cargo to look for linker scripts in OUT_DIR
    println!("cargo:rustc-link-search={}", out_dir.display());

    // Seconds since the Unix epoch, truncated to the advertised u32
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    // No rerun-if-changed: any package file change must restamp.
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", timestamp);
}
