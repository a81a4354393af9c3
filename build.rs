// build.rs

use chrono::Utc;
use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("build_info.rs");

    // Stamp the build time so the startup banner can report it.
    let build_date = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    fs::write(
        &dest_path,
        format!("pub const BUILD_DATE: &str = \"{}\";", build_date),
    ).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
