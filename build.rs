use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=AUTOISO_XORRISO");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_else(|_| "unknown".to_string());
    if target_os == "windows" {
        println!("cargo:warning=Writing images requires xorriso, which is not packaged for Windows.");
        return;
    }

    // Check for xorriso
    let program = env::var("AUTOISO_XORRISO").unwrap_or_else(|_| "xorriso".to_string());
    let has_xorriso = Command::new(&program)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false);

    if !has_xorriso {
        println!(
            "cargo:warning={} not found. Install xorriso to write images; --dry-run works without it.",
            program
        );
    }
}
