//! Build script for ballast-core
//!
//! Checks requirements before compilation:
//! - Minimum Rust version (let-else, `Option::is_some_and`, `ptr::from_ref`)
//! - Target platform: the live-process backend needs Linux, and breakpoint
//!   tracing needs x86-64
//!
//! The size engine itself builds everywhere; only the backend is gated.

use std::env;

const MIN_RUST_VERSION: &str = "1.76.0";

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(found) => {
            if let Ok(min) = rustc_version::Version::parse(MIN_RUST_VERSION) {
                if found < min {
                    panic!("ballast-core requires Rust {min} or newer, found {found}");
                }
            }
        }
        // Some build environments hide the compiler version.
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_os != "linux" {
        println!("cargo:warning=ballast-core: no process backend for {target_os}; only offline analysis is available");
    } else if target_arch != "x86_64" {
        println!("cargo:warning=ballast-core: allocation tracing is only implemented for x86_64, not {target_arch}");
    }
}
