//! Build script for the firmware binary.
//!
//! Host builds (unit and integration tests) need nothing. For ARM targets the
//! SoftDevice-aware `memory.x` is placed on the linker search path and the
//! cortex-m-rt and defmt linker scripts are added to the binary.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() != Ok("arm") {
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::copy("memory.x", out_dir.join("memory.x")).expect("memory.x must exist at the crate root");
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
