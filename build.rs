fn main() {
    println!("cargo:rerun-if-env-changed=VCCREF_MEASURED_VCC");

    #[cfg(feature = "nrf")]
    firmware();
}

#[cfg(feature = "nrf")]
fn firmware() {
    use std::{env, fs, path::PathBuf};

    built::write_built_file().expect("Failed to acquire build-time information");

    // Put the linker script somewhere the linker can find it
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out.join("memory.x"), include_bytes!("memory.x")).expect("Failed to copy memory.x");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
