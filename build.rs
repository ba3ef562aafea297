/// shmem-driver build script.
///
/// The crate has one backend per kernel API family and no runtime fallback,
/// so reject any other target OS here instead of producing a library with no
/// platform module.
fn main() {
    const SUPPORTED: &[&str] = &["linux", "android", "macos", "fuchsia", "windows"];

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if !SUPPORTED.contains(&target_os.as_str()) {
        panic!(
            "shmem-driver has no shared-memory backend for this target \
             (CARGO_CFG_TARGET_OS = {target_os:?}; supported: {SUPPORTED:?})"
        );
    }

    // Only re-run the build script when it changes.
    println!("cargo:rerun-if-changed=build.rs");
}
