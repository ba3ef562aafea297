// ── shmem-probe ───────────────────────────────────────────────────────────────
//
// Host self-check: allocate a region, hand a cloned handle to a second
// `Memory` the way a transport would, map both and confirm that a write
// through one mapping is visible through the other.
//
// Logging goes through `tracing`; set `RUST_LOG=debug` to see the kernel
// calls.  Region options come from `SHMEM_DRIVER_CONFIG` if set.
#![deny(unsafe_code)]

use shmem_driver::{Memory, RegionOptions, Result};

const PROBE_SIZE: usize = 4096;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "shared-memory probe failed");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let t0 = std::time::Instant::now();

    let opts = RegionOptions::from_env()?;
    let m = Memory::with_options(PROBE_SIZE, &opts)?;

    // What a transport would send: a second handle plus the size.
    let (handle, size) = m.try_clone()?.into_parts();
    let m2 = Memory::from_handle(handle, size);

    let map1 = m.try_map()?;
    let map2 = m2.try_map()?;

    let pattern = [0xde, 0xad, 0xbe, 0xef];
    map1.write_at(0, &pattern);
    let last = PROBE_SIZE - 1;
    map1.store(last, 0x7f);

    let mut seen = [0u8; 4];
    map2.read_at(0, &mut seen);
    if seen != pattern || map2.load(last) != 0x7f {
        tracing::error!("write through the first mapping is not visible through the second");
        std::process::exit(2);
    }

    // The mappings must outlive their regions.
    drop(m);
    drop(m2);
    map1.store(1, 0x01);
    if map2.load(1) != 0x01 {
        tracing::error!("mapping stopped aliasing after its region was closed");
        std::process::exit(2);
    }

    tracing::info!(
        size = PROBE_SIZE,
        name = %opts.name,
        elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
        "shared-memory probe passed"
    );
    Ok(())
}
