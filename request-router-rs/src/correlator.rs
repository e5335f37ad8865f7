// request-router-rs/src/correlator.rs
// Request identifiers minted once per intake event

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Strictly increasing within the process, even when the wall clock stalls
/// or steps backwards.
fn next_nanos() -> u64 {
    let now = wall_clock_nanos();
    let mut last = LAST_NANOS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_NANOS.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

/// `"{nanos}-{8 hex digits}"`. Never fails.
pub fn new_request_id() -> String {
    format!("{}-{:08x}", next_nanos(), rand::random::<u32>())
}
