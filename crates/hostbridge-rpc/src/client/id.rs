use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a request correlation id.
///
/// Format: `{timestamp_ms}-{sequence}-{random_hex}`, e.g. `1738300800123-7-a1b2`.
/// The process-wide sequence keeps ids unique within a process even when the
/// clock stalls; the random suffix separates processes.
pub fn generate_request_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random: u16 = rand::rng().random();
    format!("{timestamp}-{sequence}-{random:04x}")
}
