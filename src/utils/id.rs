//! Timeline message id generation
//!
//! Ids only need to be unique within one client session; they key streaming
//! updates to the placeholder message they belong to.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a message id from a millisecond timestamp, a per-process
/// counter, and a short random suffix.
pub fn generate_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut bytes = [0u8; 4];
    if getrandom::fill(&mut bytes).is_err() {
        // Timestamp plus counter already disambiguates within a session.
        return format!("{prefix}{millis:x}-{seq:x}");
    }
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}{millis:x}-{seq:x}-{suffix}")
}
