//! ID generation utilities for headless-host
//!
//! Provides functions for generating identifiers for app records, load
//! sessions, and persisted task descriptors.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique app record ID
///
/// Format: `app-{timestamp_ms}-{random_hex}`
/// Example: `app-1738300800123-a1b2`
pub fn generate_record_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("app-{}-{:04x}", timestamp, random)
}

/// Generate a load session ID, used to tag log lines for one `load_app` call
///
/// Format: `load-{random_hex}`
pub fn generate_session_id() -> String {
    let random: u32 = rand::rng().random();
    format!("load-{:08x}", random)
}

/// Storage key for a task: tasks are unique per (app id, task name)
///
/// Format: `{app_id}::{task_name}`
pub fn task_key(app_id: &str, task_name: &str) -> String {
    format!("{}::{}", app_id, task_name)
}
