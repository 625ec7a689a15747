// Millisecond-resolution wall clock helper used by the logging macros'
// timestamp field.
//
// Austin Shafer - 2020

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Used only for human-readable log
/// timestamps, not for anything timing-sensitive.
pub fn get_current_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis()
}
