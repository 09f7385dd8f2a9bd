//! Foundational low-level utilities shared across Arta crates.
//!
//! Provides atomic file-write helpers, time utilities used by rate-limit
//! windows and cache expiry, and text helpers for outbound message shaping.

pub mod atomic_io;
pub mod text_utils;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use text_utils::{sanitize_for_path, truncate_for_message};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix_ms};
