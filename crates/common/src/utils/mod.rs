//! Common utility functions
//!
//! - **[`text`]**: bounded strings for logs, telemetry and dead letters

pub mod text;

pub use self::text::truncate_reason;
