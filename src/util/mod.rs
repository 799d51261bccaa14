//! Shared utilities

pub mod time;
pub mod timers;
