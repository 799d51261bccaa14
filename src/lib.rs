//! Duel Core - networked two-player fighting match logic
//!
//! The crate holds everything a client needs to run one match:
//! - Attack cadence and combat resolution
//! - Reconciliation of peer-reported health
//! - Walk-cycle animation with held remote frames
//! - The relay transport and its JSON wire protocol

pub mod config;
pub mod game;
pub mod util;
pub mod ws;
