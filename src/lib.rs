//! Tracks which desktop application holds focus during a work session, accounts time per
//! application and derives productivity signals from it.
//!
//! [tracking::TrackingService] is the entry point. It polls a [probe::ForegroundProbe] on a
//! drift-free schedule and never lets a failing probe end the session.

pub mod categories;
pub mod cli;
pub mod config;
pub mod error;
pub mod probe;
pub mod tracking;
pub mod utils;
