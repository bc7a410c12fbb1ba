//! BETWATCH — Live-Match Betting Pool Watcher
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod scheduler;
pub mod wager;
pub mod storage;
pub mod providers;
pub mod watcher;
