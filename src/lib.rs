// src/lib.rs
// Library interface for ct-warden
pub mod api;
pub mod certstream;
pub mod cli;
pub mod config;
pub mod domain;
pub mod notifier;
pub mod seed;
pub mod stats;
pub mod storage;
pub mod types;
pub mod worker;
