#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`behavior`]: Per-kind channel behavior (`ChannelBehavior`)
//! - [`config`]: Backend configuration (`MemoryClusterConfig`)
//! - [`cluster`]: The backend itself (`MemoryCluster`, `JournalEntry`)

pub mod behavior;
pub mod cluster;
pub mod config;

// --- Public API Re-exports ---

pub use behavior::ChannelBehavior;
pub use cluster::{JournalEntry, JournalOp, MemoryCluster};
pub use config::MemoryClusterConfig;
