//! # ember-core
//! Protocol types, collaborator traits and consensus arithmetic for Ember.
//!
//! Nothing in this crate spawns threads or performs I/O. The engine crate
//! (`ember-consensus`) builds on these pieces.

pub mod chain;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod difficulty;
pub mod error;
pub mod merkle;
pub mod reward;
pub mod traits;
pub mod types;
