//! Integration test suite for the Ember consensus engine.
//!
//! The tests in `tests/` drive both engines through the public facade only,
//! against the in-memory chain. Shared fixtures live in [`helpers`].

pub mod helpers;
