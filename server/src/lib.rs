//! Arena server library.
//!
//! Exposes the session authority and its collaborators for the binaries and
//! integration tests.

pub mod config;
pub mod connection;
pub mod error;
pub mod objects;
pub mod physics;
pub mod player;
pub mod scheduler;
pub mod session;
pub mod ticker;
