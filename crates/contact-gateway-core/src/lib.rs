//! Core library for contact-gateway.
//!
//! Holds everything that does not depend on HTTP: settings, the session
//! lifecycle driven by collaborator events, the on-disk credential store,
//! the collaborator connection contract with its child-process bridge, and
//! the admission logic that gates lookups on session readiness.

pub mod config;
pub mod connection;
pub mod lookup;
pub mod session;
