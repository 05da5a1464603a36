//! Open-TLS command relay library.
//!
//! Re-exports all modules so the binaries and `ot-e2e-tests` share the
//! same dispatch policy, sink, and session drivers.

pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod policy;
pub mod producer;
pub mod sink;
