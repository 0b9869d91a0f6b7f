//! Session coordination for the Viva voice tutor.
//!
//! Owns the lifecycle of a live audio conversation between a learner and
//! the remote conversational agent: credential acquisition, transport
//! negotiation with a single automatic fallback, transcript wiring, tool
//! dispatch, and teardown.

pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod negotiator;
pub mod persistence;
pub mod socket;
pub mod transport;
