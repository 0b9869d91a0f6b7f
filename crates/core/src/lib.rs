//! Domain logic for the Viva voice tutoring coordinator.
//!
//! This crate holds everything that does not touch a transport: the
//! exercise context types, system-prompt and greeting construction, the
//! session transcript, spoken-math normalization, the local application
//! event bus, and the closed set of agent-invocable tools.

pub mod content;
pub mod events;
pub mod exercise;
pub mod mathspeak;
pub mod prompt;
pub mod tools;
pub mod transcript;
