//! Rotate outgoing completion requests across a list of OpenAI-compatible
//! endpoints, failing over to the next one when an attempt fails.

pub mod cli;
pub mod config;
pub mod events;
pub mod logging;
pub mod probe;
pub mod proxy;
pub mod rotation;
pub mod settings;
pub mod transfer;
