//! AMQP message remover: selectively purge messages from a live queue.

pub mod cli;
pub mod config;
pub mod error;
pub mod observer;
pub mod queue;
pub mod remover;

pub use config::{MatchTarget, RemovalMode, RemoverConfig};
pub use error::{Error, Result};
pub use remover::{RemovalRun, Status, remove_messages};
