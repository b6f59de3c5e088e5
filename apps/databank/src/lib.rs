//! # databank
//!
//! Application layer of Databank: storage backends, configuration and the
//! command-line interface built on `databank-core`.

pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod records;

pub use config::{BackendKind, Config};
pub use error::AppError;
pub use records::Contact;
