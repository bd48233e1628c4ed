//! Core types for the tiles classification engine.
//!
//! This crate is the shared vocabulary of the workspace: the closed
//! [`Label`] set, the [`Descriptor`] a scraper hands us, the
//! [`ClassificationResult`] we hand back, the [`Epoch`] that scopes a
//! dispatch, and the [`config`] schema. It has no async or I/O code.

pub mod classification;
pub mod config;
pub mod descriptor;
pub mod epoch;
pub mod error;
pub mod label;
pub mod secret;

pub use classification::{ClassificationResult, clamp_confidence};
pub use descriptor::{Descriptor, PageContext};
pub use epoch::Epoch;
pub use error::{ConfigError, Result};
pub use label::Label;
pub use secret::SecretString;
