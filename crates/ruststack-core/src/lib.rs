//! Core configuration, error taxonomy, and logging setup shared by the
//! `pxobj` object daemon binary and its supporting crates.

mod config;
mod error;
mod logging;

pub use config::{Config, TlsConfig};
pub use error::{Error, Result};
pub use logging::init_tracing;
