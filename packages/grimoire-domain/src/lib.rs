//! Pure file-catalogue rules shared by storage, service, and HTTP layers.

pub mod access;
pub mod file;
pub mod filter;
pub mod tags;

mod error;

pub use error::{Error, Result};
