//! gxcodec core library
//!
//! Value types and error handling shared by the codec crate and the
//! command-line front end.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

