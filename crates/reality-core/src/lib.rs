//! Reality Core - Program graph types, session state, and error handling

pub mod error;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use session::*;
pub use types::*;
