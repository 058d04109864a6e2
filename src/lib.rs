pub mod analyzer;
pub mod error;
pub mod pdf;
pub mod store;
pub mod text;

pub use error::{Error, Result};
