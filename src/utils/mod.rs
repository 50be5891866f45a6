pub mod error;
pub mod json;

pub use error::GeneratorError;
pub use json::{deep_copy, replace_path, set_path};
