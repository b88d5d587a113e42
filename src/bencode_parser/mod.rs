pub mod errors;
pub mod parser;

pub use errors::BencodeError;
pub use parser::{Value, parse};
