pub mod bars;
pub mod error;
pub mod types;

pub use bars::*;
pub use error::*;
pub use types::*;
