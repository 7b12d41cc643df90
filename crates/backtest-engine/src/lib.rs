pub mod engine;
pub mod metrics;
pub mod models;

pub use engine::*;
pub use metrics::*;
pub use models::*;
