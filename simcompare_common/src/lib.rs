pub mod config;
pub mod error;
pub mod mode;
pub mod types;

pub use config::*;
pub use error::*;
pub use mode::*;
pub use types::*;
