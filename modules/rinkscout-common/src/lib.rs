pub mod config;
pub mod error;
pub mod record;
pub mod store;

pub use config::{Config, OutputPaths};
pub use error::RinkscoutError;
pub use record::*;
pub use store::WrappedArrayFile;
