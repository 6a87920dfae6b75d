pub mod config;
pub mod error;
pub mod resilience;

pub use config::Config;
pub use error::{ErrorKind, ProviderError};
pub use resilience::ResilienceExecutor;
