pub mod config;

#[cfg(feature = "elapsed")]
pub mod elapsed;

pub use config::Config;
pub use config::ConfigError;

#[cfg(feature = "cli")]
pub use config::CommandLineArgs;
