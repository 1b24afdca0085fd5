//! # debugsym Utilities
//!
//! Logging setup shared by the debugsym binaries.

pub mod logging;

pub use logging::{init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
