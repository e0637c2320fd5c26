//! Errors raised while opening a MongoDB client.

use std::time::Duration;

use mongodb::error::Error as DriverError;
use thiserror::Error;

use crate::resource::ProviderError;

/// Result alias for connection setup.
pub type Result<T> = std::result::Result<T, MongoError>;

/// Errors raised while resolving a resource and opening its client.
#[derive(Debug, Error)]
pub enum MongoError {
    /// The config provider could not supply the resource.
    #[error("failed to look up MongoDB resource `{resource}`")]
    ResourceLookup {
        /// Logical resource name that was looked up.
        resource: String,
        /// Underlying error.
        #[source]
        source: ProviderError,
    },
    /// The driver rejected the assembled connection string.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Connection string with the password masked.
        uri: String,
        /// Underlying error.
        #[source]
        source: DriverError,
    },
    /// The driver could not build a client from the options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Underlying error.
        #[source]
        source: DriverError,
    },
    /// The server did not answer the ping.
    #[error("MongoDB ping failed for database `{database}`")]
    Ping {
        /// Database the client was opened for.
        database: String,
        /// Underlying error.
        #[source]
        source: DriverError,
    },
    /// The ping did not complete within the operation timeout.
    #[error("MongoDB ping for database `{database}` timed out after {timeout:?}")]
    PingTimeout {
        /// Database the client was opened for.
        database: String,
        /// Limit that elapsed.
        timeout: Duration,
    },
}
