//! Resolve provider-supplied MongoDB resources into connection strings and pooled clients.

mod client;
pub mod config;
pub mod deferred;
pub mod descriptor;
mod error;
pub mod provider;
pub mod resource;

pub use client::MongoDb;
pub use config::PoolConfig;
pub use deferred::{Deferred, DeferredError, DeferredMongoDb, FailurePolicy};
pub use descriptor::{ConnectionDescriptor, Protocol, resolve};
pub use error::{MongoError, Result};
pub use provider::FileConfigProvider;
pub use resource::{
    ConfigProvider, Credentials, ProviderError, RESOURCE_PORT, RESOURCE_TYPE, ResourceInfo,
    StaticConfigProvider,
};
