//! Pooled MongoDB client opened from a resolved descriptor.

use std::{sync::Arc, time::Duration};

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::{
    config::PoolConfig,
    descriptor::{self, ConnectionDescriptor},
    error::{MongoError, Result},
    resource::{ConfigProvider, RESOURCE_PORT, RESOURCE_TYPE},
};

/// Connected MongoDB client bound to the database of one logical resource.
///
/// Cloning is cheap and every clone shares the same connection pool.
#[derive(Clone)]
pub struct MongoDb {
    inner: Arc<MongoDbInner>,
}

struct MongoDbInner {
    client: Client,
    descriptor: ConnectionDescriptor,
    pool_config: PoolConfig,
}

impl MongoDb {
    /// Look up `resource_name` through `provider`, then connect and ping.
    ///
    /// Tunables come from the `MONGO_*` environment variables and the
    /// provider's block reference is used as the application name.
    pub async fn connect<P>(provider: &P, resource_name: &str) -> Result<Self>
    where
        P: ConfigProvider + ?Sized,
    {
        let info = provider
            .get_resource_info(RESOURCE_TYPE, RESOURCE_PORT, resource_name)
            .await
            .map_err(|source| MongoError::ResourceLookup {
                resource: resource_name.to_owned(),
                source,
            })?;

        let descriptor = descriptor::resolve(&info, resource_name);
        let pool_config = PoolConfig::from_env(provider.block_reference());
        Self::connect_with(descriptor, pool_config).await
    }

    /// Open a client for an already resolved descriptor.
    ///
    /// Returns only once the server answered a ping.
    pub async fn connect_with(
        descriptor: ConnectionDescriptor,
        pool_config: PoolConfig,
    ) -> Result<Self> {
        info!(
            database = descriptor.database_name(),
            protocol = %descriptor.protocol(),
            "connecting to MongoDB database"
        );

        let mut options = ClientOptions::parse(descriptor.url())
            .await
            .map_err(|source| MongoError::InvalidUri {
                uri: descriptor.redacted_url(),
                source,
            })?;
        pool_config.apply_to(&mut options);

        let client = Client::with_options(options)
            .map_err(|source| MongoError::ClientConstruction { source })?;

        debug!(
            database = descriptor.database_name(),
            "checking connection to MongoDB database"
        );
        ping(
            &client,
            descriptor.database_name(),
            pool_config.operation_timeout,
        )
        .await?;
        info!(
            database = descriptor.database_name(),
            "connected to MongoDB database"
        );

        Ok(Self {
            inner: Arc::new(MongoDbInner {
                client,
                descriptor,
                pool_config,
            }),
        })
    }

    /// Handle to the resolved database.
    pub fn db(&self) -> Database {
        self.inner.client.database(self.database_name())
    }

    /// Underlying driver client, for everything this type does not wrap.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Name of the database returned by [`MongoDb::db`].
    pub fn database_name(&self) -> &str {
        self.inner.descriptor.database_name()
    }

    /// Descriptor the client was opened with.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.inner.descriptor
    }

    /// Settings the client was opened with.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.inner.pool_config
    }

    /// Upper bound callers should apply to single operations.
    pub fn operation_timeout(&self) -> Duration {
        self.inner.pool_config.operation_timeout
    }

    /// Issue a ping against the server, bounded by the operation timeout.
    pub async fn ping(&self) -> Result<()> {
        ping(
            &self.inner.client,
            self.database_name(),
            self.operation_timeout(),
        )
        .await
    }
}

impl std::fmt::Debug for MongoDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDb")
            .field("descriptor", &self.inner.descriptor)
            .field("pool_config", &self.inner.pool_config)
            .finish_non_exhaustive()
    }
}

async fn ping(client: &Client, database: &str, limit: Duration) -> Result<()> {
    let admin = client.database("admin");
    let command = admin.run_command(doc! { "ping": 1 });
    match timeout(limit, command).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(source)) => Err(MongoError::Ping {
            database: database.to_owned(),
            source,
        }),
        Err(_) => Err(MongoError::PingTimeout {
            database: database.to_owned(),
            timeout: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ProviderError, ResourceInfo, StaticConfigProvider};

    #[tokio::test]
    async fn lookup_failure_is_returned_unchanged() {
        let provider = StaticConfigProvider::new("acme/orders");

        let err = MongoDb::connect(&provider, "orders").await.unwrap_err();

        match err {
            MongoError::ResourceLookup { resource, source } => {
                assert_eq!(resource, "orders");
                assert!(matches!(source, ProviderError::UnknownResource { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unparsable_uri_is_reported_with_masked_password() {
        let info = ResourceInfo::new("localhost", "not-a-port", "user", "s3cret");
        let descriptor = descriptor::resolve(&info, "orders");

        let err = MongoDb::connect_with(descriptor, PoolConfig::new("acme/orders"))
            .await
            .unwrap_err();

        match err {
            MongoError::InvalidUri { uri, .. } => {
                assert!(uri.contains("user:****@localhost:not-a-port"));
                assert!(!uri.contains("s3cret"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_fails_the_ping() {
        let info = ResourceInfo::new("127.0.0.1", "1", "user", "password");
        let descriptor = descriptor::resolve(&info, "orders");
        let mut pool_config = PoolConfig::new("acme/orders");
        pool_config.min_pool_size = 0;
        pool_config.server_selection_timeout = Duration::from_millis(200);
        pool_config.operation_timeout = Duration::from_secs(10);

        let err = MongoDb::connect_with(descriptor, pool_config)
            .await
            .unwrap_err();

        match err {
            MongoError::Ping { database, .. } => assert_eq!(database, "orders"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
