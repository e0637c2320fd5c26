//! Resource metadata handed out by a configuration provider.

use std::{collections::HashMap, error::Error};

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Resource type identifying a MongoDB dependency.
pub const RESOURCE_TYPE: &str = "kapeta/resource-type-mongodb";
/// Port role under which MongoDB resources are exposed.
pub const RESOURCE_PORT: &str = "mongodb";

/// Connection metadata for one logical database dependency.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceInfo {
    /// Hostname, or the SRV record name for `mongodb+srv`.
    pub host: String,
    /// Ignored for SRV connection strings.
    #[serde(deserialize_with = "port_from_json")]
    pub port: String,
    /// Embedded in the connection string as-is.
    #[serde(default)]
    pub credentials: Credentials,
    /// Free-form options; `protocol`, `dbName` and `ssl` are understood.
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

/// Username and password pair; either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Credentials {
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password, masked whenever a connection string is displayed.
    #[serde(default)]
    pub password: String,
}

impl ResourceInfo {
    /// Construct resource info without any options.
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
            options: HashMap::new(),
        }
    }

    /// Attach an option value, replacing any previous value for `key`.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Render an option as text. `null` counts as absent.
    pub fn option(&self, key: &str) -> Option<String> {
        match self.options.get(key)? {
            Value::Null => None,
            Value::String(value) => Some(value.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Like [`ResourceInfo::option`] but also treats an empty value as absent.
    pub fn non_empty_option(&self, key: &str) -> Option<String> {
        self.option(key).filter(|value| !value.is_empty())
    }
}

/// Provider files may carry the port as a number or a string.
fn port_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Text(String),
        Number(u64),
    }

    Ok(match RawPort::deserialize(deserializer)? {
        RawPort::Text(port) => port,
        RawPort::Number(port) => port.to_string(),
    })
}

/// Error raised by a [`ConfigProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has no matching resource.
    #[error("no resource `{name}` of type `{resource_type}` on port `{port}`")]
    UnknownResource {
        /// Requested resource type.
        resource_type: String,
        /// Requested port role.
        port: String,
        /// Requested resource name.
        name: String,
    },
    /// The resource file could not be read.
    #[error("failed to read resource file `{path}`")]
    Read {
        /// File that was read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The resource file is not valid JSON of the expected shape.
    #[error("failed to parse resource file `{path}`")]
    Parse {
        /// File that was parsed.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Any other backend failure.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
        /// Underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl ProviderError {
    /// Wrap an arbitrary backend failure.
    pub fn other(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        ProviderError::Other {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// Source of resource metadata and of the owning service's identity.
pub trait ConfigProvider: Send + Sync {
    /// Look up the resource registered under `resource_type`/`resource_port`/`resource_name`.
    fn get_resource_info(
        &self,
        resource_type: &str,
        resource_port: &str,
        resource_name: &str,
    ) -> BoxFuture<'static, Result<ResourceInfo, ProviderError>>;

    /// Logical reference of the service that owns the connection.
    fn block_reference(&self) -> String;
}

/// In-memory provider, keyed by resource type, port and name.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    block_reference: String,
    resources: HashMap<(String, String, String), ResourceInfo>,
}

impl StaticConfigProvider {
    /// Create an empty provider reporting `block_reference` as its identity.
    pub fn new(block_reference: impl Into<String>) -> Self {
        Self {
            block_reference: block_reference.into(),
            resources: HashMap::new(),
        }
    }

    /// Register a MongoDB resource under `name`.
    pub fn with_mongodb(self, name: impl Into<String>, info: ResourceInfo) -> Self {
        self.with_resource(RESOURCE_TYPE, RESOURCE_PORT, name, info)
    }

    /// Register a resource of arbitrary type and port.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        port: impl Into<String>,
        name: impl Into<String>,
        info: ResourceInfo,
    ) -> Self {
        self.resources
            .insert((resource_type.into(), port.into(), name.into()), info);
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_resource_info(
        &self,
        resource_type: &str,
        resource_port: &str,
        resource_name: &str,
    ) -> BoxFuture<'static, Result<ResourceInfo, ProviderError>> {
        let key = (
            resource_type.to_owned(),
            resource_port.to_owned(),
            resource_name.to_owned(),
        );
        let result = self.resources.get(&key).cloned().ok_or_else(|| {
            let (resource_type, port, name) = key;
            ProviderError::UnknownResource {
                resource_type,
                port,
                name,
            }
        });
        Box::pin(async move { result })
    }

    fn block_reference(&self) -> String {
        self.block_reference.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_empty_options_are_absent() {
        let info = ResourceInfo::new("localhost", "27017", "user", "password")
            .with_option("ssl", Value::Null)
            .with_option("dbName", "");

        assert_eq!(info.option("ssl"), None);
        assert_eq!(info.option("dbName"), Some(String::new()));
        assert_eq!(info.non_empty_option("dbName"), None);
    }

    #[test]
    fn non_string_options_render_as_json_text() {
        let info = ResourceInfo::default()
            .with_option("ssl", true)
            .with_option("retries", 3);

        assert_eq!(info.option("ssl").as_deref(), Some("true"));
        assert_eq!(info.option("retries").as_deref(), Some("3"));
    }

    #[test]
    fn deserializes_numeric_port_and_missing_sections() {
        let info: ResourceInfo = serde_json::from_value(json!({
            "host": "db.internal",
            "port": 27017
        }))
        .unwrap();

        assert_eq!(info.port, "27017");
        assert_eq!(info.credentials, Credentials::default());
        assert!(info.options.is_empty());
    }

    #[tokio::test]
    async fn static_provider_serves_registered_resources_only() {
        let info = ResourceInfo::new("localhost", "27017", "user", "password");
        let provider = StaticConfigProvider::new("acme/orders").with_mongodb("orders", info.clone());

        let found = provider
            .get_resource_info(RESOURCE_TYPE, RESOURCE_PORT, "orders")
            .await
            .unwrap();
        assert_eq!(found, info);
        assert_eq!(provider.block_reference(), "acme/orders");

        let missing = provider
            .get_resource_info(RESOURCE_TYPE, RESOURCE_PORT, "billing")
            .await;
        assert!(matches!(
            missing,
            Err(ProviderError::UnknownResource { name, .. }) if name == "billing"
        ));
    }
}
