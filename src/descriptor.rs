//! Turns provider metadata into a MongoDB connection string.

use std::fmt;

use crate::resource::ResourceInfo;

const DEFAULT_PROTOCOL: &str = "mongodb";
const SRV_PROTOCOL: &str = "mongodb+srv";

/// Connection scheme of a resolved descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// `mongodb://`, pinned to one `host:port`.
    Standard,
    /// `mongodb+srv://`, topology discovered through DNS.
    Srv,
    /// Any other scheme supplied by the provider, used verbatim.
    Other(String),
}

impl Protocol {
    fn from_scheme(scheme: &str) -> Self {
        match scheme {
            DEFAULT_PROTOCOL => Protocol::Standard,
            SRV_PROTOCOL => Protocol::Srv,
            other => Protocol::Other(other.to_owned()),
        }
    }

    /// The scheme as it appears in the connection string.
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Standard => DEFAULT_PROTOCOL,
            Protocol::Srv => SRV_PROTOCOL,
            Protocol::Other(scheme) => scheme,
        }
    }

    /// Whether the scheme resolves its topology via DNS seed lists.
    pub fn is_srv(&self) -> bool {
        matches!(self, Protocol::Srv)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol, database name and connection string derived from a resource.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    protocol: Protocol,
    database_name: String,
    url: String,
    password: String,
}

impl ConnectionDescriptor {
    /// Connection scheme.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Database selected by [`crate::MongoDb::db`].
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Full connection string including the password.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connection string with the password replaced, for logs and errors.
    pub fn redacted_url(&self) -> String {
        if self.password.is_empty() {
            return self.url.clone();
        }
        // Credentials come right after the scheme so only the first match is the password.
        let needle = format!(":{}@", self.password);
        self.url.replacen(&needle, ":****@", 1)
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_url())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("protocol", &self.protocol)
            .field("database_name", &self.database_name)
            .field("url", &self.redacted_url())
            .finish()
    }
}

/// Resolve `info` for the logical resource `resource_name`.
pub fn resolve(info: &ResourceInfo, resource_name: &str) -> ConnectionDescriptor {
    let protocol = protocol(info);
    let database_name = database_name(info, resource_name);
    let url = connection_url(info, &protocol, &database_name);

    ConnectionDescriptor {
        protocol,
        database_name,
        url,
        password: info.credentials.password.clone(),
    }
}

/// `options.protocol` when set, otherwise `mongodb`.
pub fn protocol(info: &ResourceInfo) -> Protocol {
    info.non_empty_option("protocol")
        .map(|scheme| Protocol::from_scheme(&scheme))
        .unwrap_or(Protocol::Standard)
}

/// `options.dbName` when set, otherwise the resource name itself.
pub fn database_name(info: &ResourceInfo, resource_name: &str) -> String {
    info.non_empty_option("dbName")
        .unwrap_or_else(|| resource_name.to_owned())
}

fn connection_url(info: &ResourceInfo, protocol: &Protocol, database_name: &str) -> String {
    let credentials = &info.credentials;
    let mut url = if protocol.is_srv() {
        format!(
            "{protocol}://{}:{}@{}/{database_name}?authSource=admin",
            credentials.username, credentials.password, info.host,
        )
    } else {
        format!(
            "{protocol}://{}:{}@{}:{}/{database_name}?authSource=admin&directConnection=true",
            credentials.username, credentials.password, info.host, info.port,
        )
    };

    // Passed through untouched, `ssl=false` included.
    if let Some(ssl) = info.option("ssl") {
        url.push_str("&ssl=");
        url.push_str(&ssl);
    }

    url
}
