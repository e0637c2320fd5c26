//! Pool, timeout and write-concern tunables read from the environment.

use std::{env, str::FromStr, time::Duration};

use mongodb::options::{Acknowledgment, ClientOptions, WriteConcern};
use tracing::debug;

/// Prefix shared by every tunable, e.g. `MONGO_MAX_POOL_SIZE`.
pub const ENV_PREFIX: &str = "MONGO";

const DEFAULT_MAX_POOL_SIZE: u32 = 50;
const DEFAULT_MIN_POOL_SIZE: u32 = 10;
const DEFAULT_MAX_CONN_IDLE_TIME_SECS: u64 = 120;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SERVER_SELECTION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WRITE_CONCERN: &str = "majority";

/// Client settings applied on top of the parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Identity reported to the server, normally the owning block reference.
    pub app_name: String,
    /// Upper bound on pooled connections.
    pub max_pool_size: u32,
    /// Connections kept warm.
    pub min_pool_size: u32,
    /// Idle connections older than this are evicted.
    pub max_conn_idle_time: Duration,
    /// Per-attempt dial timeout.
    pub connect_timeout: Duration,
    /// Maximum wait to pick a topology member.
    pub server_selection_timeout: Duration,
    /// Maximum wait for a single operation.
    pub operation_timeout: Duration,
    /// Write acknowledgment level, `majority` unless overridden.
    pub write_concern: String,
}

impl PoolConfig {
    /// Compiled-in defaults.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            min_pool_size: DEFAULT_MIN_POOL_SIZE,
            max_conn_idle_time: Duration::from_secs(DEFAULT_MAX_CONN_IDLE_TIME_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            server_selection_timeout: Duration::from_secs(DEFAULT_SERVER_SELECTION_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            write_concern: DEFAULT_WRITE_CONCERN.to_owned(),
        }
    }

    /// Read the `MONGO_*` tunables from the process environment.
    pub fn from_env(app_name: impl Into<String>) -> Self {
        Self::from_lookup(ENV_PREFIX, app_name, |key| env::var(key).ok())
    }

    /// Read tunables named `<prefix>_<TUNABLE>` through `lookup`.
    ///
    /// Missing, empty or unparsable values keep their default; this never fails.
    pub fn from_lookup<F>(prefix: &str, app_name: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let tunables = Tunables { prefix, lookup };
        Self {
            app_name: app_name.into(),
            max_pool_size: tunables.number("MAX_POOL_SIZE", DEFAULT_MAX_POOL_SIZE),
            min_pool_size: tunables.number("MIN_POOL_SIZE", DEFAULT_MIN_POOL_SIZE),
            max_conn_idle_time: tunables
                .seconds("MAX_CONN_IDLE_TIME", DEFAULT_MAX_CONN_IDLE_TIME_SECS),
            connect_timeout: tunables.seconds("CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT_SECS),
            server_selection_timeout: tunables.seconds(
                "SERVER_SELECTION_TIMEOUT",
                DEFAULT_SERVER_SELECTION_TIMEOUT_SECS,
            ),
            operation_timeout: tunables.seconds("TIMEOUT", DEFAULT_OPERATION_TIMEOUT_SECS),
            write_concern: tunables
                .text("WRITE_MAJORITY")
                .unwrap_or_else(|| DEFAULT_WRITE_CONCERN.to_owned()),
        }
    }

    /// Driver acknowledgment for [`PoolConfig::write_concern`].
    ///
    /// Numbers map to a node count, `majority` to the majority level, anything
    /// else to a custom tag set name.
    pub fn acknowledgment(&self) -> Acknowledgment {
        match self.write_concern.as_str() {
            DEFAULT_WRITE_CONCERN => Acknowledgment::Majority,
            other => match other.parse::<u32>() {
                Ok(nodes) => Acknowledgment::Nodes(nodes),
                Err(_) => Acknowledgment::Custom(other.to_owned()),
            },
        }
    }

    /// Copy these settings onto driver options, enabling read and write retries.
    pub fn apply_to(&self, options: &mut ClientOptions) {
        options.app_name = Some(self.app_name.clone());
        options.max_pool_size = Some(self.max_pool_size);
        options.min_pool_size = Some(self.min_pool_size);
        options.max_idle_time = Some(self.max_conn_idle_time);
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.server_selection_timeout);
        options.retry_reads = Some(true);
        options.retry_writes = Some(true);
        let mut write_concern = WriteConcern::default();
        write_concern.w = Some(self.acknowledgment());
        options.write_concern = Some(write_concern);
    }
}

struct Tunables<'a, F> {
    prefix: &'a str,
    lookup: F,
}

impl<F> Tunables<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn text(&self, name: &str) -> Option<String> {
        let key = format!("{}_{name}", self.prefix);
        (self.lookup)(&key).filter(|value| !value.is_empty())
    }

    fn number<T>(&self, name: &str, default: T) -> T
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let Some(raw) = self.text(name) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                debug!(
                    tunable = %format!("{}_{name}", self.prefix),
                    value = %raw,
                    %default,
                    "ignoring unparsable tunable"
                );
                default
            }
        }
    }

    fn seconds(&self, name: &str, default: u64) -> Duration {
        Duration::from_secs(self.number(name, default))
    }
}
