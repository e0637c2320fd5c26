//! Connectivity check: resolve MongoDB resources from the resource file, connect and ping them.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use mongo_resource::{DeferredMongoDb, FileConfigProvider, MongoDb};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: mongo-resource-check [--deferred] [RESOURCE...]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut deferred = false;
    let mut names = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--deferred" => deferred = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => names.push(arg),
        }
    }

    let provider = Arc::new(FileConfigProvider::load().context("loading MongoDB resources")?);
    if names.is_empty() {
        names = provider.resource_names().map(str::to_owned).collect();
        names.sort();
    }
    if names.is_empty() {
        bail!("no MongoDB resources configured\n{USAGE}");
    }

    for name in &names {
        let mongo = if deferred {
            // Background connect; a failure terminates the process.
            DeferredMongoDb::connect(provider.clone(), name.clone())
                .get()
                .await
                .with_context(|| format!("connecting to MongoDB resource `{name}`"))?
        } else {
            MongoDb::connect(provider.as_ref(), name)
                .await
                .with_context(|| format!("connecting to MongoDB resource `{name}`"))?
        };

        mongo
            .ping()
            .await
            .with_context(|| format!("pinging MongoDB resource `{name}`"))?;
        info!(
            resource = %name,
            database = mongo.database_name(),
            url = %mongo.descriptor(),
            "MongoDB resource is reachable"
        );
    }

    Ok(())
}

/// Configure tracing, honouring `RUST_LOG` and defaulting to `info`.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
