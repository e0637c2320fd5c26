//! Background connection with a publish-once readiness signal.

use std::{fmt::Display, future::Future, sync::Arc};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::{client::MongoDb, resource::ConfigProvider};

/// What to do when the background connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and exit the process with status 1.
    Abort,
    /// Log the failure and keep running; readers get [`DeferredError::NotReady`].
    Report,
}

/// Returned when the deferred value is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredError {
    /// The background task is still running or has failed.
    #[error("client not ready: {reason}")]
    NotReady {
        /// `still connecting`, or the failure message.
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum Readiness<T> {
    Pending,
    Ready(T),
    Failed(String),
}

/// A value produced by a background task, readable once the task completes.
///
/// The readiness state moves from pending to ready or failed exactly once.
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    state: watch::Receiver<Readiness<T>>,
}

/// MongoDB client connected in the background.
pub type DeferredMongoDb = Deferred<MongoDb>;

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run `future` on the tokio runtime and return without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, E>(future: F, policy: FailurePolicy) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = watch::channel(Readiness::Pending);

        tokio::spawn(async move {
            match future.await {
                Ok(value) => {
                    tx.send_replace(Readiness::Ready(value));
                }
                Err(err) => {
                    error!(error = %err, "background connection failed");
                    tx.send_replace(Readiness::Failed(err.to_string()));
                    if policy == FailurePolicy::Abort {
                        std::process::exit(1);
                    }
                }
            }
        });

        Self { state: rx }
    }

    /// Wait until the background task finished and return its value.
    ///
    /// Fails with [`DeferredError::NotReady`] once the task has failed.
    pub async fn get(&self) -> Result<T, DeferredError> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|readiness| !matches!(readiness, Readiness::Pending))
            .await
            .map_err(|_| DeferredError::NotReady {
                reason: "background task stopped before completing".into(),
            })?;
        Self::read(&settled)
    }

    /// Return the value if it is already available, without waiting.
    pub fn try_get(&self) -> Result<T, DeferredError> {
        Self::read(&self.state.borrow())
    }

    /// Whether the background task completed successfully.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), Readiness::Ready(_))
    }

    fn read(readiness: &Readiness<T>) -> Result<T, DeferredError> {
        match readiness {
            Readiness::Ready(value) => Ok(value.clone()),
            Readiness::Pending => Err(DeferredError::NotReady {
                reason: "still connecting".into(),
            }),
            Readiness::Failed(reason) => Err(DeferredError::NotReady {
                reason: reason.clone(),
            }),
        }
    }
}

impl Deferred<MongoDb> {
    /// Connect to `resource_name` in the background; a failure aborts the process.
    pub fn connect<P>(provider: Arc<P>, resource_name: impl Into<String>) -> Self
    where
        P: ConfigProvider + ?Sized + 'static,
    {
        Self::connect_with_policy(provider, resource_name, FailurePolicy::Abort)
    }

    /// Connect to `resource_name` in the background with an explicit failure policy.
    pub fn connect_with_policy<P>(
        provider: Arc<P>,
        resource_name: impl Into<String>,
        policy: FailurePolicy,
    ) -> Self
    where
        P: ConfigProvider + ?Sized + 'static,
    {
        let resource_name = resource_name.into();
        info!(resource = %resource_name, "connecting to MongoDB in the background");
        Self::spawn(
            async move { MongoDb::connect(provider.as_ref(), &resource_name).await },
            policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{sync::oneshot, time::timeout};

    use super::*;
    use crate::resource::StaticConfigProvider;

    fn controlled() -> (oneshot::Sender<Result<u32, String>>, Deferred<u32>) {
        let (tx, rx) = oneshot::channel();
        let deferred = Deferred::spawn(
            async move { rx.await.unwrap_or_else(|_| Err("sender dropped".to_string())) },
            FailurePolicy::Report,
        );
        (tx, deferred)
    }

    #[tokio::test]
    async fn readers_wait_until_ready() {
        let (tx, deferred) = controlled();

        assert!(!deferred.is_ready());
        assert!(matches!(
            deferred.try_get(),
            Err(DeferredError::NotReady { .. })
        ));
        assert!(
            timeout(Duration::from_millis(50), deferred.get())
                .await
                .is_err(),
            "get must not return while pending"
        );

        let waiter = {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.get().await })
        };
        tx.send(Ok(7)).unwrap();

        assert_eq!(waiter.await.unwrap(), Ok(7));
        assert_eq!(deferred.get().await, Ok(7));
        assert_eq!(deferred.try_get(), Ok(7));
        assert!(deferred.is_ready());
    }

    #[tokio::test]
    async fn failure_turns_into_not_ready() {
        let (tx, deferred) = controlled();

        let waiter = {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.get().await })
        };
        tx.send(Err("connection refused".into())).unwrap();

        let expected = Err(DeferredError::NotReady {
            reason: "connection refused".into(),
        });
        assert_eq!(waiter.await.unwrap(), expected);
        assert_eq!(deferred.get().await, expected);
        assert_eq!(deferred.try_get(), expected);
        assert!(!deferred.is_ready());
    }

    #[tokio::test]
    async fn failed_lookup_is_reported() {
        let provider = Arc::new(StaticConfigProvider::new("acme/orders"));

        let deferred =
            DeferredMongoDb::connect_with_policy(provider, "orders", FailurePolicy::Report);

        let err = deferred.get().await.unwrap_err();
        let DeferredError::NotReady { reason } = err;
        assert!(reason.contains("orders"));
    }
}
