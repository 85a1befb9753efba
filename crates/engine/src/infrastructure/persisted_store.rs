//! Typed, observable, namespaced JSON persistence.
//!
//! A [`PersistedStore`] owns one value of `T` for the currently selected key.
//! All commands go through a single task, so writes are applied one at a time
//! and the full blob is rewritten on each update (last write wins).
//!
//! Observers never read the authoritative value directly. They read the last
//! published [`Observed`] snapshot, which is only replaced after a write has
//! gone through the backend. Anything keyed off "the write is visible" (such
//! as releasing a pending slot claim) watches these snapshots.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::infrastructure::ports::{BlobStorePort, RepoError};

/// A published view of the store.
#[derive(Debug)]
pub struct Observed<T> {
    /// Key the data belongs to (empty before the first load)
    pub key: String,
    /// False until the initial read for `key` has finished
    pub loaded: bool,
    /// Bumped on every publish
    pub revision: u64,
    pub data: Arc<T>,
}

impl<T> Clone for Observed<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            loaded: self.loaded,
            revision: self.revision,
            data: Arc::clone(&self.data),
        }
    }
}

type Updater<T> = Box<dyn FnOnce(&T) -> T + Send>;
type LoadHook<T> = Box<dyn Fn(T) -> T + Send + Sync>;

enum Command<T> {
    Load {
        key: String,
        reply: oneshot::Sender<Result<(), RepoError>>,
    },
    Update(Updater<T>),
    OverrideNextLoad(T),
    Flush(oneshot::Sender<()>),
}

/// Handle to a store task. Cheap to clone.
pub struct PersistedStore<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    observed: watch::Receiver<Observed<T>>,
}

impl<T> Clone for PersistedStore<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            observed: self.observed.clone(),
        }
    }
}

impl<T> PersistedStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Start the store task. Nothing is read until [`load`](Self::load).
    ///
    /// Every loaded value (stored or overridden) passes through `on_load`
    /// before it is published.
    pub fn spawn<F>(
        backend: Arc<dyn BlobStorePort>,
        namespace: impl Into<String>,
        initial: T,
        on_load: F,
    ) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (publisher, observed) = watch::channel(Observed {
            key: String::new(),
            loaded: false,
            revision: 0,
            data: Arc::new(initial.clone()),
        });

        let actor = StoreActor {
            backend,
            namespace: namespace.into(),
            current: initial.clone(),
            initial,
            key: String::new(),
            pending_override: None,
            on_load: Box::new(on_load),
            loaded: false,
            revision: 0,
            publisher,
        };
        tokio::spawn(actor.run(receiver));

        Self { commands, observed }
    }

    /// Select `key` and read its data. The store reports `loaded == false`
    /// until this finishes.
    pub async fn load(&self, key: impl Into<String>) -> Result<(), RepoError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Load {
                key: key.into(),
                reply,
            })
            .map_err(|_| RepoError::Closed)?;
        response.await.map_err(|_| RepoError::Closed)?
    }

    /// Queue an update. Returns immediately; the change becomes visible in
    /// [`snapshot`](Self::snapshot) once it has been written.
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        if self.commands.send(Command::Update(Box::new(updater))).is_err() {
            tracing::error!("Persisted store task is gone, update dropped");
        }
    }

    /// Use `data` instead of reading the backend on the next load.
    pub fn override_next_load(&self, data: T) {
        if self.commands.send(Command::OverrideNextLoad(data)).is_err() {
            tracing::error!("Persisted store task is gone, override dropped");
        }
    }

    /// Wait until every command queued before this call has been applied.
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }

    pub fn snapshot(&self) -> Observed<T> {
        self.observed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Observed<T>> {
        self.observed.clone()
    }
}

struct StoreActor<T> {
    backend: Arc<dyn BlobStorePort>,
    namespace: String,
    initial: T,
    current: T,
    key: String,
    pending_override: Option<T>,
    on_load: LoadHook<T>,
    loaded: bool,
    revision: u64,
    publisher: watch::Sender<Observed<T>>,
}

impl<T> StoreActor<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<T>>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Load { key, reply } => {
                    let result = self.load(key).await;
                    let _ = reply.send(result);
                }
                Command::Update(updater) => self.apply(updater).await,
                Command::OverrideNextLoad(data) => self.pending_override = Some(data),
                Command::Flush(reply) => {
                    let _ = reply.send(());
                }
            }
        }
        tracing::debug!(namespace = %self.namespace, "Persisted store task stopped");
    }

    async fn load(&mut self, key: String) -> Result<(), RepoError> {
        // Hide the previous key's data while the new one is read.
        self.loaded = false;
        self.key = key;
        self.current = self.initial.clone();
        self.publish();

        if let Some(data) = self.pending_override.take() {
            tracing::debug!(
                namespace = %self.namespace,
                key = %self.key,
                "Using override instead of stored data"
            );
            self.current = (self.on_load)(data);
            self.persist().await;
        } else {
            match self.backend.load(&self.namespace, &self.key).await {
                Ok(Some(json)) => match serde_json::from_str::<T>(&json) {
                    Ok(data) => self.current = (self.on_load)(data),
                    Err(e) => {
                        tracing::warn!(
                            namespace = %self.namespace,
                            key = %self.key,
                            error = %e,
                            "Stored data is unreadable, starting from initial value"
                        );
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        namespace = %self.namespace,
                        key = %self.key,
                        error = %e,
                        "Failed to load stored data"
                    );
                    return Err(e);
                }
            }
        }

        self.loaded = true;
        self.publish();
        tracing::debug!(namespace = %self.namespace, key = %self.key, "Persisted store loaded");
        Ok(())
    }

    async fn apply(&mut self, updater: Updater<T>) {
        if !self.loaded {
            tracing::warn!(
                namespace = %self.namespace,
                key = %self.key,
                "Update before load finished, ignoring"
            );
            return;
        }
        self.current = updater(&self.current);
        self.persist().await;
        self.publish();
    }

    async fn persist(&self) {
        let json = match serde_json::to_string(&self.current) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(namespace = %self.namespace, error = %e, "Failed to serialize store data");
                return;
            }
        };
        if let Err(e) = self.backend.save(&self.namespace, &self.key, &json).await {
            // The in-memory value stays authoritative; the next write retries the full blob.
            tracing::error!(
                namespace = %self.namespace,
                key = %self.key,
                error = %e,
                "Failed to persist store data"
            );
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.publisher.send_replace(Observed {
            key: self.key.clone(),
            loaded: self.loaded,
            revision: self.revision,
            data: Arc::new(self.current.clone()),
        });
    }
}
