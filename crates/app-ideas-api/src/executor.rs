//! Store executor for non-blocking store operations.
//!
//! The [`AppIdeaStore`] lives on one dedicated thread for its whole life, so
//! every write is serialized and no lock is held across an await point.
//! Callers submit closures and await the result over a oneshot channel.

use std::sync::mpsc;
use std::thread;

use app_ideas_store_sqlite::{AppIdeaStore, SchemaError, StoreConfig};
use tokio::sync::oneshot;

type StoreJob = Box<dyn FnOnce(&mut AppIdeaStore) + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to spawn store thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("store executor has shut down")]
    Closed,
    #[error("store thread panicked")]
    Panicked,
}

/// Runs store operations on a dedicated thread.
pub struct StoreExecutor {
    sender: mpsc::Sender<StoreJob>,
    handle: thread::JoinHandle<()>,
}

impl StoreExecutor {
    /// Spawn the store thread, open and migrate the store on it, and return
    /// once it is ready to accept operations.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Schema`] when the store cannot be opened or
    /// migrated; the thread has exited by then.
    pub async fn start(config: StoreConfig) -> Result<Self, ExecutorError> {
        let (sender, receiver) = mpsc::channel::<StoreJob>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SchemaError>>();

        let handle = thread::Builder::new()
            .name("app-ideas-store".to_string())
            .spawn(move || {
                let mut store = match AppIdeaStore::open(&config) {
                    Ok(store) => store,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                while let Ok(job) = receiver.recv() {
                    job(&mut store);
                }
                tracing::debug!("store thread stopped");
            })
            .map_err(ExecutorError::Spawn)?;

        ready_rx.await.map_err(|_| ExecutorError::Closed)??;
        Ok(Self { sender, handle })
    }

    /// Run `op` on the store thread and await its result.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Closed`] when the store thread is gone.
    pub async fn run<F, T>(&self, op: F) -> Result<T, ExecutorError>
    where
        F: FnOnce(&mut AppIdeaStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let response = self.submit(op)?;
        response.await.map_err(|_| ExecutorError::Closed)
    }

    /// Blocking variant of [`StoreExecutor::run`] for synchronous callers.
    /// Must not be called from inside an async task.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Closed`] when the store thread is gone.
    pub fn run_blocking<F, T>(&self, op: F) -> Result<T, ExecutorError>
    where
        F: FnOnce(&mut AppIdeaStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let response = self.submit(op)?;
        response.blocking_recv().map_err(|_| ExecutorError::Closed)
    }

    fn submit<F, T>(&self, op: F) -> Result<oneshot::Receiver<T>, ExecutorError>
    where
        F: FnOnce(&mut AppIdeaStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let job: StoreJob = Box::new(move |store| {
            let _ = response_tx.send(op(store));
        });
        self.sender.send(job).map_err(|_| ExecutorError::Closed)?;
        Ok(response_rx)
    }

    /// Finish queued operations, then close the store.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Panicked`] when an operation panicked the thread.
    pub fn shutdown(self) -> Result<(), ExecutorError> {
        let Self { sender, handle } = self;
        drop(sender);
        handle.join().map_err(|_| ExecutorError::Panicked)
    }
}
