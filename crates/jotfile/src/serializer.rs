//! The FIFO operation gate.
//!
//! Every public operation is a boxed closure drained by a single worker
//! task, so operations run one at a time in submission order and always
//! observe a consistent snapshot. The queue starts paused: tasks
//! submitted before `load` buffer behind the bootstrap and run only
//! once it succeeds; if it fails, they and every later task fail with
//! that same error.

use jotfile_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A queued operation. Receives the worker state, or the load error
/// when bootstrap failed.
type Task<S> = Box<dyn FnOnce(std::result::Result<&mut S, &Error>) + Send>;

enum Command<S> {
    Load { reply: oneshot::Sender<Result<()>> },
    Task(Task<S>),
}

/// Handle to the worker. The worker exits once every handle is dropped
/// and the queue has drained.
pub(crate) struct Serializer<S> {
    tx: mpsc::UnboundedSender<Command<S>>,
}

impl<S> Clone for Serializer<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: Send + 'static> Serializer<S> {
    /// Spawn the worker. `bootstrap` runs when the load command arrives
    /// and produces the state every subsequent task borrows.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(bootstrap: F) -> (Self, JoinHandle<()>)
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<S>>();
        let worker = tokio::spawn(async move {
            let mut bootstrap = Some(bootstrap);
            let mut pending: Vec<Task<S>> = Vec::new();
            let mut state: Option<std::result::Result<S, Error>> = None;

            while let Some(command) = rx.recv().await {
                match command {
                    Command::Load { reply } => {
                        let Some(f) = bootstrap.take() else {
                            let _ = reply.send(Ok(()));
                            continue;
                        };
                        match f() {
                            Ok(s) => {
                                state = Some(Ok(s));
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                state = Some(Err(e.clone()));
                                let _ = reply.send(Err(e));
                            }
                        }
                        // Unpause: drain the buffer in submission order.
                        if let Some(st) = state.as_mut() {
                            for task in std::mem::take(&mut pending) {
                                run_task(st, task);
                            }
                        }
                    }
                    Command::Task(task) => match state.as_mut() {
                        None => pending.push(task),
                        Some(st) => run_task(st, task),
                    },
                }
            }
        });
        (Self { tx }, worker)
    }

    /// Enqueue an operation and wait for its result. A task error fails
    /// only this call; the queue keeps going.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let task: Task<S> = Box::new(move |state| {
            let outcome = match state {
                Ok(s) => f(s),
                Err(e) => Err(e.clone()),
            };
            let _ = reply.send(outcome);
        });
        if self.tx.send(Command::Task(task)).is_err() {
            return Err(Error::Internal("operation gate is closed".into()));
        }
        rx.await
            .unwrap_or_else(|_| Err(Error::Internal("operation dropped without a reply".into())))
    }

    /// Run the bootstrap. Tasks already queued run right after it, in
    /// their submission order.
    pub async fn load(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Load { reply }).is_err() {
            return Err(Error::Internal("operation gate is closed".into()));
        }
        rx.await
            .unwrap_or_else(|_| Err(Error::Internal("load dropped without a reply".into())))
    }

    /// Barrier: resolves once every previously submitted task has run.
    pub async fn wait(&self) -> Result<()> {
        self.run(|_| Ok(())).await
    }
}

fn run_task<S>(state: &mut std::result::Result<S, Error>, task: Task<S>) {
    match state {
        Ok(s) => task(Ok(s)),
        Err(e) => task(Err(e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
