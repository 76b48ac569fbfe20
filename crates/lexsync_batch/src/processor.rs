//! The batch processor and its flush task.

use crate::config::BatchConfig;
use crate::error::{BatchError, BatchResult};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

type HandlerFuture<R> = Pin<Box<dyn Future<Output = Result<Vec<R>, String>> + Send>>;
type Handler<T, R> = Arc<dyn Fn(Vec<T>) -> HandlerFuture<R> + Send + Sync>;

/// One operation between `add` and batch completion.
struct BatchOperation<T, R> {
    op_id: u64,
    payload: T,
    enqueued_at: Instant,
    reply: oneshot::Sender<BatchResult<R>>,
}

enum Command<T, R> {
    Add(BatchOperation<T, R>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Accumulates operations of type `T` and resolves each with an `R`
/// produced by a batch handler.
///
/// Creating a processor spawns its flush task, so it must happen inside a
/// Tokio runtime. Dropping the processor flushes whatever is still
/// buffered and stops the task.
pub struct BatchProcessor<T, R> {
    config: BatchConfig,
    commands: mpsc::UnboundedSender<Command<T, R>>,
    next_op_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

impl<T, R> BatchProcessor<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Creates a processor that passes chunks of up to
    /// `config.batch_size` payloads to `handler`.
    ///
    /// The handler must return exactly one result per payload, in order.
    /// An `Err` rejects every operation of that chunk and nothing else.
    pub fn new<F, Fut, E>(config: BatchConfig, handler: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
        E: Display,
    {
        // Literal configs bypass the clamp in `BatchConfig::new`.
        let config = config.with_batch_size(config.batch_size);
        let handler: Handler<T, R> = Arc::new(move |items| {
            let fut = handler(items);
            Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
        });

        let (commands, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = FlushWorker {
            config,
            handler,
            buffer: Vec::new(),
            pending: Arc::clone(&pending),
        };
        tokio::spawn(worker.run(receiver));

        Self {
            config,
            commands,
            next_op_id: AtomicU64::new(1),
            pending,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Queues `payload` and returns a future for its result.
    ///
    /// The operation is queued when `add` is called, not when the future is
    /// first polled, so operations keep the order of their `add` calls.
    pub fn add(&self, payload: T) -> impl Future<Output = BatchResult<R>> + Send + 'static {
        let (reply, result) = oneshot::channel();
        let operation = BatchOperation {
            op_id: self.next_op_id.fetch_add(1, Ordering::Relaxed),
            payload,
            enqueued_at: Instant::now(),
            reply,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.commands.send(Command::Add(operation)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }

        async move { result.await.unwrap_or(Err(BatchError::Closed)) }
    }

    /// Flushes every operation queued before this call.
    ///
    /// Resolves once those operations have been handed to the handler and
    /// their results delivered.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Closed`] if the processor has shut down.
    pub async fn flush(&self) -> BatchResult<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Flush(ack))
            .map_err(|_| BatchError::Closed)?;
        done.await.map_err(|_| BatchError::Closed)
    }

    /// Flushes everything still queued and stops the flush task.
    ///
    /// Later `add` calls resolve to [`BatchError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Closed`] if the processor already shut down.
    pub async fn close(&self) -> BatchResult<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(ack))
            .map_err(|_| BatchError::Closed)?;
        done.await.map_err(|_| BatchError::Closed)
    }

    /// Number of operations added but not yet resolved.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

struct FlushWorker<T, R> {
    config: BatchConfig,
    handler: Handler<T, R>,
    buffer: Vec<BatchOperation<T, R>>,
    pending: Arc<AtomicUsize>,
}

impl<T, R> FlushWorker<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<T, R>>) {
        loop {
            let deadline = self
                .buffer
                .first()
                .map(|op| op.enqueued_at + self.config.flush_timeout);

            let command = match deadline {
                Some(at) => tokio::select! {
                    command = commands.recv() => command,
                    () = tokio::time::sleep_until(at) => {
                        debug!(buffered = self.buffer.len(), "flush timeout elapsed");
                        self.flush_all().await;
                        continue;
                    }
                },
                None => commands.recv().await,
            };

            match command {
                Some(Command::Add(operation)) => {
                    self.buffer.push(operation);
                    if self.buffer.len() >= self.config.batch_size {
                        self.flush_all().await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    self.flush_all().await;
                    let _ = ack.send(());
                }
                Some(Command::Shutdown(ack)) => {
                    commands.close();
                    let mut acks = vec![ack];
                    while let Some(command) = commands.recv().await {
                        match command {
                            Command::Add(operation) => self.buffer.push(operation),
                            Command::Flush(ack) | Command::Shutdown(ack) => acks.push(ack),
                        }
                    }
                    self.flush_all().await;
                    for ack in acks {
                        let _ = ack.send(());
                    }
                    debug!("batch processor shut down");
                    return;
                }
                None => {
                    self.flush_all().await;
                    return;
                }
            }
        }
    }

    /// Hands the buffer to the handler in chunks of at most `batch_size`.
    async fn flush_all(&mut self) {
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.config.batch_size);
            let chunk: Vec<BatchOperation<T, R>> = self.buffer.drain(..take).collect();
            self.run_chunk(chunk).await;
        }
    }

    async fn run_chunk(&mut self, chunk: Vec<BatchOperation<T, R>>) {
        let expected = chunk.len();
        let first_op = chunk.first().map(|op| op.op_id).unwrap_or_default();
        let mut payloads = Vec::with_capacity(expected);
        let mut replies = Vec::with_capacity(expected);
        for operation in chunk {
            payloads.push(operation.payload);
            replies.push(operation.reply);
        }

        debug!(size = expected, first_op, "flushing batch");
        // Spawned so a panicking handler fails its chunk instead of the worker.
        let outcome = match tokio::spawn((self.handler)(payloads)).await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(format!("batch handler panicked: {join_error}")),
        };

        match outcome {
            Ok(results) if results.len() == expected => {
                for (reply, result) in replies.into_iter().zip(results) {
                    let _ = reply.send(Ok(result));
                }
            }
            Ok(results) => {
                let error = BatchError::LengthMismatch {
                    expected,
                    actual: results.len(),
                };
                warn!(first_op, %error, "rejecting batch");
                reject(replies, &error);
            }
            Err(message) => {
                warn!(first_op, size = expected, error = %message, "batch handler failed");
                reject(replies, &BatchError::Handler(message));
            }
        }

        self.pending.fetch_sub(expected, Ordering::SeqCst);
    }
}

fn reject<R>(replies: Vec<oneshot::Sender<BatchResult<R>>>, error: &BatchError) {
    for reply in replies {
        let _ = reply.send(Err(error.clone()));
    }
}
