//! Simple query API for one-shot Claude interactions
//!
//! The [`query()`] function sends a prompt to the Claude CLI and returns a
//! [`QueryStream`] of response messages.
//!
//! # Example
//!
//! ```no_run
//! use claw_stream::options::{PermissionMode, QueryOptions};
//! use claw_stream::query;
//! use tokio_stream::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = QueryOptions::builder()
//!         .max_turns(5)
//!         .permission_mode(PermissionMode::AcceptEdits)
//!         .build();
//!
//!     let mut stream = query("What files are in this directory?", &options, CancellationToken::new()).await?;
//!
//!     while let Some(message) = stream.next().await {
//!         println!("{:?}", message);
//!     }
//!     Ok(())
//! }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ClawError;
use crate::messages::Message;
use crate::options::QueryOptions;
use crate::transport::{StreamLimits, SubprocessCLITransport, Transport};

/// Messages from one query
///
/// The stream ends after the CLI process has been torn down, whether it finished
/// on its own, the query was cancelled, or setup of the stream failed midway.
/// Dropping the stream stops the query.
pub struct QueryStream {
    inner: ReceiverStream<Message>,
    session: CancellationToken,
    pid: Option<u32>,
}

impl QueryStream {
    /// Process ID of the CLI serving this query
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Stop the query; the stream ends once the process is gone
    pub fn cancel(&self) {
        self.session.cancel();
    }
}

impl Stream for QueryStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        self.session.cancel();
    }
}

/// Execute a one-shot query to Claude and return a stream of messages
///
/// Each call spawns its own CLI process. Cancelling `cancel` (or calling
/// [`QueryStream::cancel`]) ends the stream.
///
/// # Errors
///
/// - `ClawError::CliNotFound` if Claude CLI is not found
/// - `ClawError::Connection` if the working directory is missing or pipes fail
/// - `ClawError::Process` if a custom `cli_path` cannot be started
pub async fn query(
    prompt: impl Into<String>,
    options: &QueryOptions,
    cancel: CancellationToken,
) -> Result<QueryStream, ClawError> {
    query_with_limits(prompt, options, StreamLimits::default(), cancel).await
}

/// [`query()`] with explicit resource bounds
pub async fn query_with_limits(
    prompt: impl Into<String>,
    options: &QueryOptions,
    limits: StreamLimits,
    cancel: CancellationToken,
) -> Result<QueryStream, ClawError> {
    let prompt = prompt.into();
    let mut transport = SubprocessCLITransport::new().with_limits(limits);

    if let Err(e) = transport.connect(options, &prompt).await {
        let _ = transport.disconnect().await;
        return Err(e);
    }
    let pid = transport.pid();

    let mut stream = query_with_transport(transport, limits.channel_capacity, cancel).await?;
    stream.pid = pid;
    Ok(stream)
}

/// Stream messages from an already connected transport
///
/// The transport is disconnected when forwarding ends, before the returned
/// stream closes.
pub async fn query_with_transport<T>(
    mut transport: T,
    capacity: usize,
    cancel: CancellationToken,
) -> Result<QueryStream, ClawError>
where
    T: Transport + 'static,
{
    let session = cancel.child_token();

    let mut rx = match transport.receive_messages(session.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            let _ = transport.disconnect().await;
            return Err(e);
        }
    };

    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    let forward_token = session.clone();

    tokio::spawn(async move {
        forward(&mut rx, &tx, &forward_token).await;

        if let Err(e) = transport.disconnect().await {
            warn!("Disconnect after query failed: {}", e);
        }
        debug!("Query finished");
        // `tx` drops last: a closed stream means the process is gone.
        drop(tx);
    });

    Ok(QueryStream {
        inner: ReceiverStream::new(out_rx),
        session,
        pid: None,
    })
}

async fn forward(
    rx: &mut mpsc::Receiver<Message>,
    tx: &mpsc::Sender<Message>,
    cancel: &CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            message = rx.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(message) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
