//! Bounded capture of the CLI's stderr
//!
//! Stderr is drained concurrently with stdout so the child never blocks on a
//! full pipe. Only the first `max_bytes` are kept for the failure report; the
//! remainder is read and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::lines::{BoundedLineReader, LineRead};

/// Retained stderr lines plus truncation/timeout markers
#[derive(Debug, Default)]
pub(crate) struct StderrBuffer {
    lines: Vec<String>,
    size: usize,
    truncated: bool,
}

impl StderrBuffer {
    /// Retain `line` unless it would push the total past `max_bytes`.
    ///
    /// Returns `false` once the buffer is truncated; later lines are ignored.
    pub(crate) fn push_line(&mut self, line: String, max_bytes: usize) -> bool {
        if self.truncated {
            return false;
        }
        if self.size + line.len() > max_bytes {
            self.truncate();
            return false;
        }
        self.size += line.len();
        self.lines.push(line);
        true
    }

    fn truncate(&mut self) {
        if !self.truncated {
            self.truncated = true;
            self.lines
                .push(format!("[stderr truncated after {} bytes]", self.size));
        }
    }

    pub(crate) fn mark_timed_out(&mut self, after: Duration) {
        self.lines
            .push(format!("[stderr collection timed out after {after:?}]"));
    }

    pub(crate) fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Start draining `stderr` into `buffer`.
pub(crate) fn spawn_collector<R>(
    stderr: R,
    buffer: Arc<Mutex<StderrBuffer>>,
    max_bytes: usize,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        debug!("Started stderr reader task");
        let mut reader = BoundedLineReader::new(BufReader::new(stderr), max_bytes);
        let mut retaining = true;

        loop {
            match reader.next_line().await {
                Ok(Some(LineRead::Line(bytes))) => {
                    let line = String::from_utf8_lossy(&bytes).into_owned();
                    if retaining {
                        warn!("CLI stderr: {}", line);
                        retaining = buffer.lock().await.push_line(line, max_bytes);
                    } else {
                        trace!("Discarding stderr line ({} bytes)", line.len());
                    }
                }
                Ok(Some(LineRead::TooLong { observed_bytes, .. })) => {
                    warn!("CLI stderr line of {} bytes exceeds capture limit", observed_bytes);
                    buffer.lock().await.truncate();
                    retaining = false;
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stderr read failed: {}", e);
                    break;
                }
            }
        }

        debug!("Stderr reader task finished");
    })
}

/// Wait up to `limit` for the collector to reach EOF, then render the capture.
pub(crate) async fn finish(
    mut handle: JoinHandle<()>,
    buffer: &Mutex<StderrBuffer>,
    limit: Duration,
) -> String {
    if timeout(limit, &mut handle).await.is_err() {
        warn!("Stderr collection timed out after {:?}", limit);
        handle.abort();
        buffer.lock().await.mark_timed_out(limit);
    }
    buffer.lock().await.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_joins_lines() {
        let mut buffer = StderrBuffer::default();
        assert!(buffer.push_line("first".to_string(), 100));
        assert!(buffer.push_line("second".to_string(), 100));
        assert_eq!(buffer.render(), "first\nsecond");
    }

    #[test]
    fn test_buffer_truncates_once() {
        let mut buffer = StderrBuffer::default();
        assert!(buffer.push_line("12345".to_string(), 8));
        assert!(!buffer.push_line("6789".to_string(), 8));
        assert!(!buffer.push_line("more".to_string(), 8));
        assert_eq!(buffer.render(), "12345\n[stderr truncated after 5 bytes]");
    }

    #[test]
    fn test_timeout_marker_format() {
        let mut buffer = StderrBuffer::default();
        buffer.mark_timed_out(Duration::from_secs(30));
        assert_eq!(buffer.render(), "[stderr collection timed out after 30s]");
    }

    #[tokio::test]
    async fn test_collector_reads_until_eof() {
        let buffer = Arc::new(Mutex::new(StderrBuffer::default()));
        let input: &[u8] = b"warning: one\nerror: two\n";
        let handle = spawn_collector(input, buffer.clone(), 1024);

        let text = finish(handle, &buffer, Duration::from_secs(5)).await;
        assert_eq!(text, "warning: one\nerror: two");
    }

    #[tokio::test]
    async fn test_collector_truncates_large_output() {
        let buffer = Arc::new(Mutex::new(StderrBuffer::default()));
        let mut input = Vec::new();
        for _ in 0..10 {
            input.extend_from_slice(b"0123456789\n");
        }
        let handle = spawn_collector(std::io::Cursor::new(input), buffer.clone(), 25);

        let text = finish(handle, &buffer, Duration::from_secs(5)).await;
        assert_eq!(
            text,
            "0123456789\n0123456789\n[stderr truncated after 20 bytes]"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_times_out_on_open_pipe() {
        let buffer = Arc::new(Mutex::new(StderrBuffer::default()));
        // The write half stays open, so the collector never sees EOF.
        let (_writer, reader) = tokio::io::duplex(64);
        let handle = spawn_collector(reader, buffer.clone(), 1024);

        let text = finish(handle, &buffer, Duration::from_secs(30)).await;
        assert_eq!(text, "[stderr collection timed out after 30s]");
    }
}
