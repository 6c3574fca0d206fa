//! Newline framing with a per-line size bound
//!
//! A line that grows past the limit is not buffered further: the reader switches
//! to discard mode until the next newline and then reports [`LineRead::TooLong`]
//! once, so one oversized message cannot exhaust memory or end the stream.
//!
//! The limit applies to the line content: a trailing `\r` before the newline
//! is not counted, so CRLF output gets the same budget as LF output.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One framed line from a [`BoundedLineReader`]
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line without its terminator (`\n` or `\r\n`)
    Line(Vec<u8>),
    /// A line that exceeded the limit; its bytes were dropped
    TooLong {
        /// Bytes seen before the terminator
        observed_bytes: usize,
        /// The configured limit
        max_line_bytes: usize,
    },
}

/// Async line reader that never holds more than `max_line_bytes + 1` bytes of
/// one line (the extra byte is room for a `\r` terminator)
pub struct BoundedLineReader<R> {
    reader: R,
    max_line_bytes: usize,
    current_line: Vec<u8>,
    observed_bytes: usize,
    discard_mode: bool,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> BoundedLineReader<R> {
    /// Wrap `reader`, rejecting lines longer than `max_line_bytes`
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            current_line: Vec::new(),
            observed_bytes: 0,
            discard_mode: false,
            done: false,
        }
    }

    /// Read the next line. `Ok(None)` at end of input.
    ///
    /// Partial progress is kept in `self`, so dropping the returned future
    /// (e.g. from a `select!`) loses no bytes.
    pub async fn next_line(&mut self) -> io::Result<Option<LineRead>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                self.done = true;
                if self.discard_mode || !self.current_line.is_empty() {
                    return Ok(Some(self.finish_line()));
                }
                return Ok(None);
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let segment = &available[..newline.unwrap_or(available.len())];

            // Field-level borrows only: `available` still borrows `self.reader`.
            // One byte of slack for a `\r`; finish_line makes the exact call.
            self.observed_bytes = self.observed_bytes.saturating_add(segment.len());
            let slack_limit = self.max_line_bytes.saturating_add(1);
            if !self.discard_mode && self.observed_bytes > slack_limit {
                self.discard_mode = true;
                self.current_line = Vec::new();
            }
            if !self.discard_mode {
                self.current_line.extend_from_slice(segment);
            }

            match newline {
                Some(idx) => {
                    self.reader.consume(idx + 1);
                    return Ok(Some(self.finish_line()));
                }
                None => {
                    let len = segment.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    fn finish_line(&mut self) -> LineRead {
        let observed_bytes = std::mem::take(&mut self.observed_bytes);
        if std::mem::take(&mut self.discard_mode) {
            return LineRead::TooLong {
                observed_bytes,
                max_line_bytes: self.max_line_bytes,
            };
        }

        let mut line = std::mem::take(&mut self.current_line);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > self.max_line_bytes {
            return LineRead::TooLong {
                observed_bytes,
                max_line_bytes: self.max_line_bytes,
            };
        }
        LineRead::Line(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn collect(input: &[u8], max: usize, capacity: usize) -> Vec<LineRead> {
        let mut reader = BoundedLineReader::new(BufReader::with_capacity(capacity, input), max);
        let mut out = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn test_splits_lines() {
        let lines = collect(b"one\ntwo\r\n\nthree", 16, 8192).await;
        assert_eq!(
            lines,
            vec![
                LineRead::Line(b"one".to_vec()),
                LineRead::Line(b"two".to_vec()),
                LineRead::Line(Vec::new()),
                LineRead::Line(b"three".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let lines = collect(b"abcd\nnext\n", 4, 8192).await;
        assert_eq!(lines[0], LineRead::Line(b"abcd".to_vec()));
        assert_eq!(lines[1], LineRead::Line(b"next".to_vec()));
    }

    #[tokio::test]
    async fn test_crlf_terminator_not_counted_against_limit() {
        let lines = collect(b"abcd\r\nabcde\r\nabcde\nok\r\n", 4, 3).await;
        assert_eq!(
            lines,
            vec![
                LineRead::Line(b"abcd".to_vec()),
                LineRead::TooLong {
                    observed_bytes: 6,
                    max_line_bytes: 4
                },
                LineRead::TooLong {
                    observed_bytes: 5,
                    max_line_bytes: 4
                },
                LineRead::Line(b"ok".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_oversized_line_reported_once_and_reading_continues() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\n{\"ok\":true}\n");

        // Small buffer so the oversized line spans many fill_buf calls
        let lines = collect(&input, 10, 7).await;
        assert_eq!(
            lines,
            vec![
                LineRead::TooLong {
                    observed_bytes: 100,
                    max_line_bytes: 10
                },
                LineRead::Line(b"{\"ok\":true}".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_oversized_trailing_line_without_newline() {
        let input = vec![b'y'; 50];
        let lines = collect(&input, 10, 8192).await;
        assert_eq!(
            lines,
            vec![LineRead::TooLong {
                observed_bytes: 50,
                max_line_bytes: 10
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        assert!(collect(b"", 10, 8192).await.is_empty());
    }
}
