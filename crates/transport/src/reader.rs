//! Line-framed JSON reader for child-process stdout.
//!
//! The stdio wire format is one JSON object per line. This reader pulls
//! bytes from an `AsyncRead` source into a buffer, splits on `\n`, and
//! yields each non-empty line parsed as JSON. Blank lines are skipped;
//! unparseable lines are yielded as errors so the caller can decide to log
//! and continue.
//!
//! # Buffer overflow protection
//!
//! A line that grows beyond `max_buffer_size` without a newline aborts the
//! stream with a `Transport` error. The default limit is 64KB.

use cubicler_types::CubiclerError;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, BufReader};

// Default buffer size 64KB
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

pin_project! {
    /// A stream of parsed JSON lines from an AsyncRead source.
    ///
    /// # Error handling
    ///
    /// - **EOF**: yields any final unterminated line, then `None`
    /// - **Invalid JSON on a line**: yields a `JsonDecode` error for that
    ///   line and continues with the next
    /// - **Buffer overflow**: yields a `Transport` error and ends the stream
    pub struct MessageReader<R> {
        #[pin]
        reader: BufReader<R>,
        buffer: String,
        max_buffer_size: usize,
        done: bool,
    }
}

impl<R: AsyncRead> MessageReader<R> {
    /// Create a new message reader with the default 64KB line limit.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new message reader with a custom line limit.
    pub fn with_capacity(inner: R, max_size: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            buffer: String::new(),
            max_buffer_size: max_size,
            done: false,
        }
    }
}

fn parse_line(line: &str) -> Option<Result<Value, CubiclerError>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).map_err(|e| {
        let preview: String = trimmed.chars().take(100).collect();
        CubiclerError::JsonDecode(format!("parse error: {}. Line preview: {}", e, preview))
    }))
}

impl<R: AsyncRead + Unpin> Stream for MessageReader<R> {
    type Item = Result<Value, CubiclerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.done {
            return Poll::Ready(None);
        }

        loop {
            // 1. Emit the next complete line already in the buffer.
            while let Some(newline) = this.buffer.find('\n') {
                let line: String = this.buffer.drain(..=newline).collect();
                if let Some(parsed) = parse_line(&line) {
                    return Poll::Ready(Some(parsed));
                }
            }

            // 2. Read more data.
            let mut buf = [0u8; 1024];
            let mut read_buf = tokio::io::ReadBuf::new(&mut buf);

            match this.reader.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let n = read_buf.filled().len();
                    if n == 0 {
                        // EOF: flush any unterminated final line.
                        *this.done = true;
                        let rest = std::mem::take(this.buffer);
                        return Poll::Ready(parse_line(&rest));
                    }

                    let chunk = String::from_utf8_lossy(read_buf.filled());
                    this.buffer.push_str(&chunk);

                    if this.buffer.len() > *this.max_buffer_size {
                        *this.done = true;
                        return Poll::Ready(Some(Err(CubiclerError::Transport(
                            "line buffer overflow".to_string(),
                        ))));
                    }
                }
                Poll::Ready(Err(e)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(CubiclerError::Transport(e.to_string()))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    async fn collect(input: &str) -> Vec<Result<Value, CubiclerError>> {
        let reader = MessageReader::new(input.as_bytes());
        Box::pin(reader).collect().await
    }

    #[tokio::test]
    async fn parses_one_object_per_line() {
        let items = collect("{\"id\":1}\n{\"id\":2}\n").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap()["id"], json!(1));
        assert_eq!(items[1].as_ref().unwrap()["id"], json!(2));
    }

    #[tokio::test]
    async fn skips_blank_lines() {
        let items = collect("\n\n{\"id\":1}\n\n").await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn yields_error_for_bad_line_and_continues() {
        let items = collect("not json\n{\"id\":1}\n").await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert!(items[1].is_ok());
    }

    #[tokio::test]
    async fn flushes_unterminated_final_line() {
        let items = collect("{\"id\":1}").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap()["id"], json!(1));
    }

    #[tokio::test]
    async fn overflow_aborts_the_stream() {
        let long_line = format!("{{\"data\":\"{}\"", "x".repeat(200));
        let reader = MessageReader::with_capacity(long_line.as_bytes(), 64);
        let items: Vec<_> = Box::pin(reader).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(CubiclerError::Transport(_))));
    }
}
