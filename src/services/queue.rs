//! Inbound record queues.
//!
//! A queue yields raw message bodies; each body is expected to be a JSON
//! array of candidate records and is decoded by the supervisor, which
//! discards anything malformed.

use std::io::{BufRead, ErrorKind};
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::QueueError;
use crate::models::{CandidateRecord, DEFAULT_MAX_MESSAGE_BYTES};

/// Ordered source of batch messages.
///
/// `recv` must be cancel-safe: the supervisor races it against the
/// shutdown signal and drops the losing future.
#[async_trait]
pub trait RecordQueue: Send {
    /// Next message body. `None` means the queue is closed. An `Err` means
    /// the connection to the queue is lost, except for
    /// [`QueueError::Oversized`], which only rejects one message.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, QueueError>>;
}

/// Splits a byte stream on `\n` into bounded messages.
///
/// Bytes are never interpreted as text here; invalid UTF-8 is left for the
/// JSON decoder to reject. A line longer than `max_bytes` is dropped as it
/// streams past, so it never occupies more than `max_bytes` of memory.
#[derive(Debug)]
struct LineFramer {
    max_bytes: usize,
    line: Vec<u8>,
    /// Length of the current line once it has overflowed; zero otherwise.
    overflow: usize,
}

impl LineFramer {
    fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes.max(1),
            line: Vec::new(),
            overflow: 0,
        }
    }

    /// Take bytes from `chunk` up to and including the first newline.
    ///
    /// Returns how many bytes were taken and the completed message, if any.
    /// Blank lines complete nothing.
    fn feed(&mut self, chunk: &[u8]) -> (usize, Option<Result<Vec<u8>, QueueError>>) {
        match chunk.iter().position(|&b| b == b'\n') {
            Some(end) => {
                self.append(&chunk[..end]);
                (end + 1, self.finish())
            }
            None => {
                self.append(chunk);
                (chunk.len(), None)
            }
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.overflow > 0 {
            self.overflow += bytes.len();
        } else if self.line.len() + bytes.len() > self.max_bytes {
            self.overflow = self.line.len() + bytes.len();
            self.line = Vec::new();
        } else {
            self.line.extend_from_slice(bytes);
        }
    }

    /// Close the current line (at a newline or at end of input).
    fn finish(&mut self) -> Option<Result<Vec<u8>, QueueError>> {
        if self.overflow > 0 {
            let size = std::mem::take(&mut self.overflow);
            return Some(Err(QueueError::Oversized {
                size,
                limit: self.max_bytes,
            }));
        }
        let line = std::mem::take(&mut self.line);
        if line.trim_ascii().is_empty() {
            None
        } else {
            Some(Ok(line))
        }
    }
}

/// Newline-delimited messages from any buffered reader. EOF closes the queue.
pub struct JsonLinesQueue<R> {
    reader: R,
    framer: LineFramer,
}

impl<R> JsonLinesQueue<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(DEFAULT_MAX_MESSAGE_BYTES),
        }
    }

    #[must_use]
    pub fn with_max_message_bytes(mut self, max_bytes: usize) -> Self {
        self.framer = LineFramer::new(max_bytes);
        self
    }
}

impl JsonLinesQueue<BufReader<File>> {
    pub async fn open(path: &Path) -> Result<Self, QueueError> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R> RecordQueue for JsonLinesQueue<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn recv(&mut self) -> Option<Result<Vec<u8>, QueueError>> {
        loop {
            // Framer state only changes between awaits, which keeps this cancel-safe.
            let (consumed, message) = match self.reader.fill_buf().await {
                Ok([]) => return self.framer.finish(),
                Ok(chunk) => self.framer.feed(chunk),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(QueueError::IoError(e))),
            };
            self.reader.consume(consumed);
            if message.is_some() {
                return message;
            }
        }
    }
}

/// In-process queue backed by a bounded channel.
pub struct ChannelQueue {
    rx: mpsc::Receiver<Result<Vec<u8>, QueueError>>,
}

/// Producer side of a [`ChannelQueue`]. Dropping every clone closes the queue.
#[derive(Debug, Clone)]
pub struct QueuePublisher {
    tx: mpsc::Sender<Result<Vec<u8>, QueueError>>,
}

pub fn channel_queue(capacity: usize) -> (QueuePublisher, ChannelQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueuePublisher { tx }, ChannelQueue { rx })
}

impl QueuePublisher {
    /// Publish a raw message body.
    pub async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError> {
        self.tx
            .send(Ok(body))
            .await
            .map_err(|_| QueueError::Disconnected("consumer dropped".to_string()))
    }

    /// Serialize and publish a batch of records.
    pub async fn publish_batch(&self, batch: &[CandidateRecord]) -> Result<(), QueueError> {
        let body = serde_json::to_vec(batch).map_err(|e| {
            QueueError::IoError(std::io::Error::new(ErrorKind::InvalidData, e))
        })?;
        self.publish(body).await
    }
}

#[async_trait]
impl RecordQueue for ChannelQueue {
    async fn recv(&mut self) -> Option<Result<Vec<u8>, QueueError>> {
        self.rx.recv().await
    }
}

/// Newline-delimited messages from standard input.
///
/// Lines are read on a detached thread so that shutdown never waits on a
/// blocked terminal read. A read error is delivered as a queue failure.
pub fn stdin_queue(capacity: usize, max_message_bytes: usize) -> ChannelQueue {
    let (publisher, queue) = channel_queue(capacity);

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        forward_lines(stdin.lock(), max_message_bytes, &publisher);
    });

    queue
}

/// Blocking read loop behind [`stdin_queue`]. Returns at EOF, on a read
/// error, or once the consumer is gone.
fn forward_lines<R: BufRead>(mut reader: R, max_message_bytes: usize, publisher: &QueuePublisher) {
    let mut framer = LineFramer::new(max_message_bytes);

    loop {
        let (consumed, message) = match reader.fill_buf() {
            Ok([]) => (0, framer.finish()),
            Ok(chunk) => framer.feed(chunk),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "failed to read standard input");
                let _ = publisher.tx.blocking_send(Err(QueueError::IoError(e)));
                return;
            }
        };
        let at_eof = consumed == 0;
        reader.consume(consumed);

        if let Some(message) = message
            && publisher.tx.blocking_send(message).is_err()
        {
            return;
        }
        if at_eof {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::decode_batch;
    use std::io::Write;

    #[tokio::test]
    async fn test_json_lines_skips_blank_lines() {
        let input: &[u8] = b"[{\"id\":\"a\"}]\n\n   \n[{\"id\":\"b\"}]\n";
        let mut queue = JsonLinesQueue::new(input);

        let first = queue.recv().await.unwrap().unwrap();
        assert_eq!(first, b"[{\"id\":\"a\"}]");
        let second = queue.recv().await.unwrap().unwrap();
        assert_eq!(second, b"[{\"id\":\"b\"}]");
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_json_lines_passes_invalid_utf8_through() {
        let input: &[u8] = b"[{\"id\":\"a\"}]\n[{\"id\":\"\xff\xfe\"}]\n[{\"id\":\"c\"}]\n";
        let mut queue = JsonLinesQueue::new(input);

        assert_eq!(queue.recv().await.unwrap().unwrap(), b"[{\"id\":\"a\"}]");
        let garbled = queue.recv().await.unwrap().unwrap();
        assert_eq!(garbled, b"[{\"id\":\"\xff\xfe\"}]");
        assert!(decode_batch(&garbled).is_err());
        assert_eq!(queue.recv().await.unwrap().unwrap(), b"[{\"id\":\"c\"}]");
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_json_lines_rejects_oversized_line_and_continues() {
        let input: &[u8] = b"[1,2]\n[1,2,3,4,5,6,7,8,9]\n[3]";
        // A tiny read buffer makes the long line arrive in several chunks.
        let reader = BufReader::with_capacity(4, input);
        let mut queue = JsonLinesQueue::new(reader).with_max_message_bytes(8);

        assert_eq!(queue.recv().await.unwrap().unwrap(), b"[1,2]");
        match queue.recv().await {
            Some(Err(QueueError::Oversized { size, limit })) => {
                assert_eq!(size, 19);
                assert_eq!(limit, 8);
            }
            other => panic!("expected oversized message, got {:?}", other),
        }
        // Last line has no trailing newline.
        assert_eq!(queue.recv().await.unwrap().unwrap(), b"[3]");
        assert!(queue.recv().await.is_none());
    }

    #[test]
    fn test_forward_lines_frames_bytes() {
        let (publisher, mut queue) = channel_queue(8);
        let input = std::io::Cursor::new(b"[\"a\"]\r\n\n\xff\n0123456789abcdef\n[\"b\"]".to_vec());
        forward_lines(input, 8, &publisher);
        drop(publisher);

        let mut received = Vec::new();
        while let Some(message) = queue.rx.blocking_recv() {
            received.push(message);
        }
        assert_eq!(received.len(), 4);
        assert_eq!(received[0].as_ref().unwrap(), b"[\"a\"]\r");
        assert_eq!(received[1].as_ref().unwrap(), b"\xff");
        assert!(matches!(received[2], Err(QueueError::Oversized { size: 16, .. })));
        assert_eq!(received[3].as_ref().unwrap(), b"[\"b\"]");
    }

    #[tokio::test]
    async fn test_json_lines_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[{{\"id\":\"x\",\"summary\":\"s\"}}]").unwrap();
        file.flush().unwrap();

        let mut queue = JsonLinesQueue::open(file.path()).await.unwrap();
        let body = queue.recv().await.unwrap().unwrap();
        let batch = decode_batch(&body).unwrap();
        assert_eq!(batch[0].id, "x");
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = JsonLinesQueue::open(Path::new("/nonexistent/records.jsonl")).await;
        assert!(matches!(result, Err(QueueError::IoError(_))));
    }

    #[tokio::test]
    async fn test_channel_queue_closes_when_publishers_drop() {
        let (publisher, mut queue) = channel_queue(4);
        let batch = vec![CandidateRecord::new("a", "text")];
        publisher.publish_batch(&batch).await.unwrap();
        drop(publisher);

        let body = queue.recv().await.unwrap().unwrap();
        assert_eq!(decode_batch(&body).unwrap(), batch);
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_after_consumer_dropped() {
        let (publisher, queue) = channel_queue(1);
        drop(queue);
        assert!(matches!(
            publisher.publish(b"[]".to_vec()).await,
            Err(QueueError::Disconnected(_))
        ));
    }
}
