//! NETCONF 1.1 chunked framing (RFC 6242 section 4.2).
//!
//! Messages are delimited as `\n#<len>\n<payload>\n##\n`. The reader is a
//! streaming state machine that tolerates arbitrary chunk splits across
//! socket reads; the writer always emits a single chunk per message.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// End-of-message marker.
const MSG_SEPARATOR: &[u8] = b"\n##\n";

/// Fixed receive buffer size. Large enough that a chunk header (at most
/// 13 bytes) can always be inspected without a forced refill.
const BUF_SIZE: usize = 8192;

/// Maximum chunk size allowed by RFC 6242 (2^31 - 1).
const MAX_CHUNK_SIZE: u64 = (1 << 31) - 1;

/// Maximum number of digits in a chunk size field.
const MAX_SIZE_DIGITS: usize = 10;

/// Chunked framing protocol errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The byte stream violated the chunked-framing grammar.
    #[error("bad chunk")]
    BadChunk,

    /// The stream ended in the middle of a frame.
    #[error("unexpected EOF inside frame")]
    UnexpectedEof,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    HeaderStart,
    HeaderSize,
    Data,
    EndOfChunks,
}

/// Streaming reader for chunk-framed NETCONF messages.
pub struct FrameReader<R> {
    inner: R,
    buf: Box<[u8]>,
    /// First unconsumed byte in `buf`.
    start: usize,
    /// One past the last filled byte in `buf`.
    end: usize,
    state: DecodeState,
    chunks_seen: usize,
    data_left: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; BUF_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            state: DecodeState::HeaderStart,
            chunks_seen: 0,
            data_left: 0,
        }
    }

    /// Number of buffered bytes not yet consumed.
    fn available(&self) -> usize {
        self.end - self.start
    }

    /// Ensure at least `need` unconsumed bytes are buffered, compacting the
    /// buffer on carry-over. Returns the number of bytes actually available,
    /// which is smaller than `need` only at EOF.
    async fn fill(&mut self, need: usize) -> Result<usize, FrameError> {
        debug_assert!(need <= BUF_SIZE);

        while self.available() < need {
            if self.end + (need - self.available()) > BUF_SIZE {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }

            let n = self.inner.read(&mut self.buf[self.end..]).await?;
            if n == 0 {
                break;
            }
            self.end += n;
        }

        Ok(self.available())
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.start += n;
    }

    /// Read one complete framed message.
    ///
    /// Returns `Ok(None)` on a clean EOF at a message boundary. EOF anywhere
    /// inside a frame is [`FrameError::UnexpectedEof`].
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut token: Vec<u8> = Vec::new();

        loop {
            match self.state {
                DecodeState::HeaderStart => {
                    let avail = self.fill(3).await?;
                    if avail == 0 {
                        if self.chunks_seen == 0 && token.is_empty() {
                            return Ok(None);
                        }
                        return Err(FrameError::UnexpectedEof);
                    }
                    if avail < 3 {
                        return Err(FrameError::UnexpectedEof);
                    }

                    if self.buf[self.start] != b'\n' || self.buf[self.start + 1] != b'#' {
                        return Err(FrameError::BadChunk);
                    }
                    match self.buf[self.start + 2] {
                        b'#' => {
                            self.consume(3);
                            self.state = DecodeState::EndOfChunks;
                        }
                        b'1'..=b'9' => {
                            self.consume(2);
                            self.state = DecodeState::HeaderSize;
                        }
                        _ => return Err(FrameError::BadChunk),
                    }
                }
                DecodeState::HeaderSize => {
                    // Size field: up to ten digits followed by a newline.
                    let avail = self.fill(MAX_SIZE_DIGITS + 1).await?;
                    let window = &self.buf[self.start..self.start + avail.min(MAX_SIZE_DIGITS + 1)];
                    let nl = match window.iter().position(|&b| b == b'\n') {
                        Some(idx) => idx,
                        None if avail > MAX_SIZE_DIGITS => return Err(FrameError::BadChunk),
                        None => return Err(FrameError::UnexpectedEof),
                    };

                    let digits = &self.buf[self.start..self.start + nl];
                    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                        return Err(FrameError::BadChunk);
                    }
                    let size: u64 = std::str::from_utf8(digits)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .ok_or(FrameError::BadChunk)?;
                    if size > MAX_CHUNK_SIZE {
                        return Err(FrameError::BadChunk);
                    }

                    self.consume(nl + 1);
                    self.data_left = size;
                    self.state = DecodeState::Data;
                }
                DecodeState::Data => {
                    while self.data_left > 0 {
                        let avail = self.fill(1).await?;
                        if avail == 0 {
                            return Err(FrameError::UnexpectedEof);
                        }
                        let take = (avail as u64).min(self.data_left) as usize;
                        token.extend_from_slice(&self.buf[self.start..self.start + take]);
                        self.consume(take);
                        self.data_left -= take as u64;
                    }
                    self.chunks_seen += 1;
                    self.state = DecodeState::HeaderStart;
                }
                DecodeState::EndOfChunks => {
                    let avail = self.fill(1).await?;
                    if avail == 0 {
                        return Err(FrameError::UnexpectedEof);
                    }
                    if self.buf[self.start] != b'\n' || self.chunks_seen == 0 {
                        return Err(FrameError::BadChunk);
                    }
                    self.consume(1);
                    self.state = DecodeState::HeaderStart;
                    self.chunks_seen = 0;
                    return Ok(Some(token));
                }
            }
        }
    }
}

/// Writer for chunk-framed NETCONF messages.
///
/// Outbound writes are serialized behind a mutex so concurrent senders cannot
/// interleave frames on one connection.
pub struct FrameWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Frame and send one message as a single chunk.
    pub async fn send(&self, payload: &[u8]) -> Result<(), FrameError> {
        let message = encode(payload);

        let mut inner = self.inner.lock().await;
        inner.write_all(&message).await?;
        inner.flush().await?;
        Ok(())
    }

    /// Shut down the underlying transport.
    pub async fn close(&self) -> Result<(), FrameError> {
        let mut inner = self.inner.lock().await;
        inner.shutdown().await?;
        Ok(())
    }
}

/// Encode a payload into its single-chunk framed form.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(payload.len() + 24);
    message.extend_from_slice(format!("\n#{}\n", payload.len()).as_bytes());
    message.extend_from_slice(payload);
    message.extend_from_slice(MSG_SEPARATOR);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode_one(input: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        let mut reader = FrameReader::new(input);
        reader.read_message().await
    }

    #[tokio::test]
    async fn test_round_trip_sizes() {
        for size in [0usize, 1, 8191, 8192, 8193, 65536] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let framed = encode(&payload);
            let decoded = decode_one(&framed).await.unwrap().unwrap();
            assert_eq!(decoded, payload, "round trip failed for size {}", size);
        }
    }

    #[tokio::test]
    async fn test_multi_chunk_message() {
        // The same payload split across three chunks must decode identically.
        let payload = b"<rpc message-id=\"1\"><get-config/></rpc>";
        let (a, rest) = payload.split_at(10);
        let (b, c) = rest.split_at(7);

        let mut framed = Vec::new();
        for part in [a, b, c] {
            framed.extend_from_slice(format!("\n#{}\n", part.len()).as_bytes());
            framed.extend_from_slice(part);
        }
        framed.extend_from_slice(MSG_SEPARATOR);

        let decoded = decode_one(&framed).await.unwrap().unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_multiple_messages_on_one_stream() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode(b"first"));
        stream.extend_from_slice(&encode(b"second"));

        let mut reader = FrameReader::new(&stream[..]);
        assert_eq!(reader.read_message().await.unwrap().unwrap(), b"first");
        assert_eq!(reader.read_message().await.unwrap().unwrap(), b"second");
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_size_chunk_rejected() {
        // A chunk size may not start with '0'.
        assert!(matches!(
            decode_one(b"\n#0\n").await,
            Err(FrameError::BadChunk)
        ));
    }

    #[tokio::test]
    async fn test_non_numeric_size_rejected() {
        assert!(matches!(
            decode_one(b"\n#abc\ndata\n##\n").await,
            Err(FrameError::BadChunk)
        ));
    }

    #[tokio::test]
    async fn test_oversized_size_field_rejected() {
        assert!(matches!(
            decode_one(b"\n#1234567890123\ndata\n##\n").await,
            Err(FrameError::BadChunk)
        ));
    }

    #[tokio::test]
    async fn test_truncated_data() {
        assert!(matches!(
            decode_one(b"\n#10\nabc").await,
            Err(FrameError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_missing_terminator() {
        assert!(matches!(
            decode_one(b"\n#3\nabc").await,
            Err(FrameError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_terminator_without_chunks_rejected() {
        // "\n##\n" with no preceding chunk is not a message.
        assert!(matches!(
            decode_one(b"\n##\n").await,
            Err(FrameError::BadChunk)
        ));
    }

    #[tokio::test]
    async fn test_garbage_prefix_rejected() {
        assert!(matches!(
            decode_one(b"xx#3\nabc\n##\n").await,
            Err(FrameError::BadChunk)
        ));
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        assert!(decode_one(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_frames_single_chunk() {
        let mut out = Vec::new();
        {
            let writer = FrameWriter::new(&mut out);
            writer.send(b"hello").await.unwrap();
        }
        assert_eq!(out, b"\n#5\nhello\n##\n");
    }
}
