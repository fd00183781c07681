//! Reusable byte buffers for image and archive streams.
//!
//! Every item the pipeline touches needs at least one growable buffer: the
//! copy of an extracted image, the scratch space an archive entry is read
//! into, the archive itself. Allocating those per item means the allocator
//! churns through multi-megabyte `Vec`s on every request, so buffers are
//! borrowed from a [`BufferPool`] instead.
//!
//! A borrowed buffer is a [`PooledBuffer`] guard. It goes back to the pool
//! when dropped, which covers every exit path of the borrowing scope: normal
//! return, `?` early exit, panic unwinding and task abortion. Buffers are
//! cleared on acquire, so no bytes leak from one item into the next.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Default number of idle buffers kept for reuse.
pub const DEFAULT_MAX_IDLE_BUFFERS: usize = 16;

/// Default cap on the capacity of a buffer returned to the pool (16 MiB).
pub const DEFAULT_MAX_RETAINED_BYTES: usize = 16 * 1024 * 1024;

/// A shared pool of growable byte buffers.
///
/// Cloning is cheap and every clone refers to the same pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    max_retained_bytes: usize,
    outstanding: AtomicUsize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_BUFFERS, DEFAULT_MAX_RETAINED_BYTES)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.idle())
            .field("outstanding", &self.outstanding())
            .field("max_idle", &self.inner.max_idle)
            .field("max_retained_bytes", &self.inner.max_retained_bytes)
            .finish()
    }
}

impl BufferPool {
    /// Create a pool that keeps at most `max_idle` buffers, each retaining
    /// at most `max_retained_bytes` of capacity. Larger buffers are freed on
    /// release instead of being kept around.
    pub fn new(max_idle: usize, max_retained_bytes: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
                max_retained_bytes,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Borrow an empty buffer, reusing an idle one when available.
    pub fn acquire(&self) -> PooledBuffer {
        let mut buf = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        buf.clear();
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        PooledBuffer {
            cursor: Cursor::new(buf),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of buffers currently sitting idle in the pool.
    pub fn idle(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of buffers currently borrowed and not yet released.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }
}

impl PoolInner {
    fn release(&self, mut buf: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);

        if buf.capacity() > self.max_retained_bytes {
            trace!("Dropping oversized buffer ({} bytes)", buf.capacity());
            return;
        }

        buf.clear();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// A buffer borrowed from a [`BufferPool`].
///
/// Behaves like an in-memory seekable stream (`Read + Write + Seek`). The
/// underlying allocation returns to the pool when the guard is dropped.
pub struct PooledBuffer {
    cursor: Cursor<Vec<u8>>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Current read/write position.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// The full contents, independent of the current position.
    pub fn as_slice(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    /// Copy the contents into a fresh `Vec`, leaving this buffer (and its
    /// allocation) to go back to the pool.
    pub fn to_vec(&self) -> Vec<u8> {
        self.cursor.get_ref().clone()
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Read for PooledBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for PooledBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for PooledBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("position", &self.position())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(self.cursor.get_mut());
        self.pool.release(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_empty_buffer() {
        let pool = BufferPool::default();
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(buf.position(), 0);
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn drop_returns_buffer_to_pool() {
        let pool = BufferPool::default();
        {
            let mut buf = pool.acquire();
            buf.write_all(b"hello").unwrap();
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn reused_buffer_is_reset() {
        let pool = BufferPool::default();
        {
            let mut buf = pool.acquire();
            buf.write_all(b"first item bytes").unwrap();
        }
        let mut buf = pool.acquire();
        assert!(buf.is_empty(), "stale bytes leaked into the next borrower");
        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        // The allocation itself was reused.
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn oversized_buffers_are_not_retained() {
        let pool = BufferPool::new(4, 8);
        {
            let mut buf = pool.acquire();
            buf.write_all(&[0u8; 64]).unwrap();
        }
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool = BufferPool::new(2, 1024);
        let bufs: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.outstanding(), 5);
        drop(bufs);
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn seek_and_read_back() {
        let pool = BufferPool::default();
        let mut buf = pool.acquire();
        buf.write_all(b"abcdef").unwrap();
        assert_eq!(buf.position(), 6);
        buf.seek(SeekFrom::Start(2)).unwrap();
        let mut out = String::new();
        buf.read_to_string(&mut out).unwrap();
        assert_eq!(out, "cdef");
        assert_eq!(buf.as_slice(), b"abcdef");
    }

    #[test]
    fn release_happens_on_panic() {
        let pool = BufferPool::default();
        let cloned = pool.clone();
        let result = std::panic::catch_unwind(move || {
            let _buf = cloned.acquire();
            panic!("item processing blew up");
        });
        assert!(result.is_err());
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle(), 1);
    }
}
