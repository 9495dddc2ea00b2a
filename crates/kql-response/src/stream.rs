//! Adapts a lazily produced sequence of body chunks into a `Read + Seek + BufRead` source.
//!
//! HTTP clients typically hand out a response body as an iterator of byte chunks. An incremental
//! JSON parser wants a file-like reader instead. [`ChunkedReader`] pulls chunks on demand and keeps
//! every delivered byte in one growable buffer, so:
//! - reads only pull as many chunks as needed to satisfy the requested size;
//! - backward seeks are always satisfiable (nothing is ever evicted);
//! - running out of chunks is a short read, never an error.
//!
//! A reader is scoped to one decode operation and is not meant to be shared between callers.

use std::io::{self, BufRead, Read, Seek, SeekFrom};

pub struct ChunkedReader<I> {
    buf: Vec<u8>,
    pos: u64,
    /// `None` once the source has signalled end of stream.
    chunks: Option<I>,
}

impl<I> std::fmt::Debug for ChunkedReader<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedReader")
            .field("buffered", &self.buf.len())
            .field("pos", &self.pos)
            .field("exhausted", &self.chunks.is_none())
            .finish()
    }
}

fn ok_chunk<C>(chunk: C) -> io::Result<C> {
    Ok(chunk)
}

/// Build a [`ChunkedReader`] over a chunk source that cannot fail.
pub fn from_infallible_chunks<T, C>(
    chunks: T,
) -> ChunkedReader<std::iter::Map<T::IntoIter, fn(C) -> io::Result<C>>>
where
    T: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    ChunkedReader::new(
        chunks
            .into_iter()
            .map(ok_chunk::<C> as fn(C) -> io::Result<C>),
    )
}

impl<I, C> ChunkedReader<I>
where
    I: Iterator<Item = io::Result<C>>,
    C: AsRef<[u8]>,
{
    pub fn new<T>(chunks: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            buf: Vec::new(),
            pos: 0,
            chunks: Some(chunks.into_iter()),
        }
    }

    /// Current read position (the equivalent of `tell()`).
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Number of bytes received from the source so far.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.chunks.is_none()
    }

    /// Pull one chunk into the buffer. Returns `false` once the source is exhausted.
    fn pull(&mut self) -> io::Result<bool> {
        let Some(chunks) = self.chunks.as_mut() else {
            return Ok(false);
        };
        match chunks.next() {
            Some(chunk) => {
                self.buf.extend_from_slice(chunk?.as_ref());
                Ok(true)
            }
            None => {
                log::debug!("chunk source exhausted after {} bytes", self.buf.len());
                self.chunks = None;
                Ok(false)
            }
        }
    }

    fn fill_to(&mut self, goal: u64) -> io::Result<()> {
        while (self.buf.len() as u64) < goal {
            if !self.pull()? {
                break;
            }
        }
        Ok(())
    }

    fn fill_all(&mut self) -> io::Result<()> {
        while self.pull()? {}
        Ok(())
    }

    /// Read up to `size` bytes from the current position, or everything that remains when `size`
    /// is `None`.
    ///
    /// With `None` the source is drained completely. With `Some(n)` chunks are pulled only until
    /// `position + n` bytes are buffered. Fewer bytes are returned only when the source ran out.
    pub fn read_chunk(&mut self, size: Option<usize>) -> io::Result<&[u8]> {
        let start = self.pos;
        match size {
            None => self.fill_all()?,
            Some(n) => self.fill_to(start.saturating_add(n as u64))?,
        }

        let len = self.buf.len() as u64;
        let begin = start.min(len);
        let end = match size {
            None => len,
            Some(n) => start.saturating_add(n as u64).min(len),
        }
        .max(begin);

        self.pos = start + (end - begin);
        Ok(&self.buf[begin as usize..end as usize])
    }

    /// Drain the source and return everything it ever delivered, independent of the position.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        self.fill_all()?;
        Ok(self.buf)
    }
}

impl<I, C> Read for ChunkedReader<I>
where
    I: Iterator<Item = io::Result<C>>,
    C: AsRef<[u8]>,
{
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let chunk = self.read_chunk(Some(out.len()))?;
        let n = chunk.len();
        out[..n].copy_from_slice(chunk);
        Ok(n)
    }
}

impl<I, C> BufRead for ChunkedReader<I>
where
    I: Iterator<Item = io::Result<C>>,
    C: AsRef<[u8]>,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.buf.len() as u64 {
            if !self.pull()? {
                return Ok(&[]);
            }
        }
        Ok(&self.buf[self.pos as usize..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = self.pos.saturating_add(amt as u64);
    }
}

impl<I, C> Seek for ChunkedReader<I>
where
    I: Iterator<Item = io::Result<C>>,
    C: AsRef<[u8]>,
{
    /// `SeekFrom::End` materializes the whole body first; the other variants only move the
    /// cursor and never pull chunks.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(p) => {
                self.pos = p;
                return Ok(p);
            }
            SeekFrom::End(offset) => {
                self.fill_all()?;
                (self.buf.len() as u64, offset)
            }
            SeekFrom::Current(offset) => (self.pos, offset),
        };

        let target = base.checked_add_signed(offset).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.pos = target;
        Ok(target)
    }
}
