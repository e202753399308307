use alloc::{boxed::Box, vec::Vec};

use super::{BufferKind, Chunk, ChunkedBuffer, PartVisitor};
use crate::error::{BufferError, RenderError};

#[derive(Debug)]
struct Frame<K: BufferKind> {
    buffer: ChunkedBuffer<K>,
    /// Absolute chunk index in `buffer`.
    chunk: u64,
    offset: usize,
}

enum Step<K: BufferKind> {
    Next,
    Enter(ChunkedBuffer<K>),
    End,
}

enum Front<K: BufferKind> {
    Empty,
    Sub(u64, ChunkedBuffer<K>),
    Data,
}

/// Incremental reader over a [`ChunkedBuffer`].
///
/// A shared (non-consuming) reader walks the chunk list, descending into
/// sub-buffers, and leaves the buffer untouched; content written after the
/// reader caught up is picked up by later reads. A consuming reader removes
/// what it hands out, so the buffer's size shrinks accordingly.
///
/// Reads never split a UTF-8 scalar and deliver at least one scalar whenever
/// any content is left, even if `max` is smaller.
#[derive(Debug)]
pub struct ChunkReader<K: BufferKind> {
    root: ChunkedBuffer<K>,
    consuming: bool,
    frames: Vec<Frame<K>>,
    /// Shared reader over the front sub-buffer, keyed by its absolute chunk
    /// index, while consuming.
    sub: Option<(u64, Box<ChunkReader<K>>)>,
}

impl<K: BufferKind> ChunkReader<K> {
    pub(super) fn new(root: ChunkedBuffer<K>, consuming: bool) -> Self {
        Self {
            root,
            consuming,
            frames: Vec::new(),
            sub: None,
        }
    }

    #[must_use]
    pub fn is_consuming(&self) -> bool {
        self.consuming
    }

    /// Hand the next span of at most `max` units to `f`. Returns the number
    /// of units delivered; zero means no content is left for now.
    pub fn read_with(&mut self, max: usize, f: &mut PartVisitor<'_, K>) -> Result<usize, RenderError> {
        if max == 0 {
            return Ok(0);
        }
        if self.consuming {
            self.read_consuming(max, f)
        } else {
            self.read_shared(max, f)
        }
    }

    /// Append at most `max` units to `dst`.
    pub fn read(&mut self, dst: &mut K::Owned, max: usize) -> Result<usize, RenderError> {
        self.read_with(max, &mut |_, part| {
            K::push(dst, part);
            Ok(())
        })
    }

    /// Append everything that is left to `dst`.
    pub fn read_to_end(&mut self, dst: &mut K::Owned) -> Result<usize, RenderError> {
        let mut total = 0;
        loop {
            match self.read(dst, usize::MAX)? {
                0 => return Ok(total),
                n => total += n,
            }
        }
    }

    /// Advance by `n` units without delivering them.
    pub fn skip(&mut self, n: usize) -> Result<usize, RenderError> {
        let mut skipped = 0;
        while skipped < n {
            match self.read_with(n - skipped, &mut |_, _| Ok(()))? {
                0 => break,
                read => skipped += read,
            }
        }
        Ok(skipped)
    }

    fn read_shared(&mut self, max: usize, f: &mut PartVisitor<'_, K>) -> Result<usize, RenderError> {
        if self.frames.is_empty() {
            let (chunk, offset) = self.root.start_position()?;
            self.frames.push(Frame {
                buffer: self.root.clone(),
                chunk,
                offset,
            });
        }
        loop {
            let depth = self.frames.len();
            let Some(frame) = self.frames.last_mut() else {
                return Ok(0);
            };
            let step = {
                let inner = frame.buffer.inner()?;
                if frame.chunk < inner.removed {
                    return Err(BufferError::Bounds {
                        position: frame.chunk,
                        first_available: inner.removed,
                    }
                    .into());
                }
                let index = usize::try_from(frame.chunk - inner.removed).unwrap_or(usize::MAX);
                match inner.chunks.get(index) {
                    None => Step::End,
                    Some(Chunk::Sub(sub)) => Step::Enter(sub.clone()),
                    Some(chunk) => {
                        let Some((tag, data)) = chunk.data() else {
                            return Ok(0);
                        };
                        let start = if index == 0 {
                            frame.offset.max(inner.head_offset)
                        } else {
                            frame.offset
                        };
                        let rest = K::tail(data, start);
                        if K::len(rest) > 0 {
                            let n = K::fit(rest, max);
                            f(tag, K::head(rest, n))?;
                            frame.offset = start + n;
                            return Ok(n);
                        }
                        let last = index + 1 == inner.chunks.len();
                        if last && inner.open_capacity.is_some() {
                            Step::End
                        } else {
                            Step::Next
                        }
                    }
                }
            };
            match step {
                Step::Next => {
                    frame.chunk += 1;
                    frame.offset = 0;
                }
                Step::Enter(sub) => {
                    let (chunk, offset) = sub.start_position()?;
                    self.frames.push(Frame {
                        buffer: sub,
                        chunk,
                        offset,
                    });
                }
                Step::End if depth > 1 => {
                    self.frames.pop();
                    if let Some(parent) = self.frames.last_mut() {
                        parent.chunk += 1;
                        parent.offset = 0;
                    }
                }
                Step::End => return Ok(0),
            }
        }
    }

    fn read_consuming(&mut self, max: usize, f: &mut PartVisitor<'_, K>) -> Result<usize, RenderError> {
        loop {
            let front = {
                let inner = self.root.inner()?;
                match inner.chunks.front() {
                    None => Front::Empty,
                    Some(Chunk::Sub(sub)) => Front::Sub(inner.removed, sub.clone()),
                    Some(_) => Front::Data,
                }
            };
            match front {
                Front::Empty => return Ok(0),
                Front::Sub(position, sub) => {
                    if self.sub.as_ref().is_none_or(|(at, _)| *at != position) {
                        let mut reader = Box::new(sub.reader(false));
                        reader.skip(self.root.inner()?.head_offset)?;
                        self.sub = Some((position, reader));
                    }
                    let n = match self.sub.as_mut() {
                        Some((_, reader)) => reader.read_with(max, f)?,
                        None => 0,
                    };
                    let mut inner = self.root.inner_mut()?;
                    if n > 0 {
                        inner.head_offset += n;
                        return Ok(n);
                    }
                    self.sub = None;
                    inner.pop_front();
                }
                Front::Data => {
                    let n = {
                        let inner = self.root.inner()?;
                        match inner.chunks.front().and_then(Chunk::data) {
                            Some((tag, data)) => {
                                let rest = K::tail(data, inner.head_offset);
                                if K::len(rest) == 0 {
                                    0
                                } else {
                                    let n = K::fit(rest, max);
                                    f(tag, K::head(rest, n))?;
                                    n
                                }
                            }
                            None => 0,
                        }
                    };
                    let mut inner = self.root.inner_mut()?;
                    if n == 0 {
                        inner.pop_front();
                        continue;
                    }
                    inner.head_offset += n;
                    inner.static_size -= n;
                    let drained = inner
                        .chunks
                        .front()
                        .and_then(Chunk::data)
                        .is_some_and(|(_, data)| K::len(data) <= inner.head_offset);
                    if drained {
                        inner.pop_front();
                    }
                    return Ok(n);
                }
            }
        }
    }
}
