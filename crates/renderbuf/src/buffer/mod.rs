//! Chunked output buffers.
//!
//! A [`ChunkedBuffer`] is a cheap-to-clone handle to a list of chunks. Every
//! chunk is either a write chunk that is still being filled, a frozen span
//! that was handed over without copying, or a reference to another buffer
//! (a *sub-buffer*) whose live content is read in place.
//!
//! Buffers start out *buffered*. After [`connect_to`](ChunkedBuffer::connect_to)
//! full chunks are forwarded to the connected sink instead of piling up, and
//! large writes skip the chunk list altogether.

mod bytes;
mod kind;
mod reader;
mod text;

use alloc::{borrow::Cow, boxed::Box, collections::VecDeque, rc::Rc};
use core::{
    cell::{Ref, RefCell, RefMut},
    fmt,
};

pub use bytes::IoSink;
pub use kind::{BufferKind, Bytes, Text};
pub use reader::ChunkReader;
pub use text::EncodedPart;

use log::{debug, trace, warn};

use crate::{
    appender::AppenderId,
    error::{BufferError, RenderError},
    options::BufferOptions,
};

pub type ChunkedTextBuffer = ChunkedBuffer<Text>;
pub type ChunkedByteBuffer = ChunkedBuffer<Bytes>;

/// Callback receiving each stored span with its tag.
pub type PartVisitor<'a, K> = dyn FnMut(&<K as BufferKind>::Tag, &<K as BufferKind>::Slice) -> Result<(), RenderError>
    + 'a;

/// Destination for the spans of a buffer: a connected sink, or the target of
/// [`ChunkedBuffer::write_to`].
pub trait ChunkSink<K: BufferKind> {
    fn write_chunk(&mut self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError>;

    fn flush_chunks(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

impl<K: BufferKind, S: ChunkSink<K> + ?Sized> ChunkSink<K> for &mut S {
    fn write_chunk(&mut self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError> {
        (**self).write_chunk(tag, part)
    }

    fn flush_chunks(&mut self) -> Result<(), RenderError> {
        (**self).flush_chunks()
    }
}

impl<K: BufferKind, S: ChunkSink<K>> ChunkSink<K> for Rc<RefCell<S>> {
    fn write_chunk(&mut self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError> {
        self.try_borrow_mut()
            .map_err(|_| BufferError::Reentrant)?
            .write_chunk(tag, part)
    }

    fn flush_chunks(&mut self) -> Result<(), RenderError> {
        self.try_borrow_mut()
            .map_err(|_| BufferError::Reentrant)?
            .flush_chunks()
    }
}

impl<K: BufferKind> ChunkSink<K> for ChunkedBuffer<K> {
    fn write_chunk(&mut self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError> {
        self.write_tagged(tag, part)
    }

    fn flush_chunks(&mut self) -> Result<(), RenderError> {
        ChunkedBuffer::flush(self)
    }
}

#[derive(Debug)]
enum Chunk<K: BufferKind> {
    Owned { data: K::Owned, tag: K::Tag },
    Frozen { data: Cow<'static, K::Slice>, tag: K::Tag },
    Sub(ChunkedBuffer<K>),
}

impl<K: BufferKind> Chunk<K> {
    fn data(&self) -> Option<(&K::Tag, &K::Slice)> {
        match self {
            Chunk::Owned { data, tag } => Some((tag, K::as_slice(data))),
            Chunk::Frozen { data, tag } => Some((tag, &**data)),
            Chunk::Sub(_) => None,
        }
    }

    /// Hand the content after `local` units to `f`, first skipping another
    /// `skip` units. Returns how much of `skip` is left over.
    fn visit(
        &self,
        local: usize,
        skip: usize,
        f: &mut PartVisitor<'_, K>,
    ) -> Result<usize, RenderError> {
        let Some((tag, data)) = self.data() else {
            return match self {
                Chunk::Sub(sub) => sub.visit_parts(local + skip, f),
                _ => Ok(skip),
            };
        };
        let data = K::tail(data, local);
        let len = K::len(data);
        if skip >= len {
            return Ok(skip - len);
        }
        f(tag, K::tail(data, skip))?;
        Ok(0)
    }
}

struct Inner<K: BufferKind> {
    options: BufferOptions,
    chunks: VecDeque<Chunk<K>>,
    /// Capacity of the back chunk while it is still being written to.
    open_capacity: Option<usize>,
    /// Units already consumed from the front chunk.
    head_offset: usize,
    /// Number of chunks dropped from the front; absolute index of `chunks[0]`.
    removed: u64,
    /// Units held in owned and frozen chunks, net of `head_offset`.
    static_size: usize,
    current_chunk_size: usize,
    total_allocated: usize,
    spare: Option<K::Owned>,
    connected: Option<Box<dyn ChunkSink<K>>>,
    closed: bool,
}

impl<K: BufferKind> Inner<K> {
    fn new(options: BufferOptions) -> Self {
        Self {
            options,
            chunks: VecDeque::new(),
            open_capacity: None,
            head_offset: 0,
            removed: 0,
            static_size: 0,
            current_chunk_size: 0,
            total_allocated: 0,
            spare: None,
            connected: None,
            closed: false,
        }
    }

    fn ensure_writable(&self) -> Result<(), BufferError> {
        if self.closed {
            Err(BufferError::Closed)
        } else {
            Ok(())
        }
    }

    /// `(used, capacity)` of the open write chunk.
    fn open_usage(&self) -> Option<(usize, usize)> {
        let capacity = self.open_capacity?;
        match self.chunks.back() {
            Some(Chunk::Owned { data, .. }) => Some((K::len(K::as_slice(data)), capacity)),
            _ => None,
        }
    }

    fn open_chunk(&mut self) -> Option<(&mut K::Owned, &mut K::Tag)> {
        self.open_capacity?;
        match self.chunks.back_mut() {
            Some(Chunk::Owned { data, tag }) => Some((data, tag)),
            _ => None,
        }
    }

    /// Units the open chunk can still take for a span tagged `tag`.
    fn room_for(&self, tag: &K::Tag) -> Option<usize> {
        let (used, capacity) = self.open_usage()?;
        if used == 0 {
            return Some(capacity);
        }
        match self.chunks.back() {
            Some(Chunk::Owned { tag: current, .. }) if current == tag => {
                Some(capacity.saturating_sub(used))
            }
            _ => None,
        }
    }

    /// Space left in a partially filled open chunk that is still below
    /// `chunk_min_size`; zero otherwise.
    fn new_chunk_min_size(&self) -> usize {
        let Some((used, capacity)) = self.open_usage() else {
            return 0;
        };
        let space = capacity.saturating_sub(used);
        if self.options.chunk_min_size == 0 || used >= self.options.chunk_min_size || space == 0 {
            0
        } else {
            space
        }
    }

    fn should_write_directly(&self, len: usize) -> bool {
        self.connected.is_some()
            && self
                .options
                .write_direct_min_size
                .is_some_and(|min| len >= min)
            && len > self.new_chunk_min_size()
    }

    fn retained_size(&self) -> Result<usize, BufferError> {
        let mut subs = 0;
        for chunk in &self.chunks {
            if let Chunk::Sub(sub) = chunk {
                subs += sub.try_size()?;
            }
        }
        let consumed_from_sub = match self.chunks.front() {
            Some(Chunk::Sub(_)) => self.head_offset,
            _ => 0,
        };
        Ok((self.static_size + subs).saturating_sub(consumed_from_sub))
    }

    fn check_limit(&self, extra: usize) -> Result<(), BufferError> {
        match self.options.size_limit {
            Some(limit) if self.connected.is_none() && self.retained_size()? + extra > limit => {
                Err(BufferError::CapacityExceeded { limit })
            }
            _ => Ok(()),
        }
    }

    fn allocate_chunk(&mut self, tag: &K::Tag, grow: bool) {
        let size = if self.total_allocated == 0 {
            self.options.first_chunk_size()
        } else if grow {
            self.options
                .next_chunk_size(self.current_chunk_size, self.total_allocated)
        } else {
            self.current_chunk_size.max(1)
        };
        self.current_chunk_size = size;
        let data = match self.spare.take() {
            Some(mut data) if K::capacity(&data) >= size => {
                K::clear(&mut data);
                data
            }
            _ => {
                trace!("allocating chunk of {size} units");
                self.total_allocated = self.total_allocated.saturating_add(size);
                K::with_capacity(size)
            }
        };
        self.chunks.push_back(Chunk::Owned {
            data,
            tag: tag.clone(),
        });
        self.open_capacity = Some(size);
    }

    /// Stop writing into the current write chunk. An empty one is dropped
    /// and its allocation kept for reuse.
    fn seal(&mut self) {
        if self.open_capacity.take().is_none() {
            return;
        }
        let empty = matches!(
            self.chunks.back(),
            Some(Chunk::Owned { data, .. }) if K::len(K::as_slice(data)) == 0
        );
        if empty {
            if let Some(Chunk::Owned { data, .. }) = self.chunks.pop_back() {
                self.spare = Some(data);
            }
        }
    }

    fn next_chunk(&mut self, tag: &K::Tag) -> Result<(), RenderError> {
        if self.connected.is_some() && !self.chunks.is_empty() {
            self.flush_connected()?;
            self.allocate_chunk(tag, false);
        } else {
            self.seal();
            self.allocate_chunk(tag, true);
        }
        Ok(())
    }

    fn push_part(&mut self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError> {
        let mut rest = part;
        while K::len(rest) > 0 {
            let Some(room) = self.room_for(tag) else {
                self.next_chunk(tag)?;
                continue;
            };
            let Some((data, chunk_tag)) = self.open_chunk() else {
                self.next_chunk(tag)?;
                continue;
            };
            let used = K::len(K::as_slice(data));
            let n = if used == 0 {
                K::fit(rest, room)
            } else {
                K::fit_within(rest, room)
            };
            if n == 0 {
                self.next_chunk(tag)?;
                continue;
            }
            if used == 0 && chunk_tag != tag {
                *chunk_tag = tag.clone();
            }
            K::push(data, K::head(rest, n));
            self.static_size += n;
            rest = K::tail(rest, n);
        }
        Ok(())
    }

    fn write_connected(&mut self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError> {
        match self.connected.as_mut() {
            Some(sink) => sink.write_chunk(tag, part),
            None => Ok(()),
        }
    }

    /// Forward everything held so far to the connected sink.
    fn flush_connected(&mut self) -> Result<(), RenderError> {
        if self.chunks.is_empty() {
            return Ok(());
        }
        let Inner {
            chunks,
            connected,
            head_offset,
            ..
        } = self;
        let Some(sink) = connected.as_mut() else {
            return Ok(());
        };
        debug!("flushing {} chunks to connected sink", chunks.len());
        let mut emit = |tag: &K::Tag, part: &K::Slice| sink.write_chunk(tag, part);
        for (i, chunk) in chunks.iter().enumerate() {
            let local = if i == 0 { *head_offset } else { 0 };
            chunk.visit(local, 0, &mut emit)?;
        }
        self.clear_chunks();
        Ok(())
    }

    fn clear_chunks(&mut self) {
        let dropped = self.chunks.len() as u64;
        if self.open_capacity.take().is_some() {
            if let Some(Chunk::Owned { data, .. }) = self.chunks.pop_back() {
                self.spare = Some(data);
            }
        }
        self.chunks.clear();
        self.removed += dropped;
        self.head_offset = 0;
        self.static_size = 0;
    }

    fn pop_front(&mut self) {
        let Some(chunk) = self.chunks.pop_front() else {
            return;
        };
        self.removed += 1;
        if let Some((_, data)) = chunk.data() {
            self.static_size = self
                .static_size
                .saturating_sub(K::len(data).saturating_sub(self.head_offset));
        }
        self.head_offset = 0;
        if self.chunks.is_empty() && self.open_capacity.take().is_some() {
            if let Chunk::Owned { data, .. } = chunk {
                self.spare = Some(data);
            }
        }
    }
}

struct Shared<K: BufferKind> {
    id: AppenderId,
    inner: RefCell<Inner<K>>,
}

/// Growable buffer made of chunks. Cloning yields another handle to the same
/// buffer.
pub struct ChunkedBuffer<K: BufferKind> {
    shared: Rc<Shared<K>>,
}

impl<K: BufferKind> Clone for ChunkedBuffer<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<K: BufferKind> Default for ChunkedBuffer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: BufferKind> fmt::Debug for ChunkedBuffer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ChunkedBuffer");
        s.field("id", &self.shared.id);
        if let Ok(inner) = self.shared.inner.try_borrow() {
            s.field("chunks", &inner.chunks.len())
                .field("connected", &inner.connected.is_some())
                .field("closed", &inner.closed);
        }
        s.finish_non_exhaustive()
    }
}

impl<K: BufferKind> ChunkedBuffer<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(BufferOptions::default())
    }

    #[must_use]
    pub fn with_options(options: BufferOptions) -> Self {
        Self {
            shared: Rc::new(Shared {
                id: AppenderId::next(),
                inner: RefCell::new(Inner::new(options)),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> AppenderId {
        self.shared.id
    }

    pub fn options(&self) -> Result<BufferOptions, BufferError> {
        Ok(self.inner()?.options)
    }

    /// Whether both handles refer to the same buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether `other` is embedded in this buffer, at any depth.
    pub fn contains(&self, other: &Self) -> Result<bool, BufferError> {
        let inner = self.inner()?;
        for chunk in &inner.chunks {
            if let Chunk::Sub(sub) = chunk {
                if sub.ptr_eq(other) || sub.contains(other)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn prefers_sub_chunk(&self) -> Result<bool, BufferError> {
        Ok(self.inner()?.options.prefer_sub_chunk)
    }

    /// Ask buffers this one is appended to to keep it as a sub-buffer.
    pub fn set_prefer_sub_chunk(&self, prefer: bool) -> Result<(), BufferError> {
        self.inner_mut()?.options.prefer_sub_chunk = prefer;
        Ok(())
    }

    fn inner(&self) -> Result<Ref<'_, Inner<K>>, BufferError> {
        self.shared
            .inner
            .try_borrow()
            .map_err(|_| BufferError::Reentrant)
    }

    fn inner_mut(&self) -> Result<RefMut<'_, Inner<K>>, BufferError> {
        self.shared
            .inner
            .try_borrow_mut()
            .map_err(|_| BufferError::Reentrant)
    }

    pub fn write(&self, part: &K::Slice) -> Result<(), RenderError> {
        self.write_tagged(&K::Tag::default(), part)
    }

    /// Write `part`, recording `tag` with it. Zero-length writes do nothing.
    pub fn write_tagged(&self, tag: &K::Tag, part: &K::Slice) -> Result<(), RenderError> {
        let len = K::len(part);
        if len == 0 {
            return Ok(());
        }
        let mut inner = self.inner_mut()?;
        inner.ensure_writable()?;
        if inner.should_write_directly(len) {
            inner.flush_connected()?;
            return inner.write_connected(tag, part);
        }
        inner.check_limit(len)?;
        inner.push_part(tag, part)
    }

    /// Write `len` units of `source` starting at `offset`.
    pub fn write_range(
        &self,
        source: &K::Slice,
        offset: usize,
        len: usize,
    ) -> Result<(), RenderError> {
        let part = offset
            .checked_add(len)
            .and_then(|end| K::get(source, offset..end))
            .ok_or(BufferError::Range {
                offset,
                len,
                available: K::len(source),
            })?;
        self.write(part)
    }

    /// Take ownership of `data`; large values become a frozen chunk instead
    /// of being copied.
    pub fn write_owned(&self, data: K::Owned) -> Result<(), RenderError> {
        self.write_frozen(&K::Tag::default(), Cow::Owned(data))
    }

    pub fn write_static(&self, data: &'static K::Slice) -> Result<(), RenderError> {
        self.write_frozen(&K::Tag::default(), Cow::Borrowed(data))
    }

    pub(crate) fn write_frozen(
        &self,
        tag: &K::Tag,
        data: Cow<'static, K::Slice>,
    ) -> Result<(), RenderError> {
        let len = K::len(&data);
        if len == 0 {
            return Ok(());
        }
        let mut inner = self.inner_mut()?;
        inner.ensure_writable()?;
        if inner.should_write_directly(len) {
            inner.flush_connected()?;
            return inner.write_connected(tag, &data);
        }
        inner.check_limit(len)?;
        if len >= inner.options.sub_string_chunk_min_size && len > inner.new_chunk_min_size() {
            inner.seal();
            inner.chunks.push_back(Chunk::Frozen {
                data,
                tag: tag.clone(),
            });
            inner.static_size += len;
            Ok(())
        } else {
            inner.push_part(tag, &data)
        }
    }

    /// Add the content of `other` to the end of this buffer.
    ///
    /// `other` is kept as a live sub-buffer reference when sub-buffers are
    /// allowed and it either prefers that or is larger than
    /// `sub_buffer_chunk_min_size`; otherwise its current content is copied.
    /// In connected mode content at or above the direct-write threshold goes
    /// straight to the sink.
    pub fn append_buffer(&self, other: &ChunkedBuffer<K>) -> Result<(), RenderError> {
        if self.ptr_eq(other) || other.contains(self)? {
            return Err(BufferError::CyclicEmbed.into());
        }
        let other_prefers_sub = other.prefers_sub_chunk()?;
        let other_size = other.try_size()?;
        let mut inner = self.inner_mut()?;
        inner.ensure_writable()?;

        if let Some(direct_min) = inner.options.write_direct_min_size {
            if inner.connected.is_some() && (direct_min == 0 || other_size > direct_min) {
                inner.flush_connected()?;
                let Inner { connected, .. } = &mut *inner;
                if let Some(sink) = connected.as_mut() {
                    other.for_each_part(&mut |tag, part| sink.write_chunk(tag, part))?;
                }
                return Ok(());
            }
        }

        let threshold = inner
            .options
            .sub_buffer_chunk_min_size
            .max(inner.new_chunk_min_size());
        let embed = inner.options.allow_sub_buffers
            && (other_prefers_sub || other_size > threshold);
        inner.check_limit(other_size)?;
        if embed {
            debug!("embedding buffer {:?} as a sub-buffer", other.id());
            inner.seal();
            inner.chunks.push_back(Chunk::Sub(other.clone()));
            if other_prefers_sub {
                inner.options.prefer_sub_chunk = true;
            }
            Ok(())
        } else {
            other.for_each_part(&mut |tag, part| inner.push_part(tag, part))
        }
    }

    /// Switch to connected mode: from now on full chunks and large writes
    /// are forwarded to `sink`.
    pub fn connect_to(&self, sink: impl ChunkSink<K> + 'static) -> Result<(), BufferError> {
        let mut inner = self.inner_mut()?;
        inner.ensure_writable()?;
        inner.connected = Some(Box::new(sink));
        Ok(())
    }

    pub fn is_connected(&self) -> Result<bool, BufferError> {
        Ok(self.inner()?.connected.is_some())
    }

    /// In connected mode, forward buffered content to the sink and flush it.
    pub fn flush(&self) -> Result<(), RenderError> {
        let mut inner = self.inner_mut()?;
        if inner.connected.is_none() {
            return Ok(());
        }
        inner.flush_connected()?;
        match inner.connected.as_mut() {
            Some(sink) => sink.flush_chunks(),
            None => Ok(()),
        }
    }

    /// Flush a connected buffer one last time and reject further writes.
    /// Closing twice does nothing.
    pub fn close(&self) -> Result<(), RenderError> {
        if self.is_closed()? {
            return Ok(());
        }
        self.flush()?;
        self.inner_mut()?.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> Result<bool, BufferError> {
        Ok(self.inner()?.closed)
    }

    /// Drop all retained content. Readers positioned in it become stale.
    pub fn clear(&self) -> Result<(), BufferError> {
        self.inner_mut()?.clear_chunks();
        Ok(())
    }

    /// A reader over the retained content. A consuming reader removes what it
    /// reads from the buffer.
    #[must_use]
    pub fn reader(&self, consuming: bool) -> ChunkReader<K> {
        ChunkReader::new(self.clone(), consuming)
    }

    pub(crate) fn start_position(&self) -> Result<(u64, usize), BufferError> {
        let inner = self.inner()?;
        Ok((inner.removed, inner.head_offset))
    }

    fn visit_parts(&self, skip: usize, f: &mut PartVisitor<'_, K>) -> Result<usize, RenderError> {
        let inner = self.inner()?;
        let mut skip = skip;
        for (i, chunk) in inner.chunks.iter().enumerate() {
            let local = if i == 0 { inner.head_offset } else { 0 };
            skip = chunk.visit(local, skip, f)?;
        }
        Ok(skip)
    }

    /// Visit every retained span in order, descending into sub-buffers,
    /// without consuming anything.
    pub fn for_each_part(&self, f: &mut PartVisitor<'_, K>) -> Result<(), RenderError> {
        self.visit_parts(0, f).map(|_| ())
    }

    /// Copy the retained content into `sink`, keeping it in this buffer.
    pub fn write_to(&self, sink: &mut dyn ChunkSink<K>) -> Result<(), RenderError> {
        self.for_each_part(&mut |tag, part| sink.write_chunk(tag, part))
    }

    /// Move the retained content into `sink`.
    pub fn drain_to(&self, sink: &mut dyn ChunkSink<K>) -> Result<(), RenderError> {
        self.write_to(sink)?;
        self.clear()?;
        Ok(())
    }

    /// Retained content in units, including the live size of sub-buffers.
    ///
    /// Fails with [`BufferError::Reentrant`] while this buffer, or one it
    /// embeds, is in the middle of a write.
    pub fn try_size(&self) -> Result<usize, BufferError> {
        self.inner()?.retained_size()
    }

    /// [`try_size`](Self::try_size), reporting `0` for a buffer that is in
    /// the middle of a write.
    #[must_use]
    pub fn size(&self) -> usize {
        self.try_size().unwrap_or_else(|err| {
            warn!("size of buffer {:?} unavailable: {err}", self.id());
            0
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.is_size_larger(0)
    }

    #[must_use]
    pub fn is_size_larger(&self, n: usize) -> bool {
        self.size() > n
    }

    pub fn chunk_count(&self) -> Result<usize, BufferError> {
        Ok(self.inner()?.chunks.len())
    }
}
