#![allow(clippy::struct_excessive_bools)]

use alloc::string::{String, ToString};

/// Sizing and composition policy for a chunked buffer.
///
/// All sizes are in the buffer's storage unit: UTF-8 bytes for text buffers,
/// bytes for byte buffers.
///
/// # Examples
///
/// ```rust
/// use renderbuf::{BufferOptions, ChunkedTextBuffer};
///
/// let buffer = ChunkedTextBuffer::with_options(BufferOptions {
///     chunk_size: 64,
///     grow_percent: 0,
///     ..Default::default()
/// });
/// buffer.write("hello").unwrap();
/// assert_eq!(buffer.to_aggregated_string(), "hello");
/// ```
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    /// Capacity of the first allocated chunk, and the lower bound for every
    /// later one.
    ///
    /// # Default
    ///
    /// `512`
    pub chunk_size: usize,

    /// Growth of newly allocated chunks as a percentage of everything
    /// allocated so far. `0` keeps every chunk at `chunk_size`.
    ///
    /// # Default
    ///
    /// `100`
    pub grow_percent: usize,

    /// Upper bound for the capacity of a single chunk.
    ///
    /// # Default
    ///
    /// `1_048_576`
    pub max_chunk_size: usize,

    /// A partially filled chunk smaller than this is topped up before a
    /// write is allowed to bypass it (frozen chunk or direct write).
    ///
    /// # Default
    ///
    /// `256`
    pub chunk_min_size: usize,

    /// An embedded buffer at least this large is kept as a sub-buffer
    /// reference instead of being copied.
    ///
    /// # Default
    ///
    /// `512`
    pub sub_buffer_chunk_min_size: usize,

    /// An owned or static value at least this large is stored as a frozen
    /// chunk instead of being copied into the current chunk.
    ///
    /// # Default
    ///
    /// `512`
    pub sub_string_chunk_min_size: usize,

    /// In connected mode, writes at least this large skip the chunk list and
    /// go straight to the connected sink. `None` disables the direct path.
    ///
    /// # Default
    ///
    /// `Some(1024)`
    pub write_direct_min_size: Option<usize>,

    /// When this buffer is appended to another buffer, keep it as a
    /// sub-buffer reference regardless of its size.
    ///
    /// # Default
    ///
    /// `false`
    pub prefer_sub_chunk: bool,

    /// Whether this buffer accepts sub-buffer references at all.
    ///
    /// # Default
    ///
    /// `true`
    pub allow_sub_buffers: bool,

    /// Hard limit on retained content. Exceeding it fails the write with
    /// `BufferError::CapacityExceeded`. Content forwarded to a connected
    /// sink does not count.
    ///
    /// # Default
    ///
    /// `None`
    pub size_limit: Option<usize>,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            grow_percent: 100,
            max_chunk_size: 1024 * 1024,
            chunk_min_size: 256,
            sub_buffer_chunk_min_size: 512,
            sub_string_chunk_min_size: 512,
            write_direct_min_size: Some(1024),
            prefer_sub_chunk: false,
            allow_sub_buffers: true,
            size_limit: None,
        }
    }
}

impl BufferOptions {
    /// Fixed-size chunks of `chunk_size`, no growth.
    #[must_use]
    pub fn fixed(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            grow_percent: 0,
            max_chunk_size: chunk_size,
            ..Self::default()
        }
    }

    pub(crate) fn first_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Capacity of the next chunk, given the capacity allocated so far.
    pub(crate) fn next_chunk_size(&self, current: usize, total_allocated: usize) -> usize {
        let first = self.first_chunk_size();
        let max = self.max_chunk_size.max(first);
        match self.grow_percent {
            0 => current,
            100 => total_allocated.min(max).max(first),
            200 => total_allocated.saturating_mul(2).min(max).max(first),
            pct => (total_allocated.saturating_mul(pct) / 100).min(max).max(first),
        }
    }
}

/// Default codec name for each output role, as handed over by the
/// configuration layer.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    /// Codec for plain `out` writes.
    ///
    /// # Default
    ///
    /// `"none"`
    pub out: String,
    /// Codec for static markup.
    ///
    /// # Default
    ///
    /// `"none"`
    pub static_markup: String,
    /// Codec for `${...}` expression results.
    ///
    /// # Default
    ///
    /// `"html"`
    pub expression: String,
    /// Codec for tag-library output.
    ///
    /// # Default
    ///
    /// `"none"`
    pub taglib: String,
    /// Options for the response buffer created with the root context.
    pub buffer: BufferOptions,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            out: "none".to_string(),
            static_markup: "none".to_string(),
            expression: "html".to_string(),
            taglib: "none".to_string(),
            buffer: BufferOptions::default(),
        }
    }
}
