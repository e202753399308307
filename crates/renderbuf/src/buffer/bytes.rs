use alloc::{string::String, vec::Vec};
use std::io;

use bstr::ByteSlice;

use super::{ChunkReader, ChunkSink, ChunkedByteBuffer, Bytes, Text};
use crate::{encoding_state::EncodingState, error::RenderError};

impl ChunkSink<Bytes> for Vec<u8> {
    fn write_chunk(&mut self, _tag: &(), part: &[u8]) -> Result<(), RenderError> {
        self.extend_from_slice(part);
        Ok(())
    }
}

/// Adapts any [`io::Write`] as a sink for text or byte buffers. Text is
/// written as UTF-8.
#[derive(Debug, Default)]
pub struct IoSink<W>(pub W);

impl<W> IoSink<W> {
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: io::Write> ChunkSink<Bytes> for IoSink<W> {
    fn write_chunk(&mut self, _tag: &(), part: &[u8]) -> Result<(), RenderError> {
        Ok(self.0.write_all(part)?)
    }

    fn flush_chunks(&mut self) -> Result<(), RenderError> {
        Ok(self.0.flush()?)
    }
}

impl<W: io::Write> ChunkSink<Text> for IoSink<W> {
    fn write_chunk(&mut self, _state: &EncodingState, part: &str) -> Result<(), RenderError> {
        Ok(self.0.write_all(part.as_bytes())?)
    }

    fn flush_chunks(&mut self) -> Result<(), RenderError> {
        Ok(self.0.flush()?)
    }
}

impl ChunkedByteBuffer {
    pub fn write_byte(&self, byte: u8) -> Result<(), RenderError> {
        self.write(&[byte])
    }

    /// The retained content as one byte vector, or the error that stopped
    /// the walk over it.
    pub fn try_to_aggregated_bytes(&self) -> Result<Vec<u8>, RenderError> {
        let mut out = Vec::with_capacity(self.try_size()?);
        self.for_each_part(&mut |(), part| {
            out.extend_from_slice(part);
            Ok(())
        })?;
        Ok(out)
    }

    /// Like [`try_to_aggregated_bytes`](Self::try_to_aggregated_bytes), but
    /// logs a failure and returns what was collected up to it.
    #[must_use]
    pub fn to_aggregated_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Err(err) = self.for_each_part(&mut |(), part| {
            out.extend_from_slice(part);
            Ok(())
        }) {
            log::warn!("buffer {:?} aggregated partially: {err}", self.id());
        }
        out
    }

    /// The content as text, failing on invalid UTF-8.
    pub fn to_str(&self) -> Result<String, RenderError> {
        Ok(self.try_to_aggregated_bytes()?.to_str()?.into())
    }

    /// The content as text with invalid sequences replaced by U+FFFD.
    #[must_use]
    pub fn to_str_lossy(&self) -> String {
        self.to_aggregated_bytes().to_str_lossy().into_owned()
    }
}

impl io::Write for ChunkedByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ChunkedByteBuffer::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        ChunkedByteBuffer::flush(self).map_err(io::Error::other)
    }
}

impl io::Read for ChunkReader<Bytes> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        self.read_with(buf.len(), &mut |(), part| {
            buf[filled..filled + part.len()].copy_from_slice(part);
            filled += part.len();
            Ok(())
        })
        .map_err(io::Error::other)?;
        Ok(filled)
    }
}
