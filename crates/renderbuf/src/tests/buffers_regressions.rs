use alloc::{rc::Rc, string::String, vec, vec::Vec};
use core::{cell::RefCell, fmt::Write as _};
use std::io::{self, Write as _};

use crate::{
    BufferError, BufferOptions, ChunkSink, ChunkedByteBuffer, ChunkedTextBuffer, EncodingState,
    IoSink, RenderError, Text,
};

#[test]
fn size_larger_than() {
    let buffer = ChunkedTextBuffer::new();
    buffer.write("12345").unwrap();
    assert!(buffer.is_size_larger(4));
    assert!(!buffer.is_size_larger(5));
}

#[test]
fn range_writes_are_checked() {
    let buffer = ChunkedTextBuffer::new();
    buffer.write_range("hello world", 6, 5).unwrap();
    assert_eq!(buffer.to_aggregated_string(), "world");
    assert!(matches!(
        buffer.write_range("héllo", 2, 1),
        Err(RenderError::Buffer(BufferError::Range { offset: 2, len: 1, available: 6 }))
    ));
    assert!(matches!(
        buffer.write_range("abc", 2, 5),
        Err(RenderError::Buffer(BufferError::Range { .. }))
    ));
}

#[test]
fn empty_writes_allocate_nothing() {
    let buffer = ChunkedTextBuffer::new();
    buffer.write("").unwrap();
    buffer.write_owned(String::new()).unwrap();
    assert_eq!(buffer.chunk_count().unwrap(), 0);
    assert!(buffer.is_empty());
}

#[test]
fn formatting_into_a_buffer() {
    let mut buffer = ChunkedTextBuffer::with_options(BufferOptions::fixed(4));
    write!(buffer, "{}-{:03}", "id", 7).unwrap();
    assert_eq!(buffer.to_string(), "id-007");
}

#[test]
fn cleared_buffer_can_be_reused() {
    let buffer = ChunkedTextBuffer::with_options(BufferOptions::fixed(4));
    buffer.write("abcdefgh").unwrap();
    buffer.clear().unwrap();
    assert!(buffer.is_empty());
    buffer.write("xy").unwrap();
    assert_eq!(buffer.to_aggregated_string(), "xy");
}

#[test]
fn connecting_a_buffer_to_itself_is_reentrant() {
    let buffer = ChunkedTextBuffer::with_options(BufferOptions::fixed(2));
    buffer.connect_to(buffer.clone()).unwrap();
    buffer.write("ab").unwrap();
    assert!(matches!(
        buffer.write("cd"),
        Err(RenderError::Buffer(BufferError::Reentrant))
    ));
}

#[test]
fn sub_buffer_connected_to_its_limited_parent_is_reentrant() {
    let parent = ChunkedTextBuffer::with_options(BufferOptions {
        size_limit: Some(100),
        ..Default::default()
    });
    let sub = ChunkedTextBuffer::with_options(BufferOptions {
        chunk_size: 4,
        chunk_min_size: 0,
        write_direct_min_size: Some(4),
        ..Default::default()
    });
    sub.set_prefer_sub_chunk(true).unwrap();
    parent.append_buffer(&sub).unwrap();
    sub.connect_to(parent.clone()).unwrap();

    assert!(matches!(
        sub.write("0123456789"),
        Err(RenderError::Buffer(BufferError::Reentrant))
    ));
    assert_eq!(sub.try_size().unwrap(), 0);
    assert_eq!(parent.try_size().unwrap(), 0);
    assert!(!sub.is_closed().unwrap());
    assert!(sub.is_connected().unwrap());
}

/// Sink that tries to aggregate the buffer feeding it.
struct Aggregating {
    source: ChunkedTextBuffer,
    results: Rc<RefCell<Vec<Result<String, RenderError>>>>,
}

impl ChunkSink<Text> for Aggregating {
    fn write_chunk(&mut self, _state: &EncodingState, _part: &str) -> Result<(), RenderError> {
        self.results
            .borrow_mut()
            .push(self.source.try_to_aggregated_string());
        Ok(())
    }
}

#[test]
fn aggregation_reports_a_buffer_mid_write() {
    let buffer = ChunkedTextBuffer::with_options(BufferOptions {
        chunk_size: 2,
        chunk_min_size: 0,
        write_direct_min_size: Some(2),
        ..Default::default()
    });
    let results = Rc::new(RefCell::new(Vec::new()));
    buffer
        .connect_to(Aggregating {
            source: buffer.clone(),
            results: Rc::clone(&results),
        })
        .unwrap();
    buffer.write("abcd").unwrap();

    assert_eq!(results.borrow().len(), 1);
    assert!(matches!(
        results.borrow()[0],
        Err(RenderError::Buffer(BufferError::Reentrant))
    ));

    let plain = ChunkedTextBuffer::new();
    plain.write("ok").unwrap();
    assert_eq!(plain.try_to_aggregated_string().unwrap(), "ok");
}

#[test]
fn byte_buffer_through_io_traits() {
    let mut buffer = ChunkedByteBuffer::with_options(BufferOptions::fixed(3));
    buffer.write_all(b"binary\x00data").unwrap();
    buffer.write_byte(b'!').unwrap();
    assert_eq!(buffer.size(), 12);

    let mut out = Vec::new();
    buffer.reader(false).read_to_end(&mut out).unwrap();
    assert_eq!(out, b"binary\x00data!");

    let mut first = [0; 4];
    let mut reader = buffer.reader(true);
    assert_eq!(io::Read::read(&mut reader, &mut first).unwrap(), 3);
    assert_eq!(&first[..3], b"bin");
    assert_eq!(buffer.size(), 9);
}

#[test]
fn byte_buffer_as_text() {
    let buffer = ChunkedByteBuffer::new();
    buffer.write("ñ".as_bytes()).unwrap();
    assert_eq!(buffer.to_str().unwrap(), "ñ");
    buffer.write(&[0xff]).unwrap();
    assert!(matches!(buffer.to_str(), Err(RenderError::InvalidUtf8(_))));
    assert_eq!(buffer.to_str_lossy(), "ñ\u{fffd}");
}

#[test]
fn connected_to_an_io_writer() {
    let buffer = ChunkedByteBuffer::with_options(BufferOptions::fixed(4));
    let sink = std::rc::Rc::new(core::cell::RefCell::new(IoSink(vec![])));
    buffer.connect_to(std::rc::Rc::clone(&sink)).unwrap();
    buffer.write(b"0123456789").unwrap();
    buffer.close().unwrap();
    assert_eq!(sink.borrow().0, b"0123456789");
}
