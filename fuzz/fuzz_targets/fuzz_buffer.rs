#![no_main]
use std::{cell::RefCell, rc::Rc};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use renderbuf::{BufferOptions, ChunkedTextBuffer, EncodedAppender, Encoder, EncodingState};

#[derive(Debug, Arbitrary)]
enum Op {
    Write(String),
    Owned(String),
    Char(char),
    Encode(u8, String),
    Append { parts: Vec<String>, prefer_sub: bool },
    Read(u8),
    Flush,
}

#[derive(Debug, Arbitrary)]
struct Input {
    chunk_size: u8,
    chunk_min_size: u8,
    direct_min_size: Option<u8>,
    connected: bool,
    ops: Vec<Op>,
}

fn encoder(which: u8) -> Encoder {
    match which % 4 {
        0 => Encoder::html(),
        1 => Encoder::xml(),
        2 => Encoder::javascript(),
        _ => Encoder::chain([Encoder::html(), Encoder::javascript()]),
    }
}

fuzz_target!(|input: Input| {
    let mut buffer = ChunkedTextBuffer::with_options(BufferOptions {
        chunk_size: usize::from(input.chunk_size),
        chunk_min_size: usize::from(input.chunk_min_size),
        sub_buffer_chunk_min_size: usize::from(input.chunk_size),
        sub_string_chunk_min_size: usize::from(input.chunk_size),
        write_direct_min_size: input.direct_min_size.map(usize::from),
        ..Default::default()
    });
    let sink = Rc::new(RefCell::new(String::new()));
    if input.connected {
        buffer.connect_to(Rc::clone(&sink)).unwrap();
    }

    // Everything written, in order; `consumed` is what a consuming reader
    // took off the front.
    let mut model = String::new();
    let mut consumed = String::new();
    let mut reader = buffer.reader(true);

    for op in input.ops {
        match op {
            Op::Write(s) => {
                buffer.write(&s).unwrap();
                model.push_str(&s);
            }
            Op::Owned(s) => {
                model.push_str(&s);
                buffer.write_owned(s).unwrap();
            }
            Op::Char(c) => {
                buffer.write_char(c).unwrap();
                model.push(c);
            }
            Op::Encode(which, s) => {
                let encoder = encoder(which);
                let encoded = encoder.encode(&s).unwrap();
                model.push_str(&encoded);
                buffer
                    .append(Some(&encoder), &EncodingState::empty(), &s)
                    .unwrap();
            }
            Op::Append { parts, prefer_sub } => {
                let other = ChunkedTextBuffer::with_options(BufferOptions::fixed(3));
                other.set_prefer_sub_chunk(prefer_sub).unwrap();
                for part in &parts {
                    other.write(part).unwrap();
                    model.push_str(part);
                }
                buffer.append_buffer(&other).unwrap();
            }
            Op::Read(max) if !input.connected => {
                reader.read(&mut consumed, usize::from(max)).unwrap();
            }
            Op::Read(_) => {}
            Op::Flush => buffer.flush().unwrap(),
        }
    }

    if input.connected {
        buffer.close().unwrap();
        assert_eq!(*sink.borrow(), model);
        assert_eq!(buffer.size(), 0);
    } else {
        assert_eq!(format!("{consumed}{}", buffer.to_aggregated_string()), model);
        assert_eq!(buffer.size() + consumed.len(), model.len());
    }
});
