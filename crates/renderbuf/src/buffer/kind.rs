use alloc::{borrow::ToOwned, string::String, vec::Vec};
use core::{fmt, ops::Range};

use crate::encoding_state::EncodingState;

/// Storage unit of a chunked buffer.
///
/// Sizes, offsets and capacities are counted in bytes for both kinds; text
/// operations never split a UTF-8 scalar.
pub trait BufferKind: 'static {
    type Slice: ?Sized + ToOwned<Owned = Self::Owned> + fmt::Debug;
    type Owned: fmt::Debug;
    /// Metadata carried by every stored span.
    type Tag: Clone + PartialEq + Default + fmt::Debug;

    fn len(part: &Self::Slice) -> usize;

    fn with_capacity(capacity: usize) -> Self::Owned;

    fn capacity(owned: &Self::Owned) -> usize;

    fn as_slice(owned: &Self::Owned) -> &Self::Slice;

    fn push(owned: &mut Self::Owned, part: &Self::Slice);

    fn clear(owned: &mut Self::Owned);

    /// Length of the longest prefix of `part` no longer than `max` that ends
    /// on a boundary. Never less than one scalar unless `part` is empty.
    fn fit(part: &Self::Slice, max: usize) -> usize;

    /// Same as [`fit`](Self::fit) but may return zero.
    fn fit_within(part: &Self::Slice, max: usize) -> usize;

    /// `part[range]`, or `None` if out of bounds or not on boundaries.
    fn get(part: &Self::Slice, range: Range<usize>) -> Option<&Self::Slice>;

    fn head(part: &Self::Slice, len: usize) -> &Self::Slice {
        Self::get(part, 0..len).unwrap_or(Self::empty())
    }

    fn tail(part: &Self::Slice, from: usize) -> &Self::Slice {
        Self::get(part, from..Self::len(part)).unwrap_or(Self::empty())
    }

    fn empty() -> &'static Self::Slice;
}

/// UTF-8 text whose spans carry the [`EncodingState`] they were written with.
#[derive(Debug, Clone, Copy)]
pub struct Text;

/// Raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct Bytes;

impl BufferKind for Text {
    type Slice = str;
    type Owned = String;
    type Tag = EncodingState;

    fn len(part: &str) -> usize {
        part.len()
    }

    fn with_capacity(capacity: usize) -> String {
        String::with_capacity(capacity)
    }

    fn capacity(owned: &String) -> usize {
        owned.capacity()
    }

    fn as_slice(owned: &String) -> &str {
        owned
    }

    fn push(owned: &mut String, part: &str) {
        owned.push_str(part);
    }

    fn clear(owned: &mut String) {
        owned.clear();
    }

    fn fit(part: &str, max: usize) -> usize {
        match Self::fit_within(part, max) {
            0 => part.chars().next().map_or(0, char::len_utf8),
            n => n,
        }
    }

    fn fit_within(part: &str, max: usize) -> usize {
        if max >= part.len() {
            return part.len();
        }
        let mut end = max;
        while end > 0 && !part.is_char_boundary(end) {
            end -= 1;
        }
        end
    }

    fn get(part: &str, range: Range<usize>) -> Option<&str> {
        part.get(range)
    }

    fn empty() -> &'static str {
        ""
    }
}

impl BufferKind for Bytes {
    type Slice = [u8];
    type Owned = Vec<u8>;
    type Tag = ();

    fn len(part: &[u8]) -> usize {
        part.len()
    }

    fn with_capacity(capacity: usize) -> Vec<u8> {
        Vec::with_capacity(capacity)
    }

    fn capacity(owned: &Vec<u8>) -> usize {
        owned.capacity()
    }

    fn as_slice(owned: &Vec<u8>) -> &[u8] {
        owned
    }

    fn push(owned: &mut Vec<u8>, part: &[u8]) {
        owned.extend_from_slice(part);
    }

    fn clear(owned: &mut Vec<u8>) {
        owned.clear();
    }

    fn fit(part: &[u8], max: usize) -> usize {
        part.len().min(max.max(1))
    }

    fn fit_within(part: &[u8], max: usize) -> usize {
        part.len().min(max)
    }

    fn get(part: &[u8], range: Range<usize>) -> Option<&[u8]> {
        part.get(range)
    }

    fn empty() -> &'static [u8] {
        &[]
    }
}
