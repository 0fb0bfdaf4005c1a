//! Immutable Cache Values
//!
//! Defines `ByteView`, the value type stored in every cache shard.

use bytes::Bytes;
use std::fmt;

// =============================================================================
// Byte View
// =============================================================================

/// An immutable view over cached bytes
///
/// The underlying buffer is never handed out. Every accessor that returns
/// bytes returns a fresh copy, so nothing outside the cache can mutate a
/// cached value. Cloning a `ByteView` is cheap (reference counted).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteView {
    b: Bytes,
}

impl ByteView {
    /// Create a view by copying `data`
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            b: Bytes::copy_from_slice(data),
        }
    }

    /// Create a view taking ownership of `data`
    ///
    /// Only use this when no other holder keeps a handle to the buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { b: Bytes::from(data) }
    }

    /// Create a view over a buffer received from a peer
    pub fn from_bytes(data: Bytes) -> Self {
        Self { b: data }
    }

    /// Number of bytes in the view
    #[inline]
    pub fn len(&self) -> usize {
        self.b.len()
    }

    /// Check if the view holds no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Return a copy of the bytes
    pub fn byte_slice(&self) -> Vec<u8> {
        self.b.to_vec()
    }

    /// Return the bytes as a string, replacing invalid UTF-8
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.b).into_owned()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.b))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView").field("len", &self.b.len()).finish()
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}
