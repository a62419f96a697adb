//! Pipeline-side buffer and stream item types.
//!
//! A [`Buffer`] is the unit of data the pipeline exchanges with the bridge.
//! Unlike a reference-counted pipeline buffer, it is a single-owner value:
//! attaching it to a slot moves it in, yielding it from a receive moves it
//! out. This makes the zero-copy ownership transfer explicit in the type
//! system instead of in refcount discipline.

use std::time::Duration;

/// A single-owner pipeline buffer.
///
/// Carries the payload bytes, an optional presentation timestamp, and a
/// config flag marking out-of-band codec configuration data (stream headers)
/// rather than stream data.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    pts: Option<Duration>,
    config: bool,
}

impl Buffer {
    /// Create a buffer from existing payload bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pts: None,
            config: false,
        }
    }

    /// Allocate a zero-filled buffer of `len` bytes.
    ///
    /// This is the default backing allocation for shared-mode slots and
    /// for copied receive output.
    pub fn alloc(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Mark this buffer as codec configuration data.
    pub fn with_config(mut self) -> Self {
        self.config = true;
        self
    }

    /// Get the presentation timestamp, if any.
    pub fn pts(&self) -> Option<Duration> {
        self.pts
    }

    /// Set the presentation timestamp.
    pub fn set_pts(&mut self, pts: Option<Duration>) {
        self.pts = pts;
    }

    /// Whether this buffer carries codec configuration data.
    pub fn is_config(&self) -> bool {
        self.config
    }

    /// Set the config-data flag.
    pub fn set_config(&mut self, config: bool) {
        self.config = config;
    }

    /// Get the payload as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the payload as a mutable byte slice.
    ///
    /// Only the current owner can reach this; a buffer attached to a slot
    /// is writable by whichever side holds the slot.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the payload length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shorten the payload to `len` bytes.
    ///
    /// Used when a component fills fewer bytes than the backing allocation.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Consume the buffer, returning the payload bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

/// An item flowing through a port: data or an end-of-stream marker.
///
/// The send path classifies each item exactly once and dispatches to the
/// matching preparation step; the receive path yields items of the same
/// shape. Config data is a [`Buffer`] with its config flag set, not a
/// separate variant, mirroring how it travels in-band with the stream.
#[derive(Debug)]
pub enum StreamItem {
    /// Stream or config data.
    Buffer(Buffer),
    /// End of stream.
    Eos,
}

impl StreamItem {
    /// Check if this item is the end-of-stream marker.
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::Eos)
    }

    /// Get the contained buffer, if this is a data item.
    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Self::Buffer(b) => Some(b),
            Self::Eos => None,
        }
    }

    /// Take the contained buffer, returning `None` for end-of-stream.
    pub fn into_buffer(self) -> Option<Buffer> {
        match self {
            Self::Buffer(b) => Some(b),
            Self::Eos => None,
        }
    }
}

impl From<Buffer> for StreamItem {
    fn from(b: Buffer) -> Self {
        Self::Buffer(b)
    }
}
