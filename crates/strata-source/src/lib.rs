// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Byte sources for Strata.
//!
//! A [`ByteSource`] is a linear address space that layout trees are observed
//! against: an in-memory buffer, a file snapshot, or live memory behind a
//! remote transport. Every backend satisfies the same contract:
//!
//! - Reads and writes signal failure with `false`, never by panicking.
//! - A range is readable only if `[addr, addr + len)` lies inside
//!   `[0, size())`. Zero-length ranges are always readable.
//! - Writes are all-or-nothing.
//! - `read` may be called concurrently from several threads; a `write` is
//!   never observed as a torn read.
//!
//! Typed helpers live on [`ByteSourceExt`] and zero-fill on failure so
//! formatting code never sees uninitialised bytes.
#![forbid(unsafe_code)]

mod buffer;
mod worker;

pub use buffer::{BufferSource, NullSource};
pub use worker::{MemoryTransport, TransportInfo, WorkerSource};

use thiserror::Error;

/// Label shown for a source that has no name (nothing selected yet).
pub const SELECT_SOURCE_LABEL: &str = "<Select Source>";

/// Errors raised while constructing a byte source.
///
/// Reads and writes on an established source report failure through their
/// boolean result instead.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport factory refused to connect.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The worker thread exited before answering.
    #[error("source worker is gone")]
    WorkerGone,
}

/// Readable (optionally writable, optionally live) linear address space.
pub trait ByteSource: Send + Sync {
    /// Total addressable length; `0` when nothing backs the source.
    fn size(&self) -> u64;

    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// Returns `false` when the range is not fully readable. On failure the
    /// contents of `buf` are unspecified; use [`ByteSourceExt::read_bytes`]
    /// or the typed helpers for zero-filled results.
    fn read(&self, addr: u64, buf: &mut [u8]) -> bool;

    /// Whether [`ByteSource::write`] can ever succeed.
    fn is_writable(&self) -> bool {
        false
    }

    /// Writes all of `data` at `addr`, or nothing at all.
    fn write(&self, _addr: u64, _data: &[u8]) -> bool {
        false
    }

    /// Human label (file name, process name). Empty means "no source".
    fn name(&self) -> String {
        String::new()
    }

    /// Backend family label ("File", "Process", ...).
    fn kind(&self) -> String {
        "File".to_owned()
    }

    /// True for sources whose bytes may change underneath the reader.
    fn is_live(&self) -> bool {
        false
    }

    /// Rebasing address for sources where absolute addresses are meaningful.
    fn base(&self) -> u64 {
        0
    }

    /// Moves the rebasing address. No-op for pure-offset sources.
    fn set_base(&self, _base: u64) {}

    /// Symbol name covering `addr`, when the backend knows one.
    fn symbol_at(&self, _addr: u64) -> Option<String> {
        None
    }

    /// True iff the source is backed and non-empty.
    fn is_valid(&self) -> bool {
        self.size() > 0
    }

    /// Boundary predicate for `[addr, addr + len)`.
    fn is_readable(&self, addr: u64, len: u64) -> bool {
        if len == 0 {
            return true;
        }
        addr.checked_add(len).is_some_and(|end| end <= self.size())
    }
}

/// Little-endian typed reads layered over [`ByteSource::read`].
///
/// Every helper substitutes zero when the underlying read fails.
pub trait ByteSourceExt: ByteSource {
    /// Reads `len` bytes; the whole span is zero if the read fails.
    ///
    /// The result always has `len` bytes, so callers bound `len` to what
    /// they intend to show or edit.
    fn read_bytes(&self, addr: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        if !self.read(addr, &mut buf) {
            buf.fill(0);
        }
        buf
    }

    /// Reads a fixed-size array; zeroes on failure.
    fn read_array<const N: usize>(&self, addr: u64) -> [u8; N] {
        let mut buf = [0u8; N];
        if !self.read(addr, &mut buf) {
            buf = [0u8; N];
        }
        buf
    }

    /// Reads one byte.
    fn read_u8(&self, addr: u64) -> u8 {
        self.read_array::<1>(addr)[0]
    }

    /// Reads a little-endian `u16`.
    fn read_u16(&self, addr: u64) -> u16 {
        u16::from_le_bytes(self.read_array(addr))
    }

    /// Reads a little-endian `u32`.
    fn read_u32(&self, addr: u64) -> u32 {
        u32::from_le_bytes(self.read_array(addr))
    }

    /// Reads a little-endian `u64`.
    fn read_u64(&self, addr: u64) -> u64 {
        u64::from_le_bytes(self.read_array(addr))
    }

    /// Reads a little-endian `f32`.
    fn read_f32(&self, addr: u64) -> f32 {
        f32::from_le_bytes(self.read_array(addr))
    }

    /// Reads a little-endian `f64`.
    fn read_f64(&self, addr: u64) -> f64 {
        f64::from_le_bytes(self.read_array(addr))
    }

    /// Reads any plain-old-data value of `size_of::<T>()` bytes.
    ///
    /// The value is assembled from the raw bytes without alignment
    /// requirements; a failed read yields `T::zeroed()`.
    fn read_as<T: bytemuck::Pod>(&self, addr: u64) -> T {
        let bytes = self.read_bytes(addr, std::mem::size_of::<T>());
        bytemuck::pod_read_unaligned(&bytes)
    }

    /// Writes an owned byte span (convenience over [`ByteSource::write`]).
    fn write_bytes(&self, addr: u64, data: &[u8]) -> bool {
        self.write(addr, data)
    }
}

impl<S: ByteSource + ?Sized> ByteSourceExt for S {}

/// Label for the source picker row: `"<kind> '<name>'"`, or
/// [`SELECT_SOURCE_LABEL`] when the source has no name.
pub fn source_label(source: &dyn ByteSource) -> String {
    let name = source.name();
    if name.is_empty() {
        return SELECT_SOURCE_LABEL.to_owned();
    }
    format!("{} '{}'", source.kind(), name)
}
