// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Empty and in-memory byte sources.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{ByteSource, SourceError};

/// Placeholder source used when nothing is selected.
///
/// Size is zero, every non-empty read fails, and the name is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSource;

impl ByteSource for NullSource {
    fn size(&self) -> u64 {
        0
    }

    fn read(&self, _addr: u64, buf: &mut [u8]) -> bool {
        buf.is_empty()
    }
}

/// Byte buffer held in memory (file snapshot or synthetic data).
///
/// Byte `0` of the buffer sits at [`ByteSource::base`] (zero unless moved
/// with [`ByteSource::set_base`]), so a layout mapped at a nonzero address
/// reads the buffer at its own addresses. Readers share a read lock;
/// writers take the write lock, so a write is never observed half-applied.
#[derive(Debug, Default)]
pub struct BufferSource {
    data: RwLock<Vec<u8>>,
    name: String,
    base: AtomicU64,
}

impl BufferSource {
    /// Wraps `data` with no name.
    pub fn new(data: Vec<u8>) -> Self {
        Self::named(data, "")
    }

    /// Wraps `data` under a display name.
    pub fn named(data: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            data: RwLock::new(data),
            name: name.into(),
            base: AtomicU64::new(0),
        }
    }

    /// Maps byte `0` at `base`.
    #[must_use]
    pub fn with_base(mut self, base: u64) -> Self {
        *self.base.get_mut() = base;
        self
    }

    /// Loads a whole file; the file name becomes the display name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(path = %path.display(), len = data.len(), "loaded file source");
        Ok(Self::named(data, name))
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock_read().clone()
    }

    fn lock_read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Slice bounds of `[addr, addr + len)` after removing the base.
    fn span(&self, addr: u64, len: usize, size: usize) -> Option<(usize, usize)> {
        span(addr.checked_sub(self.base())?, len, size)
    }
}

/// Converts a checked `[offset, offset + len)` range into slice bounds.
fn span(offset: u64, len: usize, size: usize) -> Option<(usize, usize)> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(len)?;
    (end <= size).then_some((start, end))
}

impl ByteSource for BufferSource {
    fn size(&self) -> u64 {
        self.lock_read().len() as u64
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> bool {
        if buf.is_empty() {
            return true;
        }
        let data = self.lock_read();
        let Some((start, end)) = self.span(addr, buf.len(), data.len()) else {
            return false;
        };
        buf.copy_from_slice(&data[start..end]);
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn write(&self, addr: u64, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        let mut data = self.lock_write();
        let Some((start, end)) = self.span(addr, bytes.len(), data.len()) else {
            return false;
        };
        data[start..end].copy_from_slice(bytes);
        true
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn base(&self) -> u64 {
        self.base.load(Ordering::Acquire)
    }

    fn set_base(&self, base: u64) {
        self.base.store(base, Ordering::Release);
    }

    fn is_readable(&self, addr: u64, len: u64) -> bool {
        if len == 0 {
            return true;
        }
        addr.checked_sub(self.base())
            .and_then(|offset| offset.checked_add(len))
            .is_some_and(|end| end <= self.size())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ByteSourceExt;

    #[test]
    fn null_source_is_empty_and_unnamed() {
        let src = NullSource;
        assert!(!src.is_valid());
        assert_eq!(src.size(), 0);
        assert!(!src.is_writable());
        assert!(src.name().is_empty());
        let mut b = [0xFFu8];
        assert!(!src.read(0, &mut b));
        assert_eq!(b[0], 0xFF, "failed read leaves the buffer untouched");
        assert_eq!(src.read_u8(0), 0);
        assert_eq!(src.read_bytes(0, 4), vec![0; 4]);
        assert_eq!(src.symbol_at(0x7FF0_0000), None);
    }

    #[test]
    fn empty_buffer_is_not_valid() {
        let src = BufferSource::new(Vec::new());
        assert!(!src.is_valid());
        assert_eq!(src.size(), 0);
    }

    #[test]
    fn typed_reads_are_little_endian() {
        let mut d = vec![0u8; 16];
        d[0] = 0x34;
        d[1] = 0x12;
        d[4..12].copy_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
        let src = BufferSource::new(d);
        assert_eq!(src.read_u16(0), 0x1234);
        assert_eq!(src.read_u64(4), 0x0102_0304_0506_0708);
    }

    #[test]
    fn floats_round_trip_through_bytes() {
        let mut d = vec![0u8; 12];
        d[0..4].copy_from_slice(&1.5f32.to_le_bytes());
        d[4..12].copy_from_slice(&2.25f64.to_le_bytes());
        let src = BufferSource::new(d);
        assert_eq!(src.read_f32(0).to_bits(), 1.5f32.to_bits());
        assert_eq!(src.read_f64(4).to_bits(), 2.25f64.to_bits());
    }

    #[test]
    fn read_as_assembles_pod_structs() {
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        #[repr(C)]
        struct Pair {
            a: u16,
            b: u16,
        }
        let mut d = vec![0u8; 5];
        d[1..3].copy_from_slice(&0x1111u16.to_le_bytes());
        d[3..5].copy_from_slice(&0x2222u16.to_le_bytes());
        let src = BufferSource::new(d);
        let pair: Pair = src.read_as(1);
        assert_eq!((pair.a, pair.b), (0x1111, 0x2222));
        let missing: Pair = src.read_as(4);
        assert_eq!((missing.a, missing.b), (0, 0));
    }

    #[test]
    fn read_past_end_is_zero_filled() {
        let src = BufferSource::new(vec![b'X'; 4]);
        assert_eq!(src.read_bytes(2, 8), vec![0; 8]);
        assert!(src.read_bytes(0, 0).is_empty());
        assert_eq!(src.read_bytes(4, 4), vec![0; 4]);
    }

    #[test]
    fn rebased_buffer_answers_at_its_own_addresses() {
        let src = BufferSource::new(vec![0xEF, 0xBE, 0xAD, 0xDE, 0, 0]).with_base(0x1000);
        assert_eq!(src.base(), 0x1000);
        assert_eq!(src.read_u32(0x1000), 0xDEAD_BEEF);
        assert_eq!(src.read_u32(0), 0, "below the base reads as zero");
        assert!(src.is_readable(0x1002, 4));
        assert!(!src.is_readable(0x1003, 4));
        assert!(!src.is_readable(0xFFF, 1));

        assert!(src.write(0x1004, &[7, 8]));
        assert!(!src.write(0x0004, &[7, 8]));
        assert_eq!(src.snapshot()[4..], [7, 8]);

        src.set_base(0);
        assert_eq!(src.read_u8(4), 7);
    }

    #[test]
    fn writes_are_all_or_nothing() {
        let src = BufferSource::new(vec![0u8; 8]);
        assert!(src.write_bytes(2, &[0xAA, 0xBB, 0xCC, 0xDD]));
        assert_eq!(src.read_u8(2), 0xAA);
        assert_eq!(src.read_u8(5), 0xDD);

        assert!(!src.write(6, &[1, 2, 3, 4]));
        assert_eq!(src.snapshot(), vec![0, 0, 0xAA, 0xBB, 0xCC, 0xDD, 0, 0]);
    }
}
