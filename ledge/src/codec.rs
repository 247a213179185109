//! Buffer packing for batched transfer of keys and values.
//!
//! Batched reads move many small byte strings at once. Rather than one
//! allocation per entry, a [`BufferPack`] lays every payload out in a single
//! flat buffer described by a parallel size list, so a whole batch crosses
//! an API boundary as exactly two allocations.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Size sentinel marking an entry with no payload.
pub const ABSENT: i32 = -1;

/// Rounds a payload length up to the transfer alignment.
///
/// An already-aligned length is unchanged.
fn padded_len(len: usize) -> usize {
    (len + 7) & !7
}

/// A flat, aligned encoding of a sequence of optional byte entries.
///
/// Each entry in the size list is either [`ABSENT`] (no payload, no data
/// bytes consumed) or the unpadded payload length at the next 8-byte-aligned
/// offset in the data buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferPack {
    sizes: Vec<i32>,
    data: Vec<u8>,
}

impl BufferPack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    ///
    /// Fails only when a payload is too large for the size list's `i32`
    /// entries.
    pub fn push(&mut self, entry: Option<&[u8]>) -> Result<()> {
        match entry {
            None => self.sizes.push(ABSENT),
            Some(payload) => {
                let size = i32::try_from(payload.len()).map_err(|_| {
                    Error::Encoding(format!(
                        "entry of {} bytes exceeds the packable maximum",
                        payload.len()
                    ))
                })?;
                let base = self.data.len();
                self.sizes.push(size);
                self.data.extend_from_slice(payload);
                self.data.resize(base + padded_len(payload.len()), 0);
            }
        }
        Ok(())
    }

    /// Packs a sequence of optional entries.
    pub fn pack<'a>(entries: impl IntoIterator<Item = Option<&'a [u8]>>) -> Result<Self> {
        let mut pack = Self::new();
        for entry in entries {
            pack.push(entry)?;
        }
        Ok(pack)
    }

    /// Number of entries, absent ones included.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// The size list: one entry per pushed entry, [`ABSENT`] for absent ones.
    pub fn sizes(&self) -> &[i32] {
        &self.sizes
    }

    /// The flat payload buffer, padded between entries.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decodes the pack back into optional byte strings.
    ///
    /// Fails when a size entry overruns the data buffer.
    pub fn unpack(&self) -> Result<Vec<Option<Bytes>>> {
        let mut entries = Vec::with_capacity(self.sizes.len());
        let mut offset = 0usize;
        for &size in &self.sizes {
            if size < 0 {
                entries.push(None);
                continue;
            }
            let size = size as usize;
            if offset + size > self.data.len() {
                return Err(Error::Encoding(format!(
                    "entry of {} bytes at offset {} overruns {} data bytes",
                    size,
                    offset,
                    self.data.len()
                )));
            }
            entries.push(Some(Bytes::copy_from_slice(&self.data[offset..offset + size])));
            offset += padded_len(size);
        }
        Ok(entries)
    }
}
