// SPDX-License-Identifier: MIT

use crate::{Capacity, Error};

/// A byte range on the card that passed [`validate`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteRange {
    pub start: u64,
    pub len: u64,
}

impl WriteRange {
    /// One past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Check once, before anything is transferred, that `len` bytes starting at
/// `start` fit on a card of `capacity` bytes.
pub fn validate(start: u64, len: u64, capacity: Capacity) -> Result<WriteRange, Error> {
    let capacity = capacity.bytes();
    let err = Error::Range { start, len, capacity };

    // Both checks are kept; the second alone also guards `start > capacity`.
    if len > capacity {
        return Err(err);
    }
    if start > capacity - len {
        return Err(err);
    }
    Ok(WriteRange { start, len })
}
