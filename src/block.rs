// SPDX-License-Identifier: MIT

/// Size of one card block. A 4096 byte chunk is eight of these.
pub const BLOCK_SIZE: u64 = 512;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockAddress(pub u64);

impl BlockAddress {
    pub fn of(address: u64) -> BlockAddress {
        BlockAddress(address / BLOCK_SIZE)
    }

    pub fn start(self) -> u64 {
        self.0 * BLOCK_SIZE
    }
}

/// Number of blocks touched by `size` bytes at `address`.
pub fn blocks_spanned(address: u64, size: u64) -> u64 {
    let aligned_address = BlockAddress::of(address).start();
    let offset = address - aligned_address;
    (offset + size + BLOCK_SIZE - 1) / BLOCK_SIZE
}

/// Bytes between `end` and the next block boundary, clamped to `limit`.
/// These are the bytes a short final write leaves untouched inside its last
/// block.
pub fn remainder(end: u64, limit: u64) -> std::ops::Range<u64> {
    let offset = end % BLOCK_SIZE;
    if offset == 0 || end >= limit {
        return end..end;
    }
    let boundary = end - offset + BLOCK_SIZE;
    end..boundary.min(limit)
}
