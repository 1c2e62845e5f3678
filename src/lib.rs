// SPDX-License-Identifier: MIT

#[macro_use]
extern crate bitflags;

use std::io;

pub use self::capacity::{probe, Capacity};
pub mod capacity;

pub use self::card::Card;
pub mod card;

pub use self::config::{parse_address, ReadConfig, WriteConfig};
pub mod config;

pub use self::progress::{Bar, Progress};
pub mod progress;

pub use self::range::{validate, WriteRange};
pub mod range;

pub use self::source::Source;
pub mod source;

pub use self::writer::{ChunkedWriter, Summary, WriteRequest, CHUNK_SIZE};
pub mod writer;

pub mod block;
pub mod cancel;

#[cfg(test)]
mod fake;

/// Errors raised by a [`Device`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("capability query returned status {0}")]
    Status(i32),
    #[error("access of {len} bytes at {address:#x} is outside the card")]
    OutOfBounds { address: u64, len: u64 },
    #[error("card is write protected")]
    ReadOnly,
}

/// Errors surfaced to whoever drives a write, read or detect operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to retrieve the size of the memory card: {0}")]
    Probe(#[source] DeviceError),
    #[error("the data size ({len} bytes at {start:#x}) exceeds the memory card size ({capacity} bytes)")]
    Range { start: u64, len: u64, capacity: u64 },
    #[error("chunk {chunk} at {address:#x} failed: {source}")]
    Transfer {
        address: u64,
        chunk: usize,
        #[source]
        source: DeviceError,
    },
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("cancelled at {address:#x}, the card is partially written")]
    Cancelled { address: u64 },
    #[error("verification failed at {address:#x}: {found:#x} != {expected:#x}")]
    Verify { address: u64, expected: u8, found: u8 },
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Probe(_) => "ProbeError",
            Error::Range { .. } => "RangeError",
            Error::Transfer { .. } => "TransferError",
            Error::Io(_) => "IoError",
            Error::Cancelled { .. } => "Cancelled",
            Error::Verify { .. } => "VerifyError",
            Error::Internal(_) => "InternalError",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Probe(_) => 2,
            Error::Range { .. } => 3,
            Error::Transfer { .. } => 4,
            Error::Io(_) => 5,
            Error::Cancelled { .. } => 6,
            Error::Verify { .. } => 7,
            Error::Internal(_) => 70,
        }
    }
}

bitflags! {
    /// Properties reported alongside the capacity when a card is probed.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct CardFlags: u32 {
        /// Backed by a block device node rather than an image file.
        const BLOCK_DEVICE = 1 << 0;
        /// Write protect switch or kernel read-only flag is set.
        const READ_ONLY = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CardInfo {
    /// Addressable size in KiB, as reported by the adapter.
    pub capacity_kib: u64,
    pub flags: CardFlags,
}

/// An addressable memory card reachable through some adapter.
///
/// The writer never owns the device; it borrows it exclusively for the
/// duration of one operation.
pub trait Device {
    fn probe(&mut self) -> Result<CardInfo, DeviceError>;

    /// Write `data` at `start_addr`. When the write ends inside a block,
    /// `keep_existing` decides whether the rest of that block keeps its
    /// previous content or is filled with zeros.
    fn transmit(&mut self, data: &[u8], start_addr: u64, keep_existing: bool) -> Result<(), DeviceError>;

    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

impl<D: Device + ?Sized> Device for &mut D {
    fn probe(&mut self) -> Result<CardInfo, DeviceError> {
        (**self).probe()
    }

    fn transmit(&mut self, data: &[u8], start_addr: u64, keep_existing: bool) -> Result<(), DeviceError> {
        (**self).transmit(data, start_addr, keep_existing)
    }

    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        (**self).read(address, buf)
    }
}
