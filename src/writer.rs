// SPDX-License-Identifier: MIT

use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace, warn};

use crate::block;
use crate::capacity;
use crate::range::validate;
use crate::{Device, DeviceError, Error, Progress, Source};

/// Eight 512 byte blocks per transmit.
pub const CHUNK_SIZE: usize = 4096;

/// A write that already passed the capacity check. Only
/// [`ChunkedWriter::prepare`] hands these out:
///
/// ```compile_fail
/// let request = mci_write::WriteRequest {
///     start_address: 0,
///     source_length: 1 << 40,
///     keep_existing: true,
/// };
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteRequest {
    start_address: u64,
    source_length: u64,
    keep_existing: bool,
}

impl WriteRequest {
    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    pub fn source_length(&self) -> u64 {
        self.source_length
    }

    /// Keep what is already on the card after a short final chunk instead
    /// of zero filling the rest of its block.
    pub fn keep_existing(&self) -> bool {
        self.keep_existing
    }
}

/// Outcome of a finished transfer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub chunks: usize,
    pub bytes: u64,
    /// Cursor after the last chunk.
    pub end_address: u64,
}

/// Streams a [`Source`] onto a [`Device`] in fixed-size chunks.
///
/// There is no retry and no rollback. If a transmit fails or the transfer
/// is cancelled, everything before the failing chunk is already on the card.
pub struct ChunkedWriter<'a, D: ?Sized> {
    device: &'a mut D,
    chunk_size: NonZeroUsize,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, D: Device + ?Sized> ChunkedWriter<'a, D> {
    pub fn new(device: &'a mut D) -> Self {
        ChunkedWriter {
            device,
            chunk_size: NonZeroUsize::new(CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            cancel: None,
        }
    }

    pub fn chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Stop between chunks once `flag` is set.
    pub fn cancel_on(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancel(&self, address: u64) -> Result<(), Error> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(Error::Cancelled { address }),
            _ => Ok(()),
        }
    }

    /// Probe the card and make sure the whole source fits at `start_address`.
    pub fn prepare<S: Source + ?Sized>(
        &mut self,
        source: &S,
        start_address: u64,
        keep_existing: bool,
    ) -> Result<WriteRequest, Error> {
        let capacity = capacity::probe(&mut *self.device)?;
        let range = validate(start_address, source.size()?, capacity)?;
        Ok(WriteRequest {
            start_address: range.start,
            source_length: range.len,
            keep_existing,
        })
    }

    pub fn write<S, P>(&mut self, source: &mut S, request: &WriteRequest, progress: &mut P) -> Result<Summary, Error>
    where
        S: Source + ?Sized,
        P: Progress + ?Sized,
    {
        info!(
            "writing {} bytes at {:#x} (keep existing: {})",
            request.source_length, request.start_address, request.keep_existing
        );

        let mut buf = vec![0; self.chunk_size.get()];
        let mut cursor = request.start_address;
        let mut remaining = request.source_length;
        let mut summary = Summary {
            end_address: cursor,
            ..Summary::default()
        };

        while remaining > 0 {
            self.check_cancel(cursor)?;

            let want = remaining.min(buf.len() as u64) as usize;
            let read = source.fill(&mut buf[..want])?;
            if read == 0 {
                warn!("source ended {} bytes early", remaining);
                break;
            }

            let chunk = &buf[..read];
            trace!(
                "chunk {}: {} bytes at {:#x}, {} blocks",
                summary.chunks,
                read,
                cursor,
                block::blocks_spanned(cursor, read as u64)
            );
            self.device
                .transmit(chunk, cursor, request.keep_existing)
                .map_err(|source| Error::Transfer {
                    address: cursor,
                    chunk: summary.chunks,
                    source,
                })?;

            cursor += read as u64;
            remaining -= read as u64;
            summary.chunks += 1;
            summary.bytes += read as u64;
            summary.end_address = cursor;

            progress.report(read as u64, request.source_length);
        }

        progress.finish();
        debug!("{:?}", summary);
        Ok(summary)
    }

    /// Read back the range written by [`ChunkedWriter::write`] and compare it
    /// against the source.
    pub fn verify<S, P>(&mut self, source: &mut S, request: &WriteRequest, progress: &mut P) -> Result<(), Error>
    where
        S: Source + ?Sized,
        P: Progress + ?Sized,
    {
        info!("verifying {} bytes at {:#x}", request.source_length, request.start_address);
        source.rewind()?;

        let mut expected = vec![0; self.chunk_size.get()];
        let mut found = vec![0; self.chunk_size.get()];
        let mut address = request.start_address;
        let mut remaining = request.source_length;
        let mut chunk = 0;

        while remaining > 0 {
            self.check_cancel(address)?;

            let want = remaining.min(expected.len() as u64) as usize;
            let read = source.fill(&mut expected[..want])?;
            if read == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("source ended {} bytes before {:#x}", remaining, address + remaining),
                )));
            }
            self.read_at(address, &mut found[..read], chunk)?;

            if let Some(i) = (0..read).find(|&i| expected[i] != found[i]) {
                return Err(Error::Verify {
                    address: address + i as u64,
                    expected: expected[i],
                    found: found[i],
                });
            }

            address += read as u64;
            remaining -= read as u64;
            chunk += 1;
            progress.report(read as u64, request.source_length);
        }

        progress.finish();
        Ok(())
    }

    /// Copy `length` bytes starting at `start_address` from the card into
    /// the sink returned by `open`. Without a length, everything up to the
    /// end of the card. `open` is only called once the range is known to
    /// fit, so a failed probe or range check leaves the destination alone.
    pub fn dump<W, F, P>(
        &mut self,
        open: F,
        start_address: u64,
        length: Option<u64>,
        progress: &mut P,
    ) -> Result<Summary, Error>
    where
        W: Write,
        F: FnOnce() -> io::Result<W>,
        P: Progress + ?Sized,
    {
        let capacity = capacity::probe(&mut *self.device)?;
        let length = length.unwrap_or_else(|| capacity.bytes().saturating_sub(start_address));
        let range = validate(start_address, length, capacity)?;
        info!("reading {} bytes at {:#x}", range.len, range.start);

        let mut sink = open()?;

        let mut buf = vec![0; self.chunk_size.get()];
        let mut summary = Summary {
            end_address: range.start,
            ..Summary::default()
        };

        while summary.end_address < range.end() {
            self.check_cancel(summary.end_address)?;

            let want = (range.end() - summary.end_address).min(buf.len() as u64) as usize;
            self.read_at(summary.end_address, &mut buf[..want], summary.chunks)?;
            sink.write_all(&buf[..want])?;

            summary.chunks += 1;
            summary.bytes += want as u64;
            summary.end_address += want as u64;
            progress.report(want as u64, range.len);
        }

        sink.flush()?;
        progress.finish();
        Ok(summary)
    }

    fn read_at(&mut self, address: u64, buf: &mut [u8], chunk: usize) -> Result<(), Error> {
        let mut filled = 0;
        while filled < buf.len() {
            let at = address + filled as u64;
            let read = self
                .device
                .read(at, &mut buf[filled..])
                .map_err(|source| Error::Transfer { address: at, chunk, source })?;
            if read == 0 {
                return Err(Error::Transfer {
                    address: at,
                    chunk,
                    source: DeviceError::OutOfBounds {
                        address: at,
                        len: (buf.len() - filled) as u64,
                    },
                });
            }
            filled += read;
        }
        Ok(())
    }
}
