// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Bytes to be written to a card.
pub trait Source {
    fn size(&self) -> io::Result<u64>;

    /// Read up to `buf.len()` bytes. Zero means the source is exhausted.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Start over from the first byte.
    fn rewind(&mut self) -> io::Result<()>;

    /// Fill `buf` as far as the source allows, retrying short and
    /// interrupted reads. Only a short return means end of data.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

impl Source for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

impl<T: AsRef<[u8]>> Source for Cursor<T> {
    fn size(&self) -> io::Result<u64> {
        Ok(self.get_ref().as_ref().len() as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.set_position(0);
        Ok(())
    }
}
