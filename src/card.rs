// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::unix::fs::{FileExt, FileTypeExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use log::debug;

use crate::block;
use crate::{CardFlags, CardInfo, Device, DeviceError};

// _IOR(0x12, 114, size_t) and _IO(0x12, 94) from <linux/fs.h>, generic
// _IOC layout. The size field follows the target's size_t.
#[cfg(target_os = "linux")]
const BLKGETSIZE64: libc::c_ulong =
    (2 << 30) | ((mem::size_of::<libc::size_t>() as libc::c_ulong) << 16) | (0x12 << 8) | 114;
#[cfg(target_os = "linux")]
const BLKROGET: libc::c_ulong = 0x125e;

/// A memory card exposed to the host as a block device node (a card in an
/// MMC/SD reader) or as a raw card image file.
pub struct Card {
    path: PathBuf,
    file: File,
    /// Bytes, set by the first probe.
    size: Option<u64>,
}

impl Card {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Card, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Card { path, file, size: None })
    }

    /// Open for probing and reading only; every transmit will fail.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Card, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Card { path, file, size: None })
    }

    fn is_block_device(&self) -> Result<bool, DeviceError> {
        Ok(self.file.metadata()?.file_type().is_block_device())
    }

    #[cfg(target_os = "linux")]
    fn block_size(&self) -> Result<(u64, bool), DeviceError> {
        let fd = self.file.as_raw_fd();

        let mut size: u64 = 0;
        if unsafe { libc::ioctl(fd, BLKGETSIZE64 as _, &mut size as *mut u64) } < 0 {
            return Err(status());
        }

        let mut ro: libc::c_int = 0;
        if unsafe { libc::ioctl(fd, BLKROGET as _, &mut ro as *mut libc::c_int) } < 0 {
            return Err(status());
        }

        Ok((size, ro != 0))
    }

    #[cfg(not(target_os = "linux"))]
    fn block_size(&self) -> Result<(u64, bool), DeviceError> {
        Err(DeviceError::Status(libc::ENOTSUP))
    }

    fn size(&mut self) -> Result<u64, DeviceError> {
        match self.size {
            Some(size) => Ok(size),
            None => Ok(self.probe()?.capacity_kib * 1024),
        }
    }

    fn check_bounds(&mut self, address: u64, len: u64) -> Result<u64, DeviceError> {
        let size = self.size()?;
        match address.checked_add(len) {
            Some(end) if end <= size => Ok(end),
            _ => Err(DeviceError::OutOfBounds { address, len }),
        }
    }
}

fn status() -> DeviceError {
    DeviceError::Status(io::Error::last_os_error().raw_os_error().unwrap_or(-1))
}

impl Device for Card {
    fn probe(&mut self) -> Result<CardInfo, DeviceError> {
        let mut flags = CardFlags::empty();
        let bytes = if self.is_block_device()? {
            flags |= CardFlags::BLOCK_DEVICE;
            let (bytes, ro) = self.block_size()?;
            if ro {
                flags |= CardFlags::READ_ONLY;
            }
            bytes
        } else {
            let metadata = self.file.metadata()?;
            if metadata.permissions().readonly() {
                flags |= CardFlags::READ_ONLY;
            }
            metadata.len()
        };

        // Reported in whole KiB; a trailing partial KiB is not addressable.
        let capacity_kib = bytes / 1024;
        self.size = Some(capacity_kib * 1024);
        debug!("{}: {} bytes, {:?}", self.path.display(), bytes, flags);

        Ok(CardInfo { capacity_kib, flags })
    }

    fn transmit(&mut self, data: &[u8], start_addr: u64, keep_existing: bool) -> Result<(), DeviceError> {
        let end = self.check_bounds(start_addr, data.len() as u64)?;
        self.file.write_all_at(data, start_addr)?;

        if !keep_existing {
            let pad = block::remainder(end, self.size()?);
            if !pad.is_empty() {
                let zeros = vec![0; (pad.end - pad.start) as usize];
                self.file.write_all_at(&zeros, pad.start)?;
            }
        }
        Ok(())
    }

    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let size = self.size()?;
        if address >= size {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(size - address) as usize;
        Ok(self.file.read_at(&mut buf[..len], address)?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use super::Card;
    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    use super::BLKGETSIZE64;
    use crate::{CardFlags, Device, DeviceError};

    fn image(len: usize, fill: u8) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![fill; len]).unwrap();
        file.flush().unwrap();
        file
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn size_request_for_64_bit() {
        assert_eq!(BLKGETSIZE64, 0x8008_1272);
    }

    #[test]
    fn probe_image() {
        let img = image(64 * 1024 + 100, 0xFF);
        let mut card = Card::open(img.path()).unwrap();
        let info = card.probe().unwrap();
        assert_eq!(info.capacity_kib, 64);
        assert!(!info.flags.contains(CardFlags::BLOCK_DEVICE));
    }

    #[test]
    fn missing_image_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Card::open(dir.path().join("nope.img")), Err(DeviceError::Io(_))));
    }

    #[test]
    fn zero_fill_rest_of_block() {
        let img = image(4096, 0xFF);
        let mut card = Card::open(img.path()).unwrap();
        card.transmit(&[0xAA; 100], 600, false).unwrap();

        let data = fs::read(img.path()).unwrap();
        assert!(data[..600].iter().all(|&b| b == 0xFF));
        assert!(data[600..700].iter().all(|&b| b == 0xAA));
        assert!(data[700..1024].iter().all(|&b| b == 0x00));
        assert!(data[1024..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn keep_rest_of_block() {
        let img = image(4096, 0xFF);
        let mut card = Card::open(img.path()).unwrap();
        card.transmit(&[0xAA; 100], 600, true).unwrap();

        let data = fs::read(img.path()).unwrap();
        assert!(data[700..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn no_write_past_end() {
        let img = image(2048, 0xFF);
        let mut card = Card::open(img.path()).unwrap();
        assert!(matches!(
            card.transmit(&[0; 100], 2000, true),
            Err(DeviceError::OutOfBounds { address: 2000, len: 100 })
        ));
        assert_eq!(fs::metadata(img.path()).unwrap().len(), 2048);
    }

    #[test]
    fn read_is_clamped() {
        let img = image(2048, 0x5A);
        let mut card = Card::open(img.path()).unwrap();
        let mut buf = [0; 100];
        assert_eq!(card.read(2000, &mut buf).unwrap(), 48);
        assert_eq!(card.read(2048, &mut buf).unwrap(), 0);
        assert!(buf[..48].iter().all(|&b| b == 0x5A));
    }
}
