// SPDX-License-Identifier: MIT

use std::io;

use crate::block;
use crate::{CardFlags, CardInfo, Device, DeviceError};

/// In-memory card that records every transmit.
pub struct FakeCard {
    pub data: Vec<u8>,
    pub flags: CardFlags,
    pub probe_status: Option<i32>,
    /// Fail the transmit with this index (zero based).
    pub fail_on: Option<usize>,
    /// `(start_addr, len, keep_existing)` per successful transmit.
    pub transmits: Vec<(u64, usize, bool)>,
}

impl FakeCard {
    pub fn new(capacity: usize) -> Self {
        FakeCard {
            data: vec![0xFF; capacity],
            flags: CardFlags::empty(),
            probe_status: None,
            fail_on: None,
            transmits: Vec::new(),
        }
    }
}

impl Device for FakeCard {
    fn probe(&mut self) -> Result<CardInfo, DeviceError> {
        if let Some(status) = self.probe_status {
            return Err(DeviceError::Status(status));
        }
        Ok(CardInfo {
            capacity_kib: self.data.len() as u64 / 1024,
            flags: self.flags,
        })
    }

    fn transmit(&mut self, data: &[u8], start_addr: u64, keep_existing: bool) -> Result<(), DeviceError> {
        if self.fail_on == Some(self.transmits.len()) {
            return Err(DeviceError::Io(io::Error::new(io::ErrorKind::TimedOut, "no answer from adapter")));
        }
        let start = start_addr as usize;
        let end = start + data.len();
        if end > self.data.len() {
            return Err(DeviceError::OutOfBounds { address: start_addr, len: data.len() as u64 });
        }
        self.data[start..end].copy_from_slice(data);
        if !keep_existing {
            let pad = block::remainder(end as u64, self.data.len() as u64);
            for byte in &mut self.data[pad.start as usize..pad.end as usize] {
                *byte = 0;
            }
        }
        self.transmits.push((start_addr, data.len(), keep_existing));
        Ok(())
    }

    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let start = (address as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}
