// SPDX-License-Identifier: MIT

use log::{debug, info};

use crate::{CardFlags, Device, DeviceError, Error};

/// Addressable size of a card in bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Capacity(pub u64);

impl Capacity {
    /// Adapters report capacity in KiB (1024 bytes).
    pub fn from_kib(kib: u64) -> Option<Capacity> {
        kib.checked_mul(1024).map(Capacity)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

/// Ask the card for its size. Any failure here must stop the caller before
/// a single byte is written.
pub fn probe<D: Device + ?Sized>(device: &mut D) -> Result<Capacity, Error> {
    let info = device.probe().map_err(Error::Probe)?;
    debug!("card info: {:?}", info);

    if info.flags.contains(CardFlags::READ_ONLY) {
        return Err(Error::Probe(DeviceError::ReadOnly));
    }

    let capacity = Capacity::from_kib(info.capacity_kib)
        .ok_or(Error::Probe(DeviceError::Status(libc::EOVERFLOW)))?;
    info!("memory card size: {} KiB", info.capacity_kib);
    Ok(capacity)
}
