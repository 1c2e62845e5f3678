// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::CHUNK_SIZE;

/// Accepts `0x`-prefixed hex or plain decimal.
pub fn parse_address(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|err| format!("invalid address {:?}: {}", s, err))
}

/// Options for writing a file into a card.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteConfig {
    pub start_address: u64,
    pub data_file: PathBuf,
    pub keep_existing: bool,
    pub chunk_size: NonZeroUsize,
    pub verify: bool,
}

impl WriteConfig {
    /// Fails unless `data_file` is a regular file that can be opened for
    /// reading.
    pub fn new<P: Into<PathBuf>>(data_file: P, start_address: u64, keep_existing: bool) -> io::Result<Self> {
        let data_file = data_file.into();
        check_readable(&data_file)?;
        Ok(WriteConfig {
            start_address,
            data_file,
            keep_existing,
            chunk_size: NonZeroUsize::new(CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            verify: false,
        })
    }

    pub fn chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn open(&self) -> io::Result<File> {
        File::open(&self.data_file)
    }
}

/// Options for dumping a range of a card into a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadConfig {
    pub start_address: u64,
    /// Up to the end of the card when unset.
    pub size: Option<u64>,
    pub output: PathBuf,
}

fn check_readable(path: &Path) -> io::Result<()> {
    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }
    Ok(())
}
