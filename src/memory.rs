//! Memory-side interface of the streamer.
//!
//! The streamer only produces the address half of each memory request;
//! data transport belongs to whatever memory sits behind it. This module
//! defines the request/response pair and a [`Memory`] trait for that
//! collaborator, plus [`FlatMemory`], a word-addressed scratchpad used by
//! the driver, the case suite and the tests.
//!
//! # Usage
//!
//! ```
//! use streamer_agu::memory::{FlatMemory, Memory};
//!
//! let mut mem = FlatMemory::from_words(vec![10, 11, 12, 13]);
//! mem.write(0, 99).unwrap();
//! assert_eq!(mem.read(0).unwrap(), 99);
//! assert!(mem.read(4).is_err());
//! ```

use crate::streamer::{MoverId, Result, StreamerError};

/// One port's request in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRequest {
    /// Issuing mover
    pub mover: MoverId,
    /// Spatial port of the mover
    pub port: usize,
    /// Word address
    pub address: i64,
    /// Write (true) or read (false)
    pub is_write: bool,
}

/// Response to a read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryResponse {
    pub data: u64,
}

/// Word-addressed memory behind the movers.
pub trait Memory {
    /// Read one word.
    fn read(&mut self, address: i64) -> Result<u64>;

    /// Write one word.
    fn write(&mut self, address: i64, data: u64) -> Result<()>;

    /// Serve a request. Reads return the word; writes store `data` and
    /// return nothing.
    fn serve(&mut self, request: &MemoryRequest, data: u64) -> Result<Option<MemoryResponse>> {
        if request.is_write {
            self.write(request.address, data)?;
            Ok(None)
        } else {
            let data = self.read(request.address)?;
            Ok(Some(MemoryResponse { data }))
        }
    }
}

/// Flat vector of 64-bit words.
#[derive(Debug, Clone, Default)]
pub struct FlatMemory {
    words: Vec<u64>,
    reads: u64,
    writes: u64,
}

impl FlatMemory {
    /// Zero-filled memory of `size` words.
    pub fn new(size: usize) -> Self {
        Self::from_words(vec![0; size])
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words, reads: 0, writes: 0 }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Copy `data` into memory starting at `base`.
    pub fn load(&mut self, base: usize, data: &[u64]) -> Result<()> {
        let end = base.checked_add(data.len()).filter(|&end| end <= self.words.len());
        match end {
            Some(end) => {
                self.words[base..end].copy_from_slice(data);
                Ok(())
            }
            None => Err(StreamerError::MemoryOutOfRange {
                address: base.saturating_add(data.len()) as i64 - 1,
                size: self.words.len(),
            }),
        }
    }

    /// `len` words starting at `base`.
    pub fn slice(&self, base: usize, len: usize) -> Option<&[u64]> {
        self.words.get(base..base.checked_add(len)?)
    }

    /// Reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Writes served so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn offset(&self, address: i64) -> Result<usize> {
        usize::try_from(address)
            .ok()
            .filter(|&offset| offset < self.words.len())
            .ok_or(StreamerError::MemoryOutOfRange {
                address,
                size: self.words.len(),
            })
    }
}

impl Memory for FlatMemory {
    fn read(&mut self, address: i64) -> Result<u64> {
        let offset = self.offset(address)?;
        self.reads += 1;
        Ok(self.words[offset])
    }

    fn write(&mut self, address: i64, data: u64) -> Result<()> {
        let offset = self.offset(address)?;
        self.writes += 1;
        self.words[offset] = data;
        Ok(())
    }
}
