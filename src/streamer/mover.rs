//! Movers: independent address streams sharing one loop nest.
//!
//! A mover turns the shared multi-index into addresses with its own base
//! pointer, one temporal stride per loop level and a spatial unrolling:
//!
//! ```text
//! addr(index, p) = base + Σ_k index[k] * temporal[k] + p * spatial_stride
//!                                                      p in 0..ports
//! ```
//!
//! Strides may be negative (reverse traversal) or zero (broadcast along that
//! level). Range checking happens once, when the generator is built.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::INLINE_PORTS;

/// Name of a mover (e.g. `"a"`, `"b"`, `"c"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoverId(String);

impl MoverId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MoverId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MoverId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for MoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data direction of a mover, as seen from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Memory to stream (reader)
    Read,
    /// Stream to memory (writer)
    Write,
}

impl Direction {
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, Direction::Write)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Spatial unrolling of one mover: `ports` addresses per cycle, `stride` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Parallel memory ports driven each cycle
    pub ports: usize,

    /// Address delta between neighbouring ports
    pub stride: i64,
}

impl SpatialConfig {
    pub fn new(ports: usize, stride: i64) -> Self {
        Self { ports, stride }
    }

    /// One port, no spatial offset.
    pub fn single() -> Self {
        Self::new(1, 0)
    }

    /// Lowest and highest port offset, relative to the temporal address.
    pub(crate) fn offset_range(&self) -> (i128, i128) {
        let span = self.stride as i128 * self.ports.saturating_sub(1) as i128;
        (span.min(0), span.max(0))
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self::single()
    }
}

/// Address pattern of one mover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoverConfig {
    /// Base pointer
    pub base: i64,

    /// Temporal stride per loop level, outermost first
    pub temporal_strides: Vec<i64>,

    /// Spatial unrolling
    #[serde(default)]
    pub spatial: SpatialConfig,

    /// Read or write stream
    pub direction: Direction,

    /// Declared buffer length; the engine element count applies when unset
    #[serde(default)]
    pub buffer_len: Option<u64>,
}

impl MoverConfig {
    /// Create a mover with a single port.
    pub fn new(direction: Direction, base: i64, temporal_strides: impl Into<Vec<i64>>) -> Self {
        Self {
            base,
            temporal_strides: temporal_strides.into(),
            spatial: SpatialConfig::single(),
            direction,
            buffer_len: None,
        }
    }

    /// Single-port reader.
    pub fn reader(base: i64, temporal_strides: impl Into<Vec<i64>>) -> Self {
        Self::new(Direction::Read, base, temporal_strides)
    }

    /// Single-port writer.
    pub fn writer(base: i64, temporal_strides: impl Into<Vec<i64>>) -> Self {
        Self::new(Direction::Write, base, temporal_strides)
    }

    /// Replace the spatial unrolling.
    pub fn with_spatial(mut self, spatial: SpatialConfig) -> Self {
        self.spatial = spatial;
        self
    }

    /// Restrict this mover to its own buffer of `len` elements.
    pub fn with_buffer_len(mut self, len: u64) -> Self {
        self.buffer_len = Some(len);
        self
    }

    /// Address of the temporal index on port 0.
    ///
    /// The caller guarantees `index.len() == temporal_strides.len()`.
    #[inline]
    pub fn temporal_address(&self, index: &[u32]) -> i64 {
        self.temporal_strides
            .iter()
            .zip(index)
            .fold(self.base, |addr, (&stride, &i)| addr + i as i64 * stride)
    }

    /// All port addresses for one temporal index.
    pub fn address_vector(&self, index: &[u32]) -> AddressVector {
        let origin = self.temporal_address(index);
        let addrs = (0..self.spatial.ports)
            .map(|p| origin + p as i64 * self.spatial.stride)
            .collect();
        AddressVector { addrs }
    }

    /// Smallest and largest address over a loop nest with the given bounds.
    ///
    /// Evaluated in `i128` so that no stride/bound combination overflows.
    /// Only meaningful when no bound is zero.
    pub(crate) fn address_range(&self, bounds: &[u32]) -> (i128, i128) {
        let mut lo = self.base as i128;
        let mut hi = self.base as i128;

        for (&stride, &bound) in self.temporal_strides.iter().zip(bounds) {
            let span = stride as i128 * (bound as i128 - 1);
            lo += span.min(0);
            hi += span.max(0);
        }

        let (spatial_lo, spatial_hi) = self.spatial.offset_range();
        (lo + spatial_lo, hi + spatial_hi)
    }
}

/// Addresses issued by one mover in one cycle, one per spatial port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressVector {
    addrs: SmallVec<[i64; INLINE_PORTS]>,
}

impl AddressVector {
    pub fn as_slice(&self) -> &[i64] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn port(&self, port: usize) -> Option<i64> {
        self.addrs.get(port).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.addrs.iter().copied()
    }
}

impl From<Vec<i64>> for AddressVector {
    fn from(addrs: Vec<i64>) -> Self {
        Self { addrs: SmallVec::from_vec(addrs) }
    }
}
