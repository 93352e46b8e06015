//! Reference model for reshuffle transforms.
//!
//! The oracle computes, from loop bounds and two stride lists, the exact
//! flattened `(src, dst)` pairs a two-mover streamer produces. It shares no
//! code with the generator: indices come from mixed-radix decomposition of
//! a linear counter rather than from an odometer, so agreement between the
//! two is a meaningful check.
//!
//! # Layouts
//!
//! Identity copy, tiled conversion, transposes and broadcast/discard are all
//! plain stride choices:
//!
//! ```text
//! identity    [{n, src 1, dst 1}]
//! transpose   [{rows, src cols, dst 1}, {cols, src 1, dst rows}]
//! 2x2 tiles   [{2, 8, 8}, {2, 2, 4}, {2, 4, 2}, {2, 1, 1}]   (4x4 matrix)
//! broadcast   [{n, src 0, dst 1}]
//! discard     [{n, src 1, dst 0}]   last write wins
//! ```
//!
//! # Usage
//!
//! ```
//! use streamer_agu::oracle::{transform, ReshuffleConfig};
//!
//! let config = ReshuffleConfig::transpose(2, 3);
//! let out = transform(&config, &[0, 1, 2, 3, 4, 5]).unwrap();
//! assert_eq!(out, vec![0, 3, 1, 4, 2, 5]);
//! ```

use serde::{Deserialize, Serialize};

use crate::streamer::loop_nest::iteration_count;
use crate::streamer::{EngineConfig, MoverConfig, MoverId, Result, SpatialConfig, StreamerError};

/// One loop level with its source and destination strides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrideLevel {
    pub bound: u32,
    pub src: i64,
    pub dst: i64,
}

impl StrideLevel {
    pub fn new(bound: u32, src: i64, dst: i64) -> Self {
        Self { bound, src, dst }
    }
}

/// Reshuffle description, outermost level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshuffleConfig {
    #[serde(rename = "nb_elements")]
    pub element_count: u64,
    #[serde(rename = "strides")]
    pub levels: Vec<StrideLevel>,
}

impl ReshuffleConfig {
    pub fn new(element_count: u64, levels: impl Into<Vec<StrideLevel>>) -> Self {
        Self {
            element_count,
            levels: levels.into(),
        }
    }

    /// Straight copy of `n` elements.
    pub fn identity(n: u32) -> Self {
        Self::new(n as u64, [StrideLevel::new(n, 1, 1)])
    }

    /// Row-major `rows x cols` matrix to row-major `cols x rows`.
    pub fn transpose(rows: u32, cols: u32) -> Self {
        Self::new(
            rows as u64 * cols as u64,
            [
                StrideLevel::new(rows, cols as i64, 1),
                StrideLevel::new(cols, 1, rows as i64),
            ],
        )
    }

    pub fn bounds(&self) -> Vec<u32> {
        self.levels.iter().map(|l| l.bound).collect()
    }

    pub fn src_strides(&self) -> Vec<i64> {
        self.levels.iter().map(|l| l.src).collect()
    }

    pub fn dst_strides(&self) -> Vec<i64> {
        self.levels.iter().map(|l| l.dst).collect()
    }

    /// `(src, dst)` pairs of this reshuffle.
    pub fn permute(&self) -> Result<Vec<(i64, i64)>> {
        permute(self.element_count, &self.bounds(), &self.src_strides(), &self.dst_strides())
    }

    /// Equivalent two-mover engine configuration.
    ///
    /// Mover `src` reads from `0`, mover `dst` writes from `dst_base`; both
    /// have one port and strides multiplied by `scale` (address units per
    /// element). Each mover's buffer covers its own region:
    /// `src` in `[0, n*scale)`, `dst` in `[0, dst_base + n*scale)`.
    pub fn to_engine_config(&self, scale: i64, dst_base: i64) -> Result<EngineConfig> {
        let region = (self.element_count as i64).saturating_mul(scale).max(0) as u64;
        let scaled = |strides: Vec<i64>| -> Vec<i64> {
            strides.into_iter().map(|s| s.saturating_mul(scale)).collect()
        };

        let src = MoverConfig::reader(0, scaled(self.src_strides()))
            .with_spatial(SpatialConfig::new(1, 0))
            .with_buffer_len(region);
        let dst = MoverConfig::writer(dst_base, scaled(self.dst_strides()))
            .with_spatial(SpatialConfig::new(1, 0))
            .with_buffer_len((dst_base.max(0) as u64).saturating_add(region));

        EngineConfig::builder(self.element_count)
            .loop_bounds(self.bounds())
            .mover("src", src)
            .mover("dst", dst)
            .build()
    }
}

/// Enumerate `(src, dst)` for every index of the nest, row-major.
///
/// Every address is checked against `[0, element_count)` before anything is
/// returned. A nest whose pair list cannot be allocated fails with
/// [`StreamerError::IterationOverflow`].
pub fn permute(
    element_count: u64,
    loop_bounds: &[u32],
    src_strides: &[i64],
    dst_strides: &[i64],
) -> Result<Vec<(i64, i64)>> {
    for (what, strides) in [("src strides", src_strides), ("dst strides", dst_strides)] {
        if strides.len() != loop_bounds.len() {
            return Err(StreamerError::ConfigMismatch {
                what: what.to_string(),
                expected: loop_bounds.len(),
                found: strides.len(),
            });
        }
    }

    let total = iteration_count(loop_bounds);
    let mut pairs = Vec::new();
    usize::try_from(total)
        .ok()
        .and_then(|n| pairs.try_reserve_exact(n).ok())
        .ok_or(StreamerError::IterationOverflow { iterations: total })?;
    let mut index = vec![0u32; loop_bounds.len()];

    for linear in 0..total {
        let mut rem = linear;
        for (k, &bound) in loop_bounds.iter().enumerate().rev() {
            index[k] = (rem % bound as u128) as u32;
            rem /= bound as u128;
        }

        let cycle = linear as u64;
        let src = checked_address("src", dot(&index, src_strides), element_count, cycle)?;
        let dst = checked_address("dst", dot(&index, dst_strides), element_count, cycle)?;
        pairs.push((src, dst));
    }

    Ok(pairs)
}

fn dot(index: &[u32], strides: &[i64]) -> i128 {
    index
        .iter()
        .zip(strides)
        .map(|(&i, &s)| i as i128 * s as i128)
        .sum()
}

fn checked_address(mover: &str, address: i128, element_count: u64, cycle: u64) -> Result<i64> {
    if address < 0 || address >= element_count as i128 {
        return Err(StreamerError::AddressOutOfRange {
            mover: MoverId::from(mover),
            cycle,
            port: 0,
            address: i64::try_from(address).unwrap_or(if address < 0 { i64::MIN } else { i64::MAX }),
        });
    }
    Ok(address as i64)
}

/// Apply a reshuffle to `input`.
///
/// The output starts as `T::default()` everywhere; `out[dst] = input[src]`
/// is applied in iteration order, so later writes win.
pub fn transform<T: Clone + Default>(config: &ReshuffleConfig, input: &[T]) -> Result<Vec<T>> {
    if input.len() as u64 != config.element_count {
        return Err(StreamerError::InputLengthMismatch {
            expected: usize::try_from(config.element_count).unwrap_or(usize::MAX),
            found: input.len(),
        });
    }

    let pairs = config.permute()?;
    let mut output = vec![T::default(); input.len()];
    for (src, dst) in pairs {
        output[dst as usize] = input[src as usize].clone();
    }
    Ok(output)
}
