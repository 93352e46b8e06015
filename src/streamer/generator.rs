//! The multi-mover address generator.
//!
//! Composes the shared [`LoopNest`] with every mover's address formula.
//! Each cycle produces one [`AddressVector`] per mover from the *same*
//! temporal index, then advances the nest once, so movers can never drift
//! relative to each other.
//!
//! # State Machine
//!
//! ```text
//!            start()                    last index issued
//!   Idle ─────────────► Running ───────────────────────────► Done
//!                        │   ▲                                 │
//!                        └───┘ step() / step_when()            │
//!                                                              │
//!   Done ◄─────────────── start() with a zero bound            │
//!   Running ◄──────────── start() ─────────────────────────────┘
//! ```
//!
//! # Validation
//!
//! Every address of the full run is range-checked in [`AddressGenerator::new`],
//! before anything is issued. The check is analytic (per-level min/max), and
//! the run is only enumerated to pinpoint the first offending cycle and port
//! when the analytic range is violated.

use super::config::EngineConfig;
use super::loop_nest::LoopNest;
use super::mover::{AddressVector, Direction, MoverConfig, MoverId};
use super::{Result, StreamerError};
use crate::memory::MemoryRequest;

/// Lifecycle of an address generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Configured, not started
    #[default]
    Idle,
    /// Issuing addresses
    Running,
    /// Every index issued
    Done,
}

/// Addresses of one mover in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoverAddresses {
    pub mover: MoverId,
    pub direction: Direction,
    pub addresses: AddressVector,
}

/// Everything issued in one temporal cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleAddresses {
    cycle: u64,
    index: Vec<u32>,
    movers: Vec<MoverAddresses>,
}

impl CycleAddresses {
    /// Cycle number, starting at 0 after `start()`.
    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Shared temporal multi-index, outermost first.
    #[inline]
    pub fn index(&self) -> &[u32] {
        &self.index
    }

    /// Per-mover addresses in mover order.
    #[inline]
    pub fn movers(&self) -> &[MoverAddresses] {
        &self.movers
    }

    /// Address vector of one mover.
    pub fn vector(&self, mover: &str) -> Option<&AddressVector> {
        self.movers
            .iter()
            .find(|m| m.mover.as_str() == mover)
            .map(|m| &m.addresses)
    }

    /// Memory requests for this cycle, one per mover port.
    pub fn requests(&self) -> impl Iterator<Item = MemoryRequest> + '_ {
        self.movers.iter().flat_map(|m| {
            m.addresses.iter().enumerate().map(move |(port, address)| MemoryRequest {
                mover: m.mover.clone(),
                port,
                address,
                is_write: m.direction.is_write(),
            })
        })
    }
}

/// Outcome of offering a cycle to the consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// Consumers accepted; the loop nest advanced
    Issued(CycleAddresses),
    /// Consumers not ready; the same addresses will be offered again
    Stalled(CycleAddresses),
}

impl Offer {
    #[inline]
    pub fn is_issued(&self) -> bool {
        matches!(self, Offer::Issued(_))
    }

    pub fn addresses(&self) -> &CycleAddresses {
        match self {
            Offer::Issued(a) | Offer::Stalled(a) => a,
        }
    }

    pub fn into_addresses(self) -> CycleAddresses {
        match self {
            Offer::Issued(a) | Offer::Stalled(a) => a,
        }
    }
}

/// Address generator for a set of lock-stepped movers.
#[derive(Debug, Clone)]
pub struct AddressGenerator {
    config: EngineConfig,
    nest: LoopNest,
    state: EngineState,
    /// Cycles issued since start
    cycle: u64,
}

impl AddressGenerator {
    /// Create a generator, range-checking the whole run up front.
    pub fn new(config: EngineConfig) -> Result<Self> {
        validate_ranges(&config)?;

        let nest = LoopNest::new(config.loop_bounds().to_vec());
        log::debug!(
            "AddressGenerator::new bounds={:?} iterations={} movers={}",
            nest.bounds(), nest.iteration_count(), config.movers().len()
        );

        Ok(Self {
            config,
            nest,
            state: EngineState::Idle,
            cycle: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == EngineState::Done
    }

    /// Cycles issued since the last `start()`.
    #[inline]
    pub fn cycles_issued(&self) -> u64 {
        self.cycle
    }

    /// Cycles left to issue. Before `start()` this is the full run.
    pub fn remaining(&self) -> u128 {
        match self.state {
            EngineState::Idle => self.nest.iteration_count(),
            EngineState::Running => self.nest.remaining(),
            EngineState::Done => 0,
        }
    }

    /// Reset the loop nest and begin issuing.
    ///
    /// May be called again after `Done` to replay the same run.
    pub fn start(&mut self) {
        self.nest.reset();
        self.cycle = 0;
        self.state = if self.nest.is_done() {
            EngineState::Done
        } else {
            EngineState::Running
        };
        log::debug!("AddressGenerator start: state={:?} iterations={}",
            self.state, self.nest.iteration_count());
    }

    /// Issue one cycle. Equivalent to `step_when(true)`.
    pub fn step(&mut self) -> Result<CycleAddresses> {
        self.step_when(true).map(Offer::into_addresses)
    }

    /// Offer the pending cycle; advance only when `ready`.
    ///
    /// A stalled offer leaves the generator untouched, so repeated stalls
    /// return identical addresses.
    pub fn step_when(&mut self, ready: bool) -> Result<Offer> {
        let addresses = self.peek()?;

        if !ready {
            log::trace!("cycle {} stalled at index {:?}", self.cycle, addresses.index());
            return Ok(Offer::Stalled(addresses));
        }

        log::trace!("cycle {} issued at index {:?}", self.cycle, addresses.index());
        self.nest.advance();
        self.cycle += 1;

        if self.nest.is_done() {
            self.state = EngineState::Done;
            log::debug!("AddressGenerator done after {} cycles", self.cycle);
        }

        Ok(Offer::Issued(addresses))
    }

    /// Addresses of the pending cycle, without advancing.
    pub fn peek(&self) -> Result<CycleAddresses> {
        match self.state {
            EngineState::Idle => Err(StreamerError::NotStarted),
            EngineState::Done => Err(StreamerError::EngineExhausted),
            EngineState::Running => Ok(self.current_addresses()),
        }
    }

    fn current_addresses(&self) -> CycleAddresses {
        let index = self.nest.current_index();
        let movers = self
            .config
            .movers()
            .iter()
            .map(|m| MoverAddresses {
                mover: m.id.clone(),
                direction: m.config.direction,
                addresses: m.config.address_vector(index),
            })
            .collect();

        CycleAddresses {
            cycle: self.cycle,
            index: index.to_vec(),
            movers,
        }
    }

    /// Iterate over a fresh run of this configuration.
    pub fn iter(&self) -> CycleIterator {
        let mut generator = self.clone();
        generator.start();
        CycleIterator { generator }
    }
}

/// Iterator over every cycle of a run.
#[derive(Debug)]
pub struct CycleIterator {
    generator: AddressGenerator,
}

impl Iterator for CycleIterator {
    type Item = CycleAddresses;

    fn next(&mut self) -> Option<Self::Item> {
        self.generator.step().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.generator.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CycleIterator {}

/// Check that no mover ever leaves `[0, limit)`.
fn validate_ranges(config: &EngineConfig) -> Result<()> {
    let bounds = config.loop_bounds();
    if bounds.iter().any(|&b| b == 0) {
        return Ok(());
    }

    for mover in config.movers() {
        let limit = config.limit(&mover.config);
        let (lo, hi) = mover.config.address_range(bounds);

        // Inside this range no partial sum can overflow an i64 either
        if lo >= 0 && hi < limit as i128 {
            continue;
        }

        return Err(first_violation(&mover.id, &mover.config, bounds, limit));
    }

    Ok(())
}

/// Locate the first cycle and port whose address leaves `[0, limit)`.
///
/// Only called once the analytic range is known to be violated. The
/// analytic extremes are reached by actual indices, so the walk always
/// finds one.
fn first_violation(id: &MoverId, mover: &MoverConfig, bounds: &[u32], limit: u64) -> StreamerError {
    let mut nest = LoopNest::new(bounds.to_vec());
    let mut cycle = 0u64;

    while !nest.is_done() {
        let origin = mover
            .temporal_strides
            .iter()
            .zip(nest.current_index())
            .fold(mover.base as i128, |addr, (&s, &i)| addr + s as i128 * i as i128);

        for port in 0..mover.spatial.ports {
            let address = origin + port as i128 * mover.spatial.stride as i128;
            if address < 0 || address >= limit as i128 {
                log::warn!("mover `{}` leaves its buffer at cycle {} port {}: {} not in [0, {})",
                    id, cycle, port, address, limit);
                return StreamerError::AddressOutOfRange {
                    mover: id.clone(),
                    cycle,
                    port,
                    address: saturate(address),
                };
            }
        }

        nest.advance();
        cycle += 1;
    }

    // Unreachable for a non-empty nest; report the analytic extreme instead
    let (lo, hi) = mover.address_range(bounds);
    StreamerError::AddressOutOfRange {
        mover: id.clone(),
        cycle: 0,
        port: 0,
        address: saturate(if lo < 0 { lo } else { hi }),
    }
}

/// Narrow an out-of-range address for reporting.
fn saturate(address: i128) -> i64 {
    i64::try_from(address).unwrap_or(if address < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::config::CoveragePolicy;
    use crate::streamer::mover::SpatialConfig;

    /// Basic streamer: readers A and B and writer C, 4 ports each.
    fn basic_streamer(loop_count: u32) -> EngineConfig {
        let spatial = SpatialConfig::new(4, 8);
        EngineConfig::builder(256)
            .loop_bounds([loop_count])
            .mover("a", MoverConfig::reader(0, [2]).with_spatial(spatial))
            .mover("b", MoverConfig::reader(32, [2]).with_spatial(spatial))
            .mover("c", MoverConfig::writer(64, [2]).with_spatial(spatial))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap()
    }

    fn two_level(src: [i64; 2], dst: [i64; 2]) -> EngineConfig {
        EngineConfig::builder(16)
            .loop_bounds([2, 8])
            .mover("src", MoverConfig::reader(0, src))
            .mover("dst", MoverConfig::writer(0, dst))
            .build()
            .unwrap()
    }

    #[test]
    fn test_basic_streamer_golden_list() {
        let mut gen = AddressGenerator::new(basic_streamer(20)).unwrap();
        gen.start();

        for i in 0..20i64 {
            let cycle = gen.step().unwrap();
            for (mover, base) in [("a", 0i64), ("b", 32), ("c", 64)] {
                let expected: Vec<i64> = (0..4).map(|j| base + j * 8 + i * 2).collect();
                assert_eq!(cycle.vector(mover).unwrap().as_slice(), expected.as_slice());
            }
        }
        assert!(gen.is_done());
    }

    #[test]
    fn test_step_counts_product_of_bounds() {
        for (bounds, strides) in [
            (vec![3u32], vec![1i64]),
            (vec![2, 3, 2], vec![6, 2, 1]),
            (vec![4, 1, 3], vec![0, 0, 0]),
        ] {
            let elements: u32 = bounds.iter().product();
            let config = EngineConfig::builder(elements as u64)
                .loop_bounds(bounds.clone())
                .mover("m", MoverConfig::reader(0, strides))
                .build()
                .unwrap();

            let mut gen = AddressGenerator::new(config).unwrap();
            gen.start();
            let mut steps = 0u32;
            while !gen.is_done() {
                gen.step().unwrap();
                steps += 1;
            }
            assert_eq!(steps, elements, "bounds {:?}", bounds);
        }
    }

    #[test]
    fn test_movers_share_index() {
        let mut gen = AddressGenerator::new(two_level([1, 2], [8, 1])).unwrap();
        gen.start();

        let mut expected = LoopNest::new([2, 8]);
        while !gen.is_done() {
            let cycle = gen.step().unwrap();
            assert_eq!(cycle.index(), expected.current_index());
            let index = cycle.index();
            let src = cycle.vector("src").unwrap().port(0).unwrap();
            let dst = cycle.vector("dst").unwrap().port(0).unwrap();
            assert_eq!(src, index[0] as i64 + 2 * index[1] as i64);
            assert_eq!(dst, 8 * index[0] as i64 + index[1] as i64);
            expected.advance();
        }
    }

    #[test]
    fn test_not_started_and_exhausted() {
        let mut gen = AddressGenerator::new(two_level([1, 2], [8, 1])).unwrap();
        assert_eq!(gen.step().unwrap_err(), StreamerError::NotStarted);

        gen.start();
        for _ in 0..16 {
            gen.step().unwrap();
        }
        assert_eq!(gen.state(), EngineState::Done);
        assert_eq!(gen.step().unwrap_err(), StreamerError::EngineExhausted);
        assert_eq!(gen.step().unwrap_err(), StreamerError::EngineExhausted);
    }

    #[test]
    fn test_restart_replays_run() {
        let mut gen = AddressGenerator::new(two_level([1, 2], [8, 1])).unwrap();
        let first: Vec<_> = gen.iter().collect();

        gen.start();
        gen.step().unwrap();
        gen.start();
        let mut second = Vec::new();
        while !gen.is_done() {
            second.push(gen.step().unwrap());
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_bound_run() {
        let config = EngineConfig::builder(16)
            .loop_bounds([4, 0])
            .mover("m", MoverConfig::reader(1000, [1, 1]))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();

        let mut gen = AddressGenerator::new(config).unwrap();
        assert_eq!(gen.remaining(), 0);
        gen.start();
        assert_eq!(gen.state(), EngineState::Done);
        assert_eq!(gen.step().unwrap_err(), StreamerError::EngineExhausted);
        assert_eq!(gen.iter().count(), 0);
    }

    #[test]
    fn test_out_of_range_detected_before_start() {
        // Writer reaches 8*1 + 1*8 = 16 on its last cycle
        let config = EngineConfig::builder(16)
            .loop_bounds([2, 9])
            .mover("src", MoverConfig::reader(0, [0, 1]))
            .mover("dst", MoverConfig::writer(0, [8, 1]))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();

        let err = AddressGenerator::new(config).unwrap_err();
        assert_eq!(err, StreamerError::AddressOutOfRange {
            mover: MoverId::from("dst"),
            cycle: 17,
            port: 0,
            address: 16,
        });
    }

    #[test]
    fn test_negative_address_detected() {
        let config = EngineConfig::builder(16)
            .loop_bounds([4])
            .mover("m", MoverConfig::reader(2, [-1]))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();

        let err = AddressGenerator::new(config).unwrap_err();
        assert_eq!(err, StreamerError::AddressOutOfRange {
            mover: MoverId::from("m"),
            cycle: 3,
            port: 0,
            address: -1,
        });
    }

    #[test]
    fn test_spatial_port_out_of_range() {
        let config = EngineConfig::builder(64)
            .loop_bounds([2])
            .mover("m", MoverConfig::reader(0, [8]).with_spatial(SpatialConfig::new(4, 16)))
            .mover("ok", MoverConfig::reader(0, [0]))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();

        // Highest address is port 3 of cycle 1: 8 + 3*16 = 56
        assert!(AddressGenerator::new(config).is_ok());

        let config = EngineConfig::builder(56)
            .loop_bounds([2])
            .mover("m", MoverConfig::reader(0, [8]).with_spatial(SpatialConfig::new(4, 16)))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();
        let err = AddressGenerator::new(config).unwrap_err();
        assert_eq!(err, StreamerError::AddressOutOfRange {
            mover: MoverId::from("m"),
            cycle: 1,
            port: 3,
            address: 56,
        });
    }

    #[test]
    fn test_per_mover_buffer_len() {
        let config = EngineConfig::builder(64)
            .loop_bounds([8])
            .mover("m", MoverConfig::reader(0, [1]).with_buffer_len(4))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();

        let err = AddressGenerator::new(config).unwrap_err();
        assert!(matches!(err, StreamerError::AddressOutOfRange { cycle: 4, address: 4, .. }));
    }

    #[test]
    fn test_stall_keeps_pending_cycle() {
        let mut gen = AddressGenerator::new(two_level([1, 2], [8, 1])).unwrap();
        gen.start();
        gen.step().unwrap();

        let pending = gen.peek().unwrap();
        for _ in 0..5 {
            let offer = gen.step_when(false).unwrap();
            assert!(!offer.is_issued());
            assert_eq!(offer.addresses(), &pending);
        }
        assert_eq!(gen.cycles_issued(), 1);

        let offer = gen.step_when(true).unwrap();
        assert!(offer.is_issued());
        assert_eq!(offer.into_addresses(), pending);
        assert_eq!(gen.cycles_issued(), 2);
        assert_ne!(gen.peek().unwrap().index(), pending.index());
    }

    #[test]
    fn test_stall_after_done_is_exhausted() {
        let config = EngineConfig::builder(1)
            .loop_bounds([1])
            .mover("m", MoverConfig::reader(0, [1]))
            .build()
            .unwrap();
        let mut gen = AddressGenerator::new(config).unwrap();
        gen.start();
        gen.step().unwrap();
        assert_eq!(gen.step_when(false).unwrap_err(), StreamerError::EngineExhausted);
    }

    #[test]
    fn test_requests() {
        let mut gen = AddressGenerator::new(basic_streamer(1)).unwrap();
        gen.start();
        let cycle = gen.step().unwrap();
        let requests: Vec<MemoryRequest> = cycle.requests().collect();

        assert_eq!(requests.len(), 12);
        assert!(requests[..8].iter().all(|r| !r.is_write));
        assert!(requests[8..].iter().all(|r| r.is_write));
        assert_eq!(requests[9].mover.as_str(), "c");
        assert_eq!(requests[9].port, 1);
        assert_eq!(requests[9].address, 72);
    }

    #[test]
    fn test_iterator_len() {
        let gen = AddressGenerator::new(basic_streamer(20)).unwrap();
        let iter = gen.iter();
        assert_eq!(iter.len(), 20);
        assert_eq!(gen.state(), EngineState::Idle);
        assert_eq!(gen.remaining(), 20);
    }
}
