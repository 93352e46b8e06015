//! Backpressure and run-to-completion driving.
//!
//! The generator itself only knows "ready or not" per cycle
//! ([`AddressGenerator::step_when`]). This module supplies the other side:
//!
//! - [`Consumer`]: something that takes issued cycles and can push back
//! - [`StreamDriver`]: runs a generator to completion against a set of
//!   consumers, stalling whenever *any* of them is not ready
//! - [`CopyConsumer`]: moves data from reader movers to writer movers
//!   through a [`Memory`], the way a reshuffling accelerator would
//! - [`Throttle`]: a sink that only accepts every n-th offered cycle
//!
//! A stall is never an error. The driver can be given a stall limit, which
//! turns an endless stall into [`StreamerError::StallLimitExceeded`]; the
//! generator has no timeout of its own.

use std::collections::VecDeque;

use super::config::EngineConfig;
use super::generator::{AddressGenerator, CycleAddresses, EngineState, Offer};
use super::{Result, StreamerError};
use crate::memory::Memory;

/// Receiver of issued cycles.
pub trait Consumer {
    /// Whether the pending cycle can be accepted now.
    ///
    /// Called once per offered cycle, including stalled ones.
    fn ready(&mut self, _pending: &CycleAddresses) -> bool {
        true
    }

    /// Take an issued cycle.
    fn accept(&mut self, cycle: &CycleAddresses) -> Result<()>;
}

/// Counters collected by [`StreamDriver::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Cycles issued
    pub issued: u64,
    /// Cycles offered but not accepted
    pub stalled: u64,
    /// Longest run of consecutive stalls
    pub longest_stall: u64,
}

/// Runs a generator to completion.
#[derive(Debug, Clone, Default)]
pub struct StreamDriver {
    max_stall_cycles: Option<u64>,
}

impl StreamDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail once more than `limit` consecutive cycles stall.
    pub fn with_stall_limit(mut self, limit: u64) -> Self {
        self.max_stall_cycles = Some(limit);
        self
    }

    /// Issue every remaining cycle of `gen`, starting it if still idle.
    ///
    /// Every consumer is polled for readiness each cycle; the cycle is only
    /// issued when all of them are ready.
    pub fn run(
        &self,
        gen: &mut AddressGenerator,
        consumers: &mut [&mut dyn Consumer],
    ) -> Result<StreamStats> {
        if gen.state() == EngineState::Idle {
            gen.start();
        }

        let mut stats = StreamStats::default();
        let mut streak = 0u64;

        while !gen.is_done() {
            let pending = gen.peek()?;
            let ready = consumers
                .iter_mut()
                .fold(true, |all, c| c.ready(&pending) && all);

            match gen.step_when(ready)? {
                Offer::Stalled(_) => {
                    stats.stalled += 1;
                    streak += 1;
                    stats.longest_stall = stats.longest_stall.max(streak);

                    if let Some(limit) = self.max_stall_cycles {
                        if streak > limit {
                            log::warn!("cycle {} stalled for {} cycles (limit {})",
                                pending.cycle(), streak, limit);
                            return Err(StreamerError::StallLimitExceeded {
                                cycle: pending.cycle(),
                                stalled: streak,
                            });
                        }
                    }
                }
                Offer::Issued(cycle) => {
                    streak = 0;
                    stats.issued += 1;
                    for consumer in consumers.iter_mut() {
                        consumer.accept(&cycle)?;
                    }
                }
            }
        }

        log::debug!("StreamDriver finished: issued={} stalled={} longest_stall={}",
            stats.issued, stats.stalled, stats.longest_stall);

        Ok(stats)
    }
}

/// Consumer that records every issued cycle.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub cycles: Vec<CycleAddresses>,
}

impl Consumer for Recorder {
    fn accept(&mut self, cycle: &CycleAddresses) -> Result<()> {
        self.cycles.push(cycle.clone());
        Ok(())
    }
}

/// Consumer that is ready on every `period`-th poll only.
///
/// A period of 0 or 1 never stalls.
#[derive(Debug, Clone)]
pub struct Throttle {
    period: u64,
    polls: u64,
}

impl Throttle {
    pub fn new(period: u64) -> Self {
        Self { period: period.max(1), polls: 0 }
    }
}

impl Consumer for Throttle {
    fn ready(&mut self, _pending: &CycleAddresses) -> bool {
        self.polls += 1;
        self.polls % self.period == 0
    }

    fn accept(&mut self, _cycle: &CycleAddresses) -> Result<()> {
        Ok(())
    }
}

/// Copies words from reader movers to writer movers through memory.
///
/// Within one cycle every read port is served first, in mover and port
/// order; the k-th write port of the cycle then stores the k-th word read.
/// The configuration must therefore have as many write ports as read ports.
pub struct CopyConsumer<'m, M: Memory> {
    memory: &'m mut M,
    in_flight: VecDeque<u64>,
    words_moved: u64,
}

impl<'m, M: Memory> CopyConsumer<'m, M> {
    pub fn new(config: &EngineConfig, memory: &'m mut M) -> Result<Self> {
        let (mut read_ports, mut write_ports) = (0usize, 0usize);
        for mover in config.movers() {
            if mover.config.direction.is_write() {
                write_ports += mover.config.spatial.ports;
            } else {
                read_ports += mover.config.spatial.ports;
            }
        }

        if read_ports != write_ports {
            return Err(StreamerError::ConfigMismatch {
                what: "write ports per cycle".to_string(),
                expected: read_ports,
                found: write_ports,
            });
        }

        Ok(Self {
            memory,
            in_flight: VecDeque::with_capacity(read_ports),
            words_moved: 0,
        })
    }

    /// Words written so far.
    pub fn words_moved(&self) -> u64 {
        self.words_moved
    }
}

impl<M: Memory> Consumer for CopyConsumer<'_, M> {
    fn accept(&mut self, cycle: &CycleAddresses) -> Result<()> {
        for request in cycle.requests().filter(|r| !r.is_write) {
            if let Some(response) = self.memory.serve(&request, 0)? {
                self.in_flight.push_back(response.data);
            }
        }

        for request in cycle.requests().filter(|r| r.is_write) {
            // Port counts are balanced at construction
            let data = self.in_flight.pop_front().unwrap_or_default();
            self.memory.serve(&request, data)?;
            self.words_moved += 1;
        }

        Ok(())
    }
}
