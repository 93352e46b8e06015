//! Streamer address generation.
//!
//! This module implements the address-generation side of a data streamer:
//! a set of movers (independent read/write streams) that share one nested
//! loop and each turn the loop's multi-index into memory addresses.
//!
//! - Loop nest / odometer (shared temporal iteration)
//! - Movers with temporal strides, spatial unrolling and base pointers
//! - The address generator state machine (Idle -> Running -> Done)
//! - Backpressure-aware driving of the generator
//! - The control register file that programs all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Streamer                           │
//! │  ┌───────────────────────┐   start   ┌─────────────────┐  │
//! │  │  ControlRegisterFile  │ ────────► │ AddressGenerator│  │
//! │  │  bounds/strides/base  │  decode   │  ┌───────────┐  │  │
//! │  └───────────────────────┘           │  │ LoopNest  │  │  │
//! │                                      │  └─────┬─────┘  │  │
//! │                                      │  index │ shared │  │
//! │                       ┌──────────────┼────────┼────────┤  │
//! │                       ▼              ▼        ▼        │  │
//! │                   Mover A        Mover B   Mover C     │  │
//! │                  (4 ports)      (4 ports) (4 ports)    │  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Loop Order
//!
//! Loop levels are always listed outermost first: the last level is the
//! innermost and varies fastest. The hardware register map numbers levels
//! the other way round (level 0 innermost); [`csr::ControlRegisterFile`]
//! converts when decoding.
//!
//! # Usage
//!
//! ```
//! use streamer_agu::streamer::{AddressGenerator, EngineConfig, MoverConfig, SpatialConfig};
//!
//! let config = EngineConfig::builder(64)
//!     .loop_bounds([2, 4])
//!     .mover("a", MoverConfig::reader(0, [16, 1]))
//!     .mover("c", MoverConfig::writer(32, [1, 2]).with_spatial(SpatialConfig::new(2, 8)))
//!     .build()
//!     .unwrap();
//!
//! let mut gen = AddressGenerator::new(config).unwrap();
//! gen.start();
//! let cycle = gen.step().unwrap();
//! assert_eq!(cycle.vector("c").unwrap().as_slice(), &[32, 40]);
//! ```

pub mod loop_nest;
pub mod mover;
pub mod config;
pub mod generator;
pub mod flow;
pub mod csr;
pub mod top;

pub use loop_nest::LoopNest;
pub use mover::{AddressVector, Direction, MoverConfig, MoverId, SpatialConfig};
pub use config::{Coverage, CoveragePolicy, EngineConfig, EngineConfigBuilder, Mover};
pub use generator::{AddressGenerator, CycleAddresses, EngineState, Offer};
pub use flow::{Consumer, StreamDriver, StreamStats, Throttle};
pub use csr::{ControlRegisterFile, MoverShape, RegisterField, RegisterLayout, RegisterWrite};
pub use top::Streamer;

use thiserror::Error;

/// Default control register width in bits.
pub const DEFAULT_REGISTER_WIDTH: u32 = 32;

/// Inline capacity of an [`AddressVector`] before it spills to the heap.
pub const INLINE_PORTS: usize = 8;

/// Errors raised by the streamer and the reference model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamerError {
    /// Shape disagreement between loop bounds and stride lists.
    #[error("config mismatch: {what} has {found} entries, expected {expected}")]
    ConfigMismatch {
        /// What was being checked.
        what: String,
        /// Number of entries expected.
        expected: usize,
        /// Number of entries found.
        found: usize,
    },

    /// A configuration mover does not fit the register layout slot it lands in.
    #[error("mover slot {slot} is `{expected}` in the register layout, found {found}")]
    MoverMismatch {
        /// Position in the layout's mover list.
        slot: usize,
        /// Mover the layout declares at that slot.
        expected: MoverId,
        /// What the configuration holds there.
        found: String,
    },

    /// The loop nest has more indices than can be enumerated in memory.
    #[error("loop nest of {iterations} indices is too large to enumerate")]
    IterationOverflow {
        /// Product of all loop bounds, saturated at `u128::MAX`.
        iterations: u128,
    },

    /// A computed address falls outside the mover's buffer.
    #[error("address {address} out of range for mover `{mover}` at cycle {cycle}, port {port}")]
    AddressOutOfRange {
        /// Offending mover.
        mover: MoverId,
        /// Temporal cycle at which the address is generated.
        cycle: u64,
        /// Spatial port.
        port: usize,
        /// The computed address.
        address: i64,
    },

    /// `step()` called after the loop nest completed.
    #[error("address generator exhausted")]
    EngineExhausted,

    /// `step()` called before `start()`.
    #[error("address generator not started")]
    NotStarted,

    /// An engine needs at least one mover.
    #[error("engine has no movers")]
    NoMovers,

    /// A mover was declared with zero spatial ports.
    #[error("mover `{mover}` has zero spatial ports")]
    ZeroPorts {
        /// Offending mover.
        mover: MoverId,
    },

    /// Two movers share the same id.
    #[error("duplicate mover `{0}`")]
    DuplicateMover(MoverId),

    /// Iteration count differs from the declared element count under a
    /// rejecting coverage policy.
    #[error("loop nest visits {iterations} indices but {element_count} elements are declared")]
    CoverageMismatch {
        /// Product of all loop bounds.
        iterations: u128,
        /// Declared element count.
        element_count: u64,
    },

    /// Register address outside the register file.
    #[error("invalid register address {0}")]
    InvalidRegister(u32),

    /// A register holds a value its field cannot represent.
    #[error("register {address} value 0x{value:X} does not fit its field")]
    RegisterValue {
        /// Register address.
        address: u32,
        /// Stored value.
        value: u64,
    },

    /// Input buffer length differs from the declared element count.
    #[error("input has {found} elements, expected {expected}")]
    InputLengthMismatch {
        /// Declared element count.
        expected: usize,
        /// Actual input length.
        found: usize,
    },

    /// Memory access outside the backing store.
    #[error("memory access at {address} outside {size} words")]
    MemoryOutOfRange {
        /// Requested address.
        address: i64,
        /// Memory size in words.
        size: usize,
    },

    /// A consumer stayed not-ready for longer than the driver allows.
    #[error("stall limit exceeded at cycle {cycle} after {stalled} stalled cycles")]
    StallLimitExceeded {
        /// Cycle that could not be issued.
        cycle: u64,
        /// Consecutive stalled cycles.
        stalled: u64,
    },
}

/// Result alias for streamer operations.
pub type Result<T> = std::result::Result<T, StreamerError>;
