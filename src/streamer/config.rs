//! Engine configuration and its validating builder.
//!
//! An [`EngineConfig`] can only be obtained from [`EngineConfigBuilder::build`],
//! which rejects malformed shapes up front:
//!
//! - at least one mover, with unique ids
//! - at least one spatial port per mover
//! - one temporal stride per loop level for every mover
//!
//! Address ranges are checked later by the generator, which knows the full
//! run. Coverage (loop iterations vs. declared elements) is checked here
//! according to the builder's [`CoveragePolicy`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::loop_nest;
use super::mover::{MoverConfig, MoverId};
use super::{Result, StreamerError};

/// What to do when the loop nest does not visit exactly `element_count`
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoveragePolicy {
    /// Accept silently
    Allow,
    /// Accept and log a warning
    #[default]
    Warn,
    /// Reject with [`StreamerError::CoverageMismatch`]
    Reject,
}

impl FromStr for CoveragePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(CoveragePolicy::Allow),
            "warn" => Ok(CoveragePolicy::Warn),
            "reject" => Ok(CoveragePolicy::Reject),
            other => Err(format!("unknown coverage policy `{}`", other)),
        }
    }
}

impl fmt::Display for CoveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoveragePolicy::Allow => f.write_str("allow"),
            CoveragePolicy::Warn => f.write_str("warn"),
            CoveragePolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Relation between loop iterations and declared elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// One iteration per element
    Exact,
    /// Fewer iterations than elements
    Partial { iterations: u128, element_count: u64 },
    /// More iterations than elements (some addresses repeat)
    Overrun { iterations: u128, element_count: u64 },
}

impl Coverage {
    fn classify(iterations: u128, element_count: u64) -> Self {
        match iterations.cmp(&(element_count as u128)) {
            std::cmp::Ordering::Equal => Coverage::Exact,
            std::cmp::Ordering::Less => Coverage::Partial { iterations, element_count },
            std::cmp::Ordering::Greater => Coverage::Overrun { iterations, element_count },
        }
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        matches!(self, Coverage::Exact)
    }
}

/// A named mover inside an engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mover {
    pub id: MoverId,
    pub config: MoverConfig,
}

/// Validated configuration of one address generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Loop bounds, outermost first
    loop_bounds: Vec<u32>,

    /// Declared addressable elements
    element_count: u64,

    /// Movers in issue order
    movers: Vec<Mover>,
}

impl EngineConfig {
    /// Start building a configuration over `element_count` addressable elements.
    pub fn builder(element_count: u64) -> EngineConfigBuilder {
        EngineConfigBuilder::new(element_count)
    }

    #[inline]
    pub fn loop_bounds(&self) -> &[u32] {
        &self.loop_bounds
    }

    #[inline]
    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    #[inline]
    pub fn movers(&self) -> &[Mover] {
        &self.movers
    }

    /// Look up a mover by id.
    pub fn mover(&self, id: &str) -> Option<&MoverConfig> {
        self.movers
            .iter()
            .find(|m| m.id.as_str() == id)
            .map(|m| &m.config)
    }

    /// Product of all loop bounds, saturating at `u128::MAX`.
    pub fn iteration_count(&self) -> u128 {
        loop_nest::iteration_count(&self.loop_bounds)
    }

    /// Compare the iteration count against the declared element count.
    pub fn coverage(&self) -> Coverage {
        Coverage::classify(self.iteration_count(), self.element_count)
    }

    /// Exclusive upper address limit for a mover.
    pub fn limit(&self, mover: &MoverConfig) -> u64 {
        mover.buffer_len.unwrap_or(self.element_count)
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    element_count: u64,
    loop_bounds: Vec<u32>,
    movers: Vec<Mover>,
    coverage: CoveragePolicy,
}

impl EngineConfigBuilder {
    pub fn new(element_count: u64) -> Self {
        Self {
            element_count,
            loop_bounds: Vec::new(),
            movers: Vec::new(),
            coverage: CoveragePolicy::default(),
        }
    }

    /// Set the loop bounds, outermost first.
    pub fn loop_bounds(mut self, bounds: impl Into<Vec<u32>>) -> Self {
        self.loop_bounds = bounds.into();
        self
    }

    /// Add a mover. Movers issue in the order they are added.
    pub fn mover(mut self, id: impl Into<MoverId>, config: MoverConfig) -> Self {
        self.movers.push(Mover { id: id.into(), config });
        self
    }

    pub fn coverage(mut self, policy: CoveragePolicy) -> Self {
        self.coverage = policy;
        self
    }

    /// Validate shapes and produce the configuration.
    pub fn build(self) -> Result<EngineConfig> {
        if self.movers.is_empty() {
            return Err(StreamerError::NoMovers);
        }

        let depth = self.loop_bounds.len();
        for (i, mover) in self.movers.iter().enumerate() {
            if self.movers[..i].iter().any(|m| m.id == mover.id) {
                return Err(StreamerError::DuplicateMover(mover.id.clone()));
            }
            if mover.config.spatial.ports == 0 {
                return Err(StreamerError::ZeroPorts { mover: mover.id.clone() });
            }
            if mover.config.temporal_strides.len() != depth {
                return Err(StreamerError::ConfigMismatch {
                    what: format!("temporal strides of mover `{}`", mover.id),
                    expected: depth,
                    found: mover.config.temporal_strides.len(),
                });
            }
        }

        let config = EngineConfig {
            loop_bounds: self.loop_bounds,
            element_count: self.element_count,
            movers: self.movers,
        };

        match (config.coverage(), self.coverage) {
            (Coverage::Exact, _) | (_, CoveragePolicy::Allow) => {}
            (Coverage::Partial { iterations, element_count }, CoveragePolicy::Warn)
            | (Coverage::Overrun { iterations, element_count }, CoveragePolicy::Warn) => {
                log::warn!(
                    "loop nest {:?} visits {} indices but {} elements are declared",
                    config.loop_bounds, iterations, element_count
                );
            }
            (Coverage::Partial { iterations, element_count }, CoveragePolicy::Reject)
            | (Coverage::Overrun { iterations, element_count }, CoveragePolicy::Reject) => {
                return Err(StreamerError::CoverageMismatch { iterations, element_count });
            }
        }

        log::debug!(
            "EngineConfig: bounds={:?} elements={} movers={}",
            config.loop_bounds, config.element_count, config.movers.len()
        );

        Ok(config)
    }
}
