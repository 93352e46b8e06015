//! Shared nested-loop counter (odometer).
//!
//! A loop nest holds one bound per level, ordered outermost to innermost.
//! Every call to [`LoopNest::advance`] increments the innermost digit and
//! carries into outer digits on overflow, so the nest visits every
//! multi-index exactly once in row-major order:
//!
//! ```text
//! bounds = [2, 3]
//!
//! visit:  (0,0) (0,1) (0,2) (1,0) (1,1) (1,2)   then done
//! ```
//!
//! # Degenerate Nests
//!
//! - A level with bound 0 empties the whole nest: it is done from the start
//!   and yields zero iterations.
//! - A nest with no levels yields exactly one iteration (the empty index).

/// Odometer over a fixed list of loop bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopNest {
    /// Iteration count per level, outermost first
    bounds: Vec<u32>,

    /// Current position in each level
    counters: Vec<u32>,

    /// Indices produced so far
    visited: u128,

    /// Whether the outermost level carried out
    done: bool,
}

impl LoopNest {
    /// Create a nest in its start state.
    pub fn new(bounds: impl Into<Vec<u32>>) -> Self {
        let bounds = bounds.into();
        let counters = vec![0; bounds.len()];
        let done = bounds.iter().any(|&b| b == 0);

        Self {
            bounds,
            counters,
            visited: 0,
            done,
        }
    }

    /// Loop bounds, outermost first.
    #[inline]
    pub fn bounds(&self) -> &[u32] {
        &self.bounds
    }

    /// Number of levels.
    #[inline]
    pub fn depth(&self) -> usize {
        self.bounds.len()
    }

    /// Current multi-index without advancing.
    #[inline]
    pub fn current_index(&self) -> &[u32] {
        &self.counters
    }

    /// Whether every index has been visited.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Total number of indices in the nest, see [`iteration_count`].
    pub fn iteration_count(&self) -> u128 {
        iteration_count(&self.bounds)
    }

    /// Indices visited since the last reset.
    #[inline]
    pub fn visited(&self) -> u128 {
        self.visited
    }

    /// Indices left to visit.
    #[inline]
    pub fn remaining(&self) -> u128 {
        self.iteration_count().saturating_sub(self.visited)
    }

    /// Move to the next multi-index.
    ///
    /// Once the outermost level carries out the nest is frozen: further
    /// calls are no-ops and the counters keep their last value.
    pub fn advance(&mut self) {
        if self.done {
            return;
        }

        self.visited += 1;

        // Innermost level is the last one
        for level in (0..self.bounds.len()).rev() {
            self.counters[level] += 1;

            if self.counters[level] < self.bounds[level] {
                return;
            }

            self.counters[level] = 0;
        }

        // Every level wrapped (or there are no levels)
        self.done = true;
        self.counters = self.bounds.iter().map(|&b| b.saturating_sub(1)).collect();
    }

    /// Return to the all-zero start state.
    pub fn reset(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
        self.visited = 0;
        self.done = self.bounds.iter().any(|&b| b == 0);
    }
}

/// Product of `bounds`, saturating at `u128::MAX`.
///
/// A zero bound anywhere gives 0 regardless of the other levels. Five or
/// more levels near `u32::MAX` exceed `u128`.
pub fn iteration_count(bounds: &[u32]) -> u128 {
    if bounds.contains(&0) {
        return 0;
    }
    bounds
        .iter()
        .try_fold(1u128, |acc, &b| acc.checked_mul(b as u128))
        .unwrap_or(u128::MAX)
}
