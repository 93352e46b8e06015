//! Reshuffle case suite.
//!
//! Each case is a [`ReshuffleConfig`] run two ways and compared:
//!
//! - through the oracle ([`oracle::transform`])
//! - through a register-programmed [`Streamer`] copying words inside a
//!   [`FlatMemory`], the way the reshuffler test bench drives the hardware
//!
//! The bench places element `i` of the input at word `i * scale` and the
//! output region at `banks * ceil(n * scale / banks) + bank_offset`.
//!
//! # Case Table
//!
//! ```toml
//! [bench]
//! scale = 8
//! banks = 32
//! bank_offset = 8
//!
//! [[case]]
//! name = "blocked_transpose"
//! nb_elements = 16
//! strides = [
//!     { bound = 2, src = 1, dst = 8 },
//!     { bound = 8, src = 2, dst = 1 },
//! ]
//! # Optional: fixed expected output for input 0..nb_elements
//! expected = [0, 2, 4, 6, 8, 10, 12, 14, 1, 3, 5, 7, 9, 11, 13, 15]
//! # Optional: consumer only ready every 3rd poll
//! throttle = 3
//! ```

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::config::Config;
use crate::memory::FlatMemory;
use crate::oracle::{self, ReshuffleConfig};
use crate::streamer::flow::CopyConsumer;
use crate::streamer::{
    Direction, RegisterField, RegisterLayout, StreamDriver, StreamStats, Streamer, Throttle,
};

/// Accelerator registers in front of the streamer block.
const GENERAL_PURPOSE_REGISTERS: usize = 8;

/// Memory placement used by the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Bench {
    /// Address units per element
    pub scale: u64,
    /// Memory banks; the output region starts on a bank boundary
    pub banks: u64,
    /// Extra words between the regions
    pub bank_offset: u64,
}

impl Default for Bench {
    fn default() -> Self {
        Self {
            scale: 8,
            banks: 32,
            bank_offset: 8,
        }
    }
}

impl Bench {
    /// First word of the output region for `n` elements, `None` on overflow.
    pub fn dst_base(&self, n: u64) -> Option<u64> {
        let banks = self.banks.max(1);
        n.checked_mul(self.scale)?
            .div_ceil(banks)
            .checked_mul(banks)?
            .checked_add(self.bank_offset)
    }

    /// Words needed for input and output regions, `None` on overflow.
    pub fn memory_words(&self, n: u64) -> Option<u64> {
        self.dst_base(n)?.checked_add(n.checked_mul(self.scale)?)
    }
}

/// One named case.
#[derive(Debug, Clone, Deserialize)]
pub struct Case {
    pub name: String,
    #[serde(flatten)]
    pub reshuffle: ReshuffleConfig,
    /// Expected output for input `0..nb_elements`
    #[serde(default)]
    pub expected: Option<Vec<u64>>,
    /// Consumer accepts every n-th offered cycle
    #[serde(default)]
    pub throttle: Option<u64>,
}

/// A case table file.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseTable {
    #[serde(default)]
    pub bench: Bench,
    #[serde(rename = "case", default)]
    pub cases: Vec<Case>,
}

impl CaseTable {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read case table {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse case table {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: Self = toml::from_str(content)?;
        if table.cases.is_empty() {
            bail!("case table has no [[case]] entries");
        }
        Ok(table)
    }

    pub fn case(&self, name: &str) -> Option<&Case> {
        self.cases.iter().find(|c| c.name == name)
    }
}

/// Result of running a single case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Streamer output matched the oracle (and the table, if given).
    Pass {
        cycles: u64,
        stalled: u64,
    },
    /// First differing element.
    Mismatch {
        /// "oracle" or "expected"
        against: &'static str,
        index: usize,
        expected: u64,
        actual: u64,
    },
    /// Configuration rejected or run failed.
    Error {
        message: String,
    },
}

impl TestOutcome {
    /// Check if the case passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, TestOutcome::Pass { .. })
    }
}

/// Summary of a suite run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub mismatched: usize,
    pub errors: usize,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Runs every case of a table.
pub struct CaseSuite {
    table: CaseTable,
    settings: Config,
    results: Vec<(String, TestOutcome)>,
}

impl CaseSuite {
    pub fn new(table: CaseTable, settings: Config) -> Self {
        Self {
            table,
            settings,
            results: Vec::new(),
        }
    }

    pub fn table(&self) -> &CaseTable {
        &self.table
    }

    /// Run all cases and return summary.
    pub fn run_all(&mut self) -> SuiteResult {
        let mut result = SuiteResult {
            total: self.table.cases.len(),
            ..SuiteResult::default()
        };

        let cases = self.table.cases.clone();
        for case in &cases {
            let outcome = self.run_single(case);
            log::info!("{}: {:?}", case.name, outcome);

            match &outcome {
                TestOutcome::Pass { .. } => result.passed += 1,
                TestOutcome::Mismatch { .. } => result.mismatched += 1,
                TestOutcome::Error { .. } => result.errors += 1,
            }
            self.results.push((case.name.clone(), outcome));
        }

        result
    }

    /// Run a single case.
    pub fn run_single(&self, case: &Case) -> TestOutcome {
        let input: Vec<u64> = (0..case.reshuffle.element_count).collect();

        let golden = match oracle::transform(&case.reshuffle, &input) {
            Ok(out) => out,
            Err(e) => {
                return TestOutcome::Error {
                    message: format!("oracle: {}", e),
                }
            }
        };

        if let Some(expected) = &case.expected {
            if let Some(outcome) = compare("expected", expected, &golden) {
                return outcome;
            }
        }

        match self.run_streamer(case, &input) {
            Ok((output, stats)) => compare("oracle", &golden, &output).unwrap_or(TestOutcome::Pass {
                cycles: stats.issued,
                stalled: stats.stalled,
            }),
            Err(e) => TestOutcome::Error {
                message: format!("{:#}", e),
            },
        }
    }

    /// Program a streamer through its registers and copy `input` through memory.
    pub fn run_streamer(&self, case: &Case, input: &[u64]) -> Result<(Vec<u64>, StreamStats)> {
        let bench = self.table.bench;
        let n = case.reshuffle.element_count;
        let (dst_base, words) = bench
            .dst_base(n)
            .zip(bench.memory_words(n))
            .ok_or_else(|| anyhow!("bench placement of {} elements overflows (scale {}, banks {})",
                n, bench.scale, bench.banks))?;
        let scale = usize::try_from(bench.scale)?;

        let engine_config = case
            .reshuffle
            .to_engine_config(i64::try_from(bench.scale)?, i64::try_from(dst_base)?)
            .context("invalid reshuffle")?;

        let layout = RegisterLayout::new(case.reshuffle.levels.len())
            .general_purpose(GENERAL_PURPOSE_REGISTERS)
            .mover("src", Direction::Read, 1)
            .mover("dst", Direction::Write, 1)
            .memory_words(words);
        let start = layout
            .address_of(RegisterField::Start)
            .ok_or_else(|| anyhow!("layout has no start register"))?;

        let mut streamer = Streamer::new(layout, n).with_settings(&self.settings);
        streamer.program(&engine_config)?;
        streamer.write_csr(start, 1)?;

        let mut memory = FlatMemory::new(usize::try_from(words)?);
        for (i, &value) in input.iter().enumerate() {
            memory.load(i * scale, &[value])?;
        }

        let mut driver = StreamDriver::new();
        if let Some(limit) = self.settings.max_stall_cycles() {
            driver = driver.with_stall_limit(limit);
        }

        let stats = {
            let mut copy = CopyConsumer::new(&engine_config, &mut memory)?;
            match case.throttle.filter(|&p| p > 1) {
                Some(period) => {
                    let mut throttle = Throttle::new(period);
                    streamer.run(&driver, &mut [&mut copy, &mut throttle])?
                }
                None => streamer.run(&driver, &mut [&mut copy])?,
            }
        };

        let output = (0..input.len())
            .map(|i| memory.words()[dst_base as usize + i * scale])
            .collect();

        Ok((output, stats))
    }

    /// Get all case results.
    pub fn results(&self) -> &[(String, TestOutcome)] {
        &self.results
    }

    /// Generate a summary report.
    pub fn summary_report(&self, result: &SuiteResult) -> String {
        let mut report = String::new();

        report.push_str("=== Reshuffle Case Results ===\n\n");
        report.push_str(&format!(
            "Total: {}, Passed: {}, Mismatched: {}, Errors: {}\n\n",
            result.total, result.passed, result.mismatched, result.errors
        ));

        if result.mismatched > 0 || result.errors > 0 {
            report.push_str("--- Failed Cases ---\n");
            for (name, outcome) in &self.results {
                match outcome {
                    TestOutcome::Mismatch { against, index, expected, actual } => {
                        report.push_str(&format!(
                            "{}: MISMATCH vs {} at [{}]: expected {}, got {}\n",
                            name, against, index, expected, actual
                        ));
                    }
                    TestOutcome::Error { message } => {
                        report.push_str(&format!("{}: ERROR - {}\n", name, message));
                    }
                    TestOutcome::Pass { .. } => {}
                }
            }
            report.push('\n');
        }

        if result.passed > 0 {
            report.push_str("--- Passed Cases ---\n");
            for (name, outcome) in &self.results {
                if let TestOutcome::Pass { cycles, stalled } = outcome {
                    report.push_str(&format!("{}: PASS ({} cycles, {} stalled)\n", name, cycles, stalled));
                }
            }
            report.push('\n');
        }

        report
    }
}

fn compare(against: &'static str, expected: &[u64], actual: &[u64]) -> Option<TestOutcome> {
    if expected.len() != actual.len() {
        return Some(TestOutcome::Error {
            message: format!("{} has {} elements, got {}", against, expected.len(), actual.len()),
        });
    }

    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .map(|index| TestOutcome::Mismatch {
            against,
            index,
            expected: expected[index],
            actual: actual[index],
        })
}
