//! Register-programmed streamer.
//!
//! [`Streamer`] is what a test bench talks to: it exposes only register
//! reads and writes plus a per-cycle step. Writing the start register
//! decodes the register file into an [`EngineConfig`], builds a fresh
//! [`AddressGenerator`] and starts it. The configuration is latched at
//! start, so register writes during a run only affect the next one.

use super::config::{CoveragePolicy, EngineConfig};
use super::csr::{ControlRegisterFile, RegisterLayout, RegisterWrite};
use super::flow::{Consumer, StreamDriver, StreamStats};
use super::generator::{AddressGenerator, CycleAddresses, EngineState, Offer};
use super::{Result, StreamerError};
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct Streamer {
    csr: ControlRegisterFile,
    /// Addressable elements behind every mover
    element_count: u64,
    coverage: CoveragePolicy,
    generator: Option<AddressGenerator>,
}

impl Streamer {
    pub fn new(layout: RegisterLayout, element_count: u64) -> Self {
        log::debug!("Streamer::new levels={} movers={} registers={}",
            layout.levels(), layout.movers().len(), layout.len());

        Self {
            csr: ControlRegisterFile::new(layout),
            element_count,
            coverage: CoveragePolicy::default(),
            generator: None,
        }
    }

    /// Apply register width and coverage policy from the loaded settings.
    pub fn with_settings(mut self, settings: &Config) -> Self {
        self.csr = self.csr.with_width(settings.register_width());
        self.coverage = settings.coverage();
        self
    }

    pub fn with_coverage(mut self, policy: CoveragePolicy) -> Self {
        self.coverage = policy;
        self
    }

    #[inline]
    pub fn registers(&self) -> &ControlRegisterFile {
        &self.csr
    }

    /// Generator of the current or last run.
    pub fn generator(&self) -> Option<&AddressGenerator> {
        self.generator.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.generator
            .as_ref()
            .is_some_and(|g| g.state() == EngineState::Running)
    }

    /// Write a control register. Writing start launches a run.
    ///
    /// A start while busy is ignored.
    pub fn write_csr(&mut self, address: u32, value: u64) -> Result<RegisterWrite> {
        let write = self.csr.write(address, value)?;
        if write == RegisterWrite::Start {
            if self.is_busy() {
                log::warn!("start ignored: streamer busy");
            } else {
                self.launch()?;
            }
        }
        Ok(write)
    }

    /// Read a control register.
    pub fn read_csr(&mut self, address: u32) -> Result<u64> {
        self.csr.set_busy(self.is_busy());
        self.csr.read(address)
    }

    /// Program every register from a configuration, without starting.
    pub fn program(&mut self, config: &EngineConfig) -> Result<()> {
        self.csr.program(config)
    }

    fn launch(&mut self) -> Result<()> {
        // A failed start leaves the previous run in place
        let config = self.csr.decode(self.element_count, self.coverage)?;
        let mut generator = AddressGenerator::new(config)?;
        generator.start();
        self.generator = Some(generator);
        self.csr.set_busy(self.is_busy());
        Ok(())
    }

    fn running(&mut self) -> Result<&mut AddressGenerator> {
        self.generator.as_mut().ok_or(StreamerError::NotStarted)
    }

    /// Issue one cycle.
    pub fn step(&mut self) -> Result<CycleAddresses> {
        self.running()?.step()
    }

    /// Offer one cycle under backpressure.
    pub fn step_when(&mut self, ready: bool) -> Result<Offer> {
        self.running()?.step_when(ready)
    }

    /// Run the current run to completion against `consumers`.
    pub fn run(&mut self, driver: &StreamDriver, consumers: &mut [&mut dyn Consumer]) -> Result<StreamStats> {
        let generator = self.running()?;
        driver.run(generator, consumers)
    }
}
