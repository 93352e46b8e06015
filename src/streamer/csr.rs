//! Control/status register file of the streamer.
//!
//! One fixed-width register per scalar configuration field. The register
//! map is derived from the design-time shape (number of loop levels, the
//! movers and their port counts) the same way the hardware generator lays
//! it out:
//!
//! ```text
//! addr  field                         example: 2 levels, movers m0 m1, 8 GP regs
//! ────  ───────────────────────────   ─────────────────────────────────────────
//!  0..  general purpose (accelerator)  0..7
//!  G..  loop bound[level]              8  bound L0 (innermost), 9  bound L1
//!       temporal stride[mover][level]  10 m0.L0, 11 m0.L1, 12 m1.L0, 13 m1.L1
//!       spatial stride[mover]          14 m0, 15 m1
//!       base pointer[mover]            16 m0, 17 m1
//!       start                          18
//! ```
//!
//! # Level Numbering
//!
//! Register level 0 is the **innermost** loop, as the hardware counts it.
//! [`ControlRegisterFile::decode`] reverses the order into the crate-wide
//! outermost-first convention, and [`RegisterLayout::encode`] does the
//! opposite. No other code deals with register level numbers.
//!
//! # Semantics
//!
//! - Writes are masked to the register width; the last write wins.
//! - Reads return the stored value immediately.
//! - Strides are two's-complement at the register width; bounds and base
//!   pointers are unsigned.
//! - Writing the start register triggers a run; the value is ignored and not
//!   stored. Reading it returns 1 while the streamer is busy.

use std::fmt;

use super::config::{CoveragePolicy, EngineConfig};
use super::mover::{Direction, MoverConfig, MoverId, SpatialConfig};
use super::{Result, StreamerError, DEFAULT_REGISTER_WIDTH};

/// Design-time description of one mover in the register map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoverShape {
    pub id: MoverId,
    pub direction: Direction,
    pub ports: usize,
}

/// Meaning of one register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterField {
    /// Accelerator register in front of the streamer block
    General(usize),
    /// Loop bound; level 0 is innermost
    LoopBound { level: usize },
    /// Temporal stride of mover `mover` (layout index) at `level` (0 innermost)
    TemporalStride { mover: usize, level: usize },
    /// Spatial stride of a mover
    SpatialStride { mover: usize },
    /// Base pointer of a mover
    BasePtr { mover: usize },
    /// Start trigger / busy status
    Start,
}

impl fmt::Display for RegisterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterField::General(i) => write!(f, "GPP_{}", i),
            RegisterField::LoopBound { level } => write!(f, "LOOP_BOUND_{}", level),
            RegisterField::TemporalStride { mover, level } => {
                write!(f, "TEMPORAL_STRIDE_M{}_L{}", mover, level)
            }
            RegisterField::SpatialStride { mover } => write!(f, "SPATIAL_STRIDE_M{}", mover),
            RegisterField::BasePtr { mover } => write!(f, "BASE_PTR_M{}", mover),
            RegisterField::Start => f.write_str("START"),
        }
    }
}

/// Result of a register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWrite {
    /// Value stored
    Stored,
    /// Start register written; the caller should launch a run
    Start,
}

/// Register map derived from the streamer's design-time shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLayout {
    levels: usize,
    movers: Vec<MoverShape>,
    general: usize,
    /// Words of memory behind the movers; bounds every decoded mover
    memory_words: Option<u64>,
}

impl RegisterLayout {
    /// Layout for `levels` loop levels and no movers yet.
    pub fn new(levels: usize) -> Self {
        Self {
            levels,
            movers: Vec::new(),
            general: 0,
            memory_words: None,
        }
    }

    /// Append a mover.
    pub fn mover(mut self, id: impl Into<MoverId>, direction: Direction, ports: usize) -> Self {
        self.movers.push(MoverShape { id: id.into(), direction, ports });
        self
    }

    /// Reserve `count` general-purpose registers in front of the streamer block.
    pub fn general_purpose(mut self, count: usize) -> Self {
        self.general = count;
        self
    }

    /// Size of the memory the movers address. Without it, decoded movers
    /// are bounded by the element count.
    pub fn memory_words(mut self, words: u64) -> Self {
        self.memory_words = Some(words);
        self
    }

    #[inline]
    pub fn levels(&self) -> usize {
        self.levels
    }

    #[inline]
    pub fn movers(&self) -> &[MoverShape] {
        &self.movers
    }

    fn bounds_base(&self) -> usize {
        self.general
    }

    fn temporal_base(&self) -> usize {
        self.bounds_base() + self.levels
    }

    fn spatial_base(&self) -> usize {
        self.temporal_base() + self.movers.len() * self.levels
    }

    fn base_ptr_base(&self) -> usize {
        self.spatial_base() + self.movers.len()
    }

    fn start_address(&self) -> usize {
        self.base_ptr_base() + self.movers.len()
    }

    /// Number of registers, start included.
    pub fn len(&self) -> usize {
        self.start_address() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Address of a field, if the field exists in this layout.
    pub fn address_of(&self, field: RegisterField) -> Option<u32> {
        let m = self.movers.len();
        let addr = match field {
            RegisterField::General(i) if i < self.general => i,
            RegisterField::LoopBound { level } if level < self.levels => {
                self.bounds_base() + level
            }
            RegisterField::TemporalStride { mover, level } if mover < m && level < self.levels => {
                self.temporal_base() + mover * self.levels + level
            }
            RegisterField::SpatialStride { mover } if mover < m => self.spatial_base() + mover,
            RegisterField::BasePtr { mover } if mover < m => self.base_ptr_base() + mover,
            RegisterField::Start => self.start_address(),
            _ => return None,
        };
        u32::try_from(addr).ok()
    }

    /// Field stored at a register address.
    pub fn field_at(&self, address: u32) -> Option<RegisterField> {
        let a = address as usize;
        let field = if a < self.bounds_base() {
            RegisterField::General(a)
        } else if a < self.temporal_base() {
            RegisterField::LoopBound { level: a - self.bounds_base() }
        } else if a < self.spatial_base() {
            let rel = a - self.temporal_base();
            RegisterField::TemporalStride { mover: rel / self.levels, level: rel % self.levels }
        } else if a < self.base_ptr_base() {
            RegisterField::SpatialStride { mover: a - self.spatial_base() }
        } else if a < self.start_address() {
            RegisterField::BasePtr { mover: a - self.base_ptr_base() }
        } else if a == self.start_address() {
            RegisterField::Start
        } else {
            return None;
        };
        Some(field)
    }

    /// Register writes that program `config`, in map order, start excluded.
    ///
    /// The configuration must match the layout: same depth, same movers in
    /// the same order with the same direction and port count. Every value
    /// must fit its register at `width` bits (bounds and bases unsigned,
    /// strides two's-complement), otherwise [`StreamerError::RegisterValue`]
    /// is returned instead of a wrapped value.
    pub fn encode(&self, config: &EngineConfig, width: u32) -> Result<Vec<(u32, u64)>> {
        self.check_matches(config)?;
        let mut writes = Vec::with_capacity(self.len() - self.general - 1);
        let mut push = |field: RegisterField, value: i128, signed: bool| -> Result<()> {
            let address = self.address_of(field).ok_or(StreamerError::InvalidRegister(u32::MAX))?;
            let (lo, hi) = if signed { signed_range(width) } else { (0, width_mask(width) as i128) };
            if value < lo || value > hi {
                log::warn!("{} = {} does not fit {} bits", field, value, width);
                return Err(StreamerError::RegisterValue { address, value: value as u64 });
            }
            writes.push((address, value as u64 & width_mask(width)));
            Ok(())
        };

        let depth = self.levels;
        for (outer, &bound) in config.loop_bounds().iter().enumerate() {
            push(RegisterField::LoopBound { level: depth - 1 - outer }, bound as i128, false)?;
        }
        for (m, mover) in config.movers().iter().enumerate() {
            for (outer, &stride) in mover.config.temporal_strides.iter().enumerate() {
                let field = RegisterField::TemporalStride { mover: m, level: depth - 1 - outer };
                push(field, stride as i128, true)?;
            }
        }
        for (m, mover) in config.movers().iter().enumerate() {
            push(RegisterField::SpatialStride { mover: m }, mover.config.spatial.stride as i128, true)?;
        }
        for (m, mover) in config.movers().iter().enumerate() {
            push(RegisterField::BasePtr { mover: m }, mover.config.base as i128, false)?;
        }

        writes.sort_unstable_by_key(|&(addr, _)| addr);
        Ok(writes)
    }

    fn check_matches(&self, config: &EngineConfig) -> Result<()> {
        if config.loop_bounds().len() != self.levels {
            return Err(StreamerError::ConfigMismatch {
                what: "loop levels".to_string(),
                expected: self.levels,
                found: config.loop_bounds().len(),
            });
        }
        if config.movers().len() != self.movers.len() {
            return Err(StreamerError::ConfigMismatch {
                what: "movers".to_string(),
                expected: self.movers.len(),
                found: config.movers().len(),
            });
        }
        for (slot, (shape, mover)) in self.movers.iter().zip(config.movers()).enumerate() {
            if shape.id != mover.id {
                return Err(StreamerError::MoverMismatch {
                    slot,
                    expected: shape.id.clone(),
                    found: format!("mover `{}`", mover.id),
                });
            }
            if shape.direction != mover.config.direction {
                return Err(StreamerError::MoverMismatch {
                    slot,
                    expected: shape.id.clone(),
                    found: format!("{} mover, layout has {}", mover.config.direction, shape.direction),
                });
            }
            if shape.ports != mover.config.spatial.ports {
                return Err(StreamerError::ConfigMismatch {
                    what: format!("ports of mover `{}`", shape.id),
                    expected: shape.ports,
                    found: mover.config.spatial.ports,
                });
            }
        }
        Ok(())
    }
}

/// Fixed-width register storage for one streamer.
#[derive(Debug, Clone)]
pub struct ControlRegisterFile {
    layout: RegisterLayout,
    width: u32,
    values: Vec<u64>,
    busy: bool,
}

impl ControlRegisterFile {
    /// All registers zero, default width.
    pub fn new(layout: RegisterLayout) -> Self {
        let values = vec![0; layout.len()];
        Self {
            layout,
            width: DEFAULT_REGISTER_WIDTH,
            values,
            busy: false,
        }
    }

    /// Change the register width (1..=64 bits). Stored values are re-masked.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width.clamp(1, 64);
        if self.width != width {
            log::warn!("register width {} out of range, using {}", width, self.width);
        }
        let mask = width_mask(self.width);
        self.values.iter_mut().for_each(|v| *v &= mask);
        self
    }

    #[inline]
    pub fn layout(&self) -> &RegisterLayout {
        &self.layout
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Write a register.
    pub fn write(&mut self, address: u32, value: u64) -> Result<RegisterWrite> {
        let field = self
            .layout
            .field_at(address)
            .ok_or(StreamerError::InvalidRegister(address))?;

        if field == RegisterField::Start {
            log::debug!("CSR write START (value 0x{:X} ignored)", value);
            return Ok(RegisterWrite::Start);
        }

        let stored = value & width_mask(self.width);
        log::trace!("CSR write {} @{} = 0x{:X}", field, address, stored);
        self.values[address as usize] = stored;
        Ok(RegisterWrite::Stored)
    }

    /// Read a register.
    pub fn read(&self, address: u32) -> Result<u64> {
        match self.layout.field_at(address) {
            Some(RegisterField::Start) => Ok(self.busy as u64),
            Some(_) => Ok(self.values[address as usize]),
            None => Err(StreamerError::InvalidRegister(address)),
        }
    }

    /// Apply every write of [`RegisterLayout::encode`].
    pub fn program(&mut self, config: &EngineConfig) -> Result<()> {
        for (address, value) in self.layout.encode(config, self.width)? {
            self.write(address, value)?;
        }
        Ok(())
    }

    fn raw(&self, field: RegisterField) -> (u32, u64) {
        // Fields are only built from the layout's own ranges
        let address = self.layout.address_of(field).unwrap_or(u32::MAX);
        let value = self.values.get(address as usize).copied().unwrap_or(0);
        (address, value)
    }

    /// Decode the current register contents into an engine configuration.
    pub fn decode(&self, element_count: u64, coverage: CoveragePolicy) -> Result<EngineConfig> {
        let depth = self.layout.levels;

        // Registers count levels innermost-first
        let hw_levels = (0..depth).rev();

        let mut bounds = Vec::with_capacity(depth);
        for level in hw_levels.clone() {
            let (address, value) = self.raw(RegisterField::LoopBound { level });
            let bound = u32::try_from(value).map_err(|_| StreamerError::RegisterValue { address, value })?;
            bounds.push(bound);
        }

        let mut builder = EngineConfig::builder(element_count)
            .loop_bounds(bounds)
            .coverage(coverage);

        for (m, shape) in self.layout.movers.iter().enumerate() {
            let strides: Vec<i64> = hw_levels
                .clone()
                .map(|level| sign_extend(self.raw(RegisterField::TemporalStride { mover: m, level }).1, self.width))
                .collect();
            let spatial_stride = sign_extend(self.raw(RegisterField::SpatialStride { mover: m }).1, self.width);
            let (address, value) = self.raw(RegisterField::BasePtr { mover: m });
            let base = i64::try_from(value).map_err(|_| StreamerError::RegisterValue { address, value })?;

            let mut mover = MoverConfig::new(shape.direction, base, strides)
                .with_spatial(SpatialConfig::new(shape.ports, spatial_stride));
            if let Some(words) = self.layout.memory_words {
                mover = mover.with_buffer_len(words);
            }
            builder = builder.mover(shape.id.clone(), mover);
        }

        builder.build()
    }
}

fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Smallest and largest two's-complement value of `width` bits.
fn signed_range(width: u32) -> (i128, i128) {
    let half = 1i128 << (width.clamp(1, 64) - 1);
    (-half, half - 1)
}

fn sign_extend(value: u64, width: u32) -> i64 {
    if width >= 64 {
        value as i64
    } else {
        let shift = 64 - width;
        ((value << shift) as i64) >> shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Register map of the reshuffler test bench: 8 accelerator registers,
    /// then a 2-level, 2-mover streamer.
    fn reshuffler_layout() -> RegisterLayout {
        RegisterLayout::new(2)
            .general_purpose(8)
            .mover("src", Direction::Read, 1)
            .mover("dst", Direction::Write, 1)
    }

    /// Register map of the basic streamer: 1 level, readers A/B, writer C.
    fn basic_layout() -> RegisterLayout {
        RegisterLayout::new(1)
            .mover("a", Direction::Read, 4)
            .mover("b", Direction::Read, 4)
            .mover("c", Direction::Write, 4)
    }

    #[test]
    fn test_reshuffler_register_map() {
        let layout = reshuffler_layout();
        assert_eq!(layout.address_of(RegisterField::General(7)), Some(7));
        assert_eq!(layout.address_of(RegisterField::LoopBound { level: 0 }), Some(8));
        assert_eq!(layout.address_of(RegisterField::LoopBound { level: 1 }), Some(9));
        assert_eq!(layout.address_of(RegisterField::TemporalStride { mover: 0, level: 0 }), Some(10));
        assert_eq!(layout.address_of(RegisterField::TemporalStride { mover: 1, level: 1 }), Some(13));
        assert_eq!(layout.address_of(RegisterField::SpatialStride { mover: 1 }), Some(15));
        assert_eq!(layout.address_of(RegisterField::BasePtr { mover: 0 }), Some(16));
        assert_eq!(layout.address_of(RegisterField::Start), Some(18));
        assert_eq!(layout.len(), 19);
        assert_eq!(layout.address_of(RegisterField::BasePtr { mover: 2 }), None);
    }

    #[test]
    fn test_basic_register_map() {
        let layout = basic_layout();
        assert_eq!(layout.field_at(0), Some(RegisterField::LoopBound { level: 0 }));
        assert_eq!(layout.field_at(3), Some(RegisterField::TemporalStride { mover: 2, level: 0 }));
        assert_eq!(layout.field_at(4), Some(RegisterField::SpatialStride { mover: 0 }));
        assert_eq!(layout.field_at(9), Some(RegisterField::BasePtr { mover: 2 }));
        assert_eq!(layout.field_at(10), Some(RegisterField::Start));
        assert_eq!(layout.field_at(11), None);
    }

    #[test]
    fn test_field_roundtrip() {
        let layout = reshuffler_layout();
        for address in 0..layout.len() as u32 {
            let field = layout.field_at(address).unwrap();
            assert_eq!(layout.address_of(field), Some(address), "{}", field);
        }
    }

    #[test]
    fn test_read_after_write() {
        let mut csr = ControlRegisterFile::new(basic_layout());
        for (address, value) in [(0u32, 20u64), (1, 2), (4, 8), (8, 32), (9, 64)] {
            assert_eq!(csr.write(address, value).unwrap(), RegisterWrite::Stored);
            assert_eq!(csr.read(address).unwrap(), value);
        }
        csr.write(8, 33).unwrap();
        assert_eq!(csr.read(8).unwrap(), 33);
    }

    #[test]
    fn test_start_not_stored() {
        let mut csr = ControlRegisterFile::new(basic_layout());
        assert_eq!(csr.write(10, 0xFFFF).unwrap(), RegisterWrite::Start);
        assert_eq!(csr.read(10).unwrap(), 0);
        csr.set_busy(true);
        assert_eq!(csr.read(10).unwrap(), 1);
    }

    #[test]
    fn test_invalid_register() {
        let mut csr = ControlRegisterFile::new(basic_layout());
        assert_eq!(csr.write(11, 1).unwrap_err(), StreamerError::InvalidRegister(11));
        assert_eq!(csr.read(100).unwrap_err(), StreamerError::InvalidRegister(100));
    }

    #[test]
    fn test_width_masking_and_sign_extension() {
        let mut csr = ControlRegisterFile::new(reshuffler_layout()).with_width(8);
        csr.write(8, 0x1_04).unwrap();
        assert_eq!(csr.read(8).unwrap(), 0x04);

        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(0xFFFF_FFF8, 32), -8);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_decode_reverses_level_order() {
        let mut csr = ControlRegisterFile::new(reshuffler_layout());
        // Innermost bound 8 (level 0), outermost 2 (level 1)
        csr.write(8, 8).unwrap();
        csr.write(9, 2).unwrap();
        // src: inner stride 2, outer stride 1
        csr.write(10, 2).unwrap();
        csr.write(11, 1).unwrap();
        // dst: inner stride 1, outer stride 8
        csr.write(12, 1).unwrap();
        csr.write(13, 8).unwrap();

        let config = csr.decode(16, CoveragePolicy::Reject).unwrap();
        assert_eq!(config.loop_bounds(), &[2, 8]);
        assert_eq!(config.mover("src").unwrap().temporal_strides, vec![1, 2]);
        assert_eq!(config.mover("dst").unwrap().temporal_strides, vec![8, 1]);
        assert_eq!(config.mover("dst").unwrap().direction, Direction::Write);
    }

    #[test]
    fn test_decode_negative_stride() {
        let mut csr = ControlRegisterFile::new(RegisterLayout::new(1).mover("r", Direction::Read, 2));
        csr.write(0, 4).unwrap();
        csr.write(1, (-1i64) as u64).unwrap();
        csr.write(2, (-8i64) as u64).unwrap();
        csr.write(3, 11).unwrap();

        let config = csr.decode(16, CoveragePolicy::Allow).unwrap();
        let mover = config.mover("r").unwrap();
        assert_eq!(mover.temporal_strides, vec![-1]);
        assert_eq!(mover.spatial, SpatialConfig::new(2, -8));
        assert_eq!(mover.base, 11);
    }

    #[test]
    fn test_decode_wide_bound_rejected() {
        let mut csr = ControlRegisterFile::new(RegisterLayout::new(1).mover("r", Direction::Read, 1))
            .with_width(64);
        csr.write(0, 1 << 40).unwrap();
        assert_eq!(
            csr.decode(16, CoveragePolicy::Allow).unwrap_err(),
            StreamerError::RegisterValue { address: 0, value: 1 << 40 }
        );
    }

    #[test]
    fn test_program_then_decode() {
        let config = EngineConfig::builder(64)
            .loop_bounds([2, 4])
            .mover("a", MoverConfig::reader(3, [-1, 2]).with_spatial(SpatialConfig::new(4, 8)))
            .mover("b", MoverConfig::reader(40, [0, 1]).with_spatial(SpatialConfig::new(4, 1)))
            .mover("c", MoverConfig::writer(16, [4, 1]).with_spatial(SpatialConfig::new(4, -2)))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();

        let layout = RegisterLayout::new(2)
            .mover("a", Direction::Read, 4)
            .mover("b", Direction::Read, 4)
            .mover("c", Direction::Write, 4);
        let mut csr = ControlRegisterFile::new(layout);
        csr.program(&config).unwrap();

        assert_eq!(csr.decode(64, CoveragePolicy::Allow).unwrap(), config);
    }

    #[test]
    fn test_memory_words_bound_decoded_movers() {
        let layout = RegisterLayout::new(1)
            .mover("r", Direction::Read, 1)
            .memory_words(256);
        let config = ControlRegisterFile::new(layout)
            .decode(16, CoveragePolicy::Allow)
            .unwrap();
        assert_eq!(config.limit(config.mover("r").unwrap()), 256);
    }

    fn basic_config(base: i64, stride: i64) -> EngineConfig {
        EngineConfig::builder(16)
            .loop_bounds([2, 8])
            .mover("src", MoverConfig::reader(0, [stride, 1]))
            .mover("dst", MoverConfig::writer(base, [8, 1]))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap()
    }

    #[test]
    fn test_program_rejects_base_wider_than_register() {
        let mut csr = ControlRegisterFile::new(reshuffler_layout());
        let err = csr.program(&basic_config(1 << 33, 2)).unwrap_err();
        assert_eq!(err, StreamerError::RegisterValue { address: 17, value: 1 << 33 });
        // Registers are untouched on failure
        assert_eq!(csr.read(17).unwrap(), 0);

        let negative = reshuffler_layout().encode(&basic_config(-1, 2), 32).unwrap_err();
        assert_eq!(negative, StreamerError::RegisterValue { address: 17, value: u64::MAX });
    }

    #[test]
    fn test_encode_stride_signed_range() {
        let layout = reshuffler_layout();
        // src outer stride sits at level 1 of mover 0
        assert!(layout.encode(&basic_config(0, 127), 8).is_ok());
        assert!(layout.encode(&basic_config(0, -128), 8).is_ok());
        assert_eq!(
            layout.encode(&basic_config(0, 128), 8).unwrap_err(),
            StreamerError::RegisterValue { address: 11, value: 128 }
        );
        assert_eq!(
            layout.encode(&basic_config(0, -129), 8).unwrap_err(),
            StreamerError::RegisterValue { address: 11, value: (-129i64) as u64 }
        );
    }

    #[test]
    fn test_encode_bound_wider_than_register() {
        let config = EngineConfig::builder(16)
            .loop_bounds([2, 300])
            .mover("src", MoverConfig::reader(0, [0, 0]))
            .mover("dst", MoverConfig::writer(0, [0, 0]))
            .coverage(CoveragePolicy::Allow)
            .build()
            .unwrap();
        assert_eq!(
            reshuffler_layout().encode(&config, 8).unwrap_err(),
            StreamerError::RegisterValue { address: 8, value: 300 }
        );
    }

    #[test]
    fn test_program_roundtrip_at_width_limits() {
        let mut csr = ControlRegisterFile::new(reshuffler_layout()).with_width(16);
        let config = basic_config(0xFFFF, -0x8000);
        csr.program(&config).unwrap();
        assert_eq!(csr.decode(16, CoveragePolicy::Allow).unwrap(), config);
    }

    #[test]
    fn test_encode_rejects_mover_mismatch() {
        let swapped = EngineConfig::builder(16)
            .loop_bounds([2, 8])
            .mover("dst", MoverConfig::writer(0, [8, 1]))
            .mover("src", MoverConfig::reader(0, [1, 2]))
            .build()
            .unwrap();
        assert_eq!(
            reshuffler_layout().encode(&swapped, 32).unwrap_err(),
            StreamerError::MoverMismatch {
                slot: 0,
                expected: MoverId::from("src"),
                found: "mover `dst`".to_string(),
            }
        );

        let reversed = EngineConfig::builder(16)
            .loop_bounds([2, 8])
            .mover("src", MoverConfig::writer(0, [1, 2]))
            .mover("dst", MoverConfig::writer(0, [8, 1]))
            .build()
            .unwrap();
        assert_eq!(
            reshuffler_layout().encode(&reversed, 32).unwrap_err(),
            StreamerError::MoverMismatch {
                slot: 0,
                expected: MoverId::from("src"),
                found: "write mover, layout has read".to_string(),
            }
        );
    }

    #[test]
    fn test_width_clamped() {
        assert_eq!(ControlRegisterFile::new(reshuffler_layout()).with_width(0).width(), 1);
        assert_eq!(ControlRegisterFile::new(reshuffler_layout()).with_width(96).width(), 64);
    }

    #[test]
    fn test_encode_rejects_shape_mismatch() {
        let config = EngineConfig::builder(16)
            .loop_bounds([16])
            .mover("src", MoverConfig::reader(0, [1]))
            .mover("dst", MoverConfig::writer(0, [1]))
            .build()
            .unwrap();

        let err = reshuffler_layout().encode(&config, 32).unwrap_err();
        assert_eq!(err, StreamerError::ConfigMismatch {
            what: "loop levels".to_string(),
            expected: 2,
            found: 1,
        });
    }
}
