//! streamer-agu library
//!
//! Address generation for accelerator data streamers: a shared loop nest
//! driving several affine movers, the control registers that program it,
//! and a reference model of the resulting reshuffle.

pub mod config;
pub mod memory;
pub mod oracle;
pub mod streamer;
pub mod testing;
