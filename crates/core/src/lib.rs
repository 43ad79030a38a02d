// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Interrupt aggregation controller model.
//!
//! A [`controller::Controller`] multiplexes up to 32 level-triggered source
//! lines per input pin onto a small set of output lines, with the
//! enable/status/pending register semantics firmware observes through
//! 32-bit MMIO accesses. Controller variants differ only in their
//! [`profile::Profile`].

pub mod aggregator;
pub mod controller;
pub mod error;
pub mod pin;
pub mod profile;
pub mod registers;
pub mod signals;
pub mod snapshot;
pub mod system;

pub use controller::Controller;
pub use error::GuestError;
pub use profile::{IrqRoute, Profile, RegisterRole};
pub use signals::{DigitalLevel, GuestErrorSink, IrqSink, LineRecorder};

/// The only access width this controller family decodes.
pub const ACCESS_SIZE: u32 = 4;

/// Host-side contract violations. Guest misbehavior is a [`GuestError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Unsupported {size}-byte access at offset {offset:#x}")]
    InvalidAccessSize { offset: u64, size: u32 },
    #[error("Unaligned access at offset {0:#x}")]
    UnalignedAccess(u64),
    #[error("Snapshot does not match controller: {0}")]
    SnapshotMismatch(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait representing a memory-mapped peripheral with 32-bit registers.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64, size: u32) -> SimResult<u32>;
    fn write(&mut self, offset: u64, size: u32, value: u32) -> SimResult<()>;
    fn reset(&mut self) {}
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}

/// Rejects anything but an aligned 32-bit access.
pub(crate) fn check_access(offset: u64, size: u32) -> SimResult<()> {
    if size != ACCESS_SIZE {
        return Err(SimulationError::InvalidAccessSize { offset, size });
    }
    if offset % ACCESS_SIZE as u64 != 0 {
        return Err(SimulationError::UnalignedAccess(offset));
    }
    Ok(())
}
