// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Misbehavior by guest firmware or source wiring.
///
/// These never abort the controller. The offending access or event is
/// dropped and the error is handed to a [`crate::GuestErrorSink`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuestError {
    #[error("Invalid input pin index: {pin} (controller has {count})")]
    InvalidInputPin { pin: usize, count: usize },
    #[error("Invalid output pin index: {pin} (controller has {count})")]
    InvalidOutputPin { pin: usize, count: usize },
    #[error("Invalid source line {line} on input pin {pin} (gate has {count} lines)")]
    InvalidSourceLine { pin: usize, line: usize, count: usize },
    #[error("Out-of-bounds read at offset {0:#x}")]
    OutOfBoundsRead(u64),
    #[error("Out-of-bounds write at offset {0:#x}")]
    OutOfBoundsWrite(u64),
    #[error("Invalid data 0 written to status register at offset {0:#x}")]
    InvalidStatusAck(u64),
}
