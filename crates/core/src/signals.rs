// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::error::GuestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    pub fn is_high(self) -> bool {
        self == DigitalLevel::High
    }
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Consumer of a controller's output lines (a downstream controller, a CPU
/// interrupt input, a test recorder).
///
/// Called synchronously from inside the step that changed the line.
pub trait IrqSink: Debug + Send {
    fn set_output(&mut self, line: usize, level: DigitalLevel);
}

/// Drops every output change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl IrqSink for NullSink {
    fn set_output(&mut self, _line: usize, _level: DigitalLevel) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEvent {
    pub line: usize,
    pub level: DigitalLevel,
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<LineEvent>,
    levels: BTreeMap<usize, DigitalLevel>,
}

/// Records every output change in order and tracks the latest level per line.
///
/// Clones share the same record, so a test can keep one handle while the
/// controller owns another.
#[derive(Debug, Clone, Default)]
pub struct LineRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl LineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LineEvent> {
        match self.state.lock() {
            Ok(state) => state.events.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns and forgets the events recorded so far. Levels are kept.
    pub fn take_events(&self) -> Vec<LineEvent> {
        match self.state.lock() {
            Ok(mut state) => std::mem::take(&mut state.events),
            Err(_) => Vec::new(),
        }
    }

    /// Latest level driven on `line`; lines never driven read low.
    pub fn level(&self, line: usize) -> DigitalLevel {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.levels.get(&line).copied())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.events.clear();
            state.levels.clear();
        }
    }
}

impl IrqSink for LineRecorder {
    fn set_output(&mut self, line: usize, level: DigitalLevel) {
        if let Ok(mut state) = self.state.lock() {
            state.events.push(LineEvent { line, level });
            state.levels.insert(line, level);
        }
    }
}

/// Destination for guest errors.
pub trait GuestErrorSink: Debug + Send {
    fn report(&self, source: &str, error: &GuestError);
}

/// Logs guest errors through `tracing` under the `guest_error` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl GuestErrorSink for TracingErrorSink {
    fn report(&self, source: &str, error: &GuestError) {
        tracing::warn!(target: "guest_error", "{}: {}", source, error);
    }
}

/// Collects guest errors for later inspection.
#[derive(Debug, Clone, Default)]
pub struct ErrorRecorder {
    errors: Arc<Mutex<Vec<GuestError>>>,
}

impl ErrorRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<GuestError> {
        match self.errors.lock() {
            Ok(errors) => errors.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.errors.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl GuestErrorSink for ErrorRecorder {
    fn report(&self, source: &str, error: &GuestError) {
        tracing::warn!(target: "guest_error", "{}: {}", source, error);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_level_conversions() {
        assert_eq!(DigitalLevel::default(), DigitalLevel::Low);
        assert_eq!(DigitalLevel::from(true), DigitalLevel::High);
        let b: bool = DigitalLevel::High.into();
        assert!(b);
        assert!(!DigitalLevel::Low.is_high());
    }

    #[test]
    fn test_line_recorder_shares_state_between_clones() {
        let recorder = LineRecorder::new();
        let mut sink = recorder.clone();
        sink.set_output(3, DigitalLevel::High);
        sink.set_output(3, DigitalLevel::Low);
        sink.set_output(7, DigitalLevel::High);

        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.level(3), DigitalLevel::Low);
        assert_eq!(recorder.level(7), DigitalLevel::High);
        assert_eq!(recorder.level(9), DigitalLevel::Low);

        let taken = recorder.take_events();
        assert_eq!(taken[0], LineEvent { line: 3, level: DigitalLevel::High });
        assert!(recorder.events().is_empty());
        assert_eq!(recorder.level(7), DigitalLevel::High);
    }

    #[test]
    fn test_error_recorder_counts() {
        let rec = ErrorRecorder::new();
        rec.report("intc0", &GuestError::OutOfBoundsRead(0x2000));
        rec.report("intc0", &GuestError::InvalidStatusAck(0x1004));
        assert_eq!(rec.count(), 2);
        assert_eq!(rec.errors()[1], GuestError::InvalidStatusAck(0x1004));
    }
}
