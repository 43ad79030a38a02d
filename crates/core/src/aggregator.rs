// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::error::GuestError;

/// OR gate over up to 32 raw source lines, one bit per line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrGate {
    levels: u32,
}

impl OrGate {
    pub fn set_line(&mut self, line: usize, high: bool) {
        if high {
            self.levels |= 1 << line;
        } else {
            self.levels &= !(1 << line);
        }
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn output(&self) -> bool {
        self.levels != 0
    }
}

/// One OR gate per input pin.
#[derive(Debug, Clone)]
pub struct InputAggregator {
    gates: Vec<OrGate>,
    num_lines: usize,
}

impl InputAggregator {
    pub fn new(num_inpins: usize, num_lines: usize) -> Self {
        Self {
            gates: vec![OrGate::default(); num_inpins],
            num_lines: num_lines.min(32),
        }
    }

    fn line_mask(&self) -> u32 {
        if self.num_lines >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_lines) - 1
        }
    }

    /// Drives one source line and returns the gate's new output.
    pub fn set_line(&mut self, inpin: usize, line: usize, high: bool) -> Result<bool, GuestError> {
        let count = self.gates.len();
        let num_lines = self.num_lines;
        let gate = self
            .gates
            .get_mut(inpin)
            .ok_or(GuestError::InvalidInputPin { pin: inpin, count })?;
        if line >= num_lines {
            return Err(GuestError::InvalidSourceLine {
                pin: inpin,
                line,
                count: num_lines,
            });
        }
        gate.set_line(line, high);
        Ok(gate.output())
    }

    /// Replaces all line levels of one gate at once. Bits past `num_lines` are ignored.
    pub fn set_levels(&mut self, inpin: usize, levels: u32) -> Result<bool, GuestError> {
        let count = self.gates.len();
        let mask = self.line_mask();
        let gate = self
            .gates
            .get_mut(inpin)
            .ok_or(GuestError::InvalidInputPin { pin: inpin, count })?;
        gate.levels = levels & mask;
        Ok(gate.output())
    }

    pub fn levels(&self, inpin: usize) -> u32 {
        self.gates.get(inpin).map(OrGate::levels).unwrap_or(0)
    }

    /// Raised source bits that are also enabled.
    pub fn select(&self, inpin: usize, enable: u32) -> u32 {
        self.levels(inpin) & enable & self.line_mask()
    }

    pub fn num_inpins(&self) -> usize {
        self.gates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_gate_tracks_lines() {
        let mut gate = OrGate::default();
        assert!(!gate.output());
        gate.set_line(0, true);
        gate.set_line(31, true);
        assert_eq!(gate.levels(), 0x8000_0001);
        gate.set_line(0, false);
        assert!(gate.output());
        gate.set_line(31, false);
        assert!(!gate.output());
    }

    #[test]
    fn test_select_requires_enable() {
        let mut agg = InputAggregator::new(2, 32);
        agg.set_line(1, 2, true).unwrap();
        agg.set_line(1, 5, true).unwrap();
        assert_eq!(agg.select(1, 0x20), 0x20);
        assert_eq!(agg.select(1, 0x1), 0);
        assert_eq!(agg.select(0, u32::MAX), 0);
    }

    #[test]
    fn test_bad_indices_are_guest_errors() {
        let mut agg = InputAggregator::new(6, 32);
        assert_eq!(
            agg.set_line(6, 0, true),
            Err(GuestError::InvalidInputPin { pin: 6, count: 6 })
        );
        assert_eq!(
            agg.set_line(0, 32, true),
            Err(GuestError::InvalidSourceLine {
                pin: 0,
                line: 32,
                count: 32
            })
        );
        assert_eq!(agg.levels(0), 0);
    }

    #[test]
    fn test_narrow_gate_masks_levels() {
        let mut agg = InputAggregator::new(1, 4);
        assert!(agg.set_levels(0, 0xF0).is_ok_and(|out| !out));
        assert_eq!(agg.levels(0), 0);
        assert!(agg.set_levels(0, 0xFF).unwrap());
        assert_eq!(agg.levels(0), 0xF);
    }
}
