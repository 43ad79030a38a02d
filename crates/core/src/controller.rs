// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::aggregator::InputAggregator;
use crate::error::GuestError;
use crate::pin::{EnableOutcome, LineUpdate, PinState};
use crate::profile::{Profile, RegisterRole};
use crate::registers::RegisterFile;
use crate::signals::{DigitalLevel, GuestErrorSink, IrqSink, TracingErrorSink};
use crate::snapshot::{ControllerSnapshot, PinSnapshot};
use crate::{check_access, Peripheral, SimResult, SimulationError};
use labwired_intc_config::{ProfileDescriptor, ProfileError};
use std::sync::Arc;
use tracing::{debug, trace};

/// One interrupt aggregation controller instance.
///
/// Owns its register file, pin state and OR gates exclusively. Every
/// operation completes synchronously; output changes reach the sink before
/// the call returns. Callers with several event producers must serialize
/// access themselves.
#[derive(Debug)]
pub struct Controller {
    profile: Arc<Profile>,
    name: String,
    regs: RegisterFile,
    pins: Vec<PinState>,
    inputs: InputAggregator,
    outputs: Box<dyn IrqSink>,
    errors: Box<dyn GuestErrorSink>,
}

impl Controller {
    pub fn new(profile: Arc<Profile>, outputs: Box<dyn IrqSink>) -> Self {
        let name = profile.name().to_string();
        Self {
            regs: RegisterFile::new(profile.reg_size()),
            pins: vec![PinState::default(); profile.num_inpins()],
            inputs: InputAggregator::new(profile.num_inpins(), profile.num_lines()),
            profile,
            name,
            outputs,
            errors: Box::new(TracingErrorSink),
        }
    }

    pub fn from_descriptor(
        desc: &ProfileDescriptor,
        outputs: Box<dyn IrqSink>,
    ) -> Result<Self, ProfileError> {
        Ok(Self::new(Arc::new(Profile::from_descriptor(desc)?), outputs))
    }

    pub fn with_error_sink(mut self, errors: Box<dyn GuestErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    /// Instance name used in logs and error reports. Defaults to the profile name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn report(&self, error: GuestError) {
        self.errors.report(&self.name, &error);
    }

    /// Drives one raw source line of `inpin` and forwards the OR gate output.
    pub fn set_source_line(&mut self, inpin: usize, line: usize, level: bool) {
        match self.inputs.set_line(inpin, line, level) {
            Ok(out) => self.assert_source(inpin, out),
            Err(e) => self.report(e),
        }
    }

    /// Replaces all raw source levels of `inpin` at once, as if the lines
    /// changed simultaneously.
    pub fn set_source_levels(&mut self, inpin: usize, levels: u32) {
        match self.inputs.set_levels(inpin, levels) {
            Ok(out) => self.assert_source(inpin, out),
            Err(e) => self.report(e),
        }
    }

    /// OR gate output of `inpin` changed to `level`.
    ///
    /// Only assertion does anything: the raised-and-enabled source bits are
    /// delivered or queued. Deassertion is a no-op.
    pub fn assert_source(&mut self, inpin: usize, level: bool) {
        let profile = Arc::clone(&self.profile);
        let Some(route) = profile.route(inpin) else {
            self.report(GuestError::InvalidInputPin {
                pin: inpin,
                count: profile.num_inpins(),
            });
            return;
        };

        trace!("{}: set_irq inpin {} level {}", self.name, inpin, level);
        if !level {
            return;
        }

        let select = self.inputs.select(inpin, self.pins[inpin].enable);
        if select == 0 {
            return;
        }
        trace!("{}: select {:#010x}", self.name, select);

        let Some(status) = self.regs.word_mut(route.status_addr) else {
            return;
        };
        let outcome = self.pins[inpin].trigger(route, status, select);
        let status = *status;

        if outcome.queued != 0 {
            debug!(
                "{}: inpin {} pending {:#010x}",
                self.name, inpin, self.pins[inpin].pending
            );
        }
        if outcome.delivered != 0 {
            debug!(
                "{}: trigger inpin {} ({}) status {:#010x}",
                self.name,
                inpin,
                route.label(),
                status
            );
        }
        self.apply(inpin, &outcome.updates);
    }

    fn apply(&mut self, inpin: usize, updates: &[LineUpdate]) {
        for update in updates {
            self.update_output(inpin, update.outpin, update.level);
        }
    }

    fn update_output(&mut self, inpin: usize, outpin: usize, level: DigitalLevel) {
        if outpin >= self.profile.num_outpins() {
            self.report(GuestError::InvalidOutputPin {
                pin: outpin,
                count: self.profile.num_outpins(),
            });
            return;
        }
        debug!(
            "{}: update inpin {} outpin {} level {:?}",
            self.name, inpin, outpin, level
        );
        self.outputs.set_output(outpin, level);
    }

    /// 32-bit register read. Out-of-range offsets read as zero.
    pub fn mmio_read(&self, offset: u64) -> u32 {
        if !self.regs.contains(offset) {
            self.report(GuestError::OutOfBoundsRead(offset));
            return 0;
        }
        let value = self.regs.load(RegisterFile::word_index(offset));
        trace!("{}: read {:#x} -> {:#010x}", self.name, offset, value);
        value
    }

    /// 32-bit register write, decoded by the profile's route table.
    pub fn mmio_write(&mut self, offset: u64, value: u32) {
        if !self.regs.contains(offset) {
            self.report(GuestError::OutOfBoundsWrite(offset));
            return;
        }
        trace!("{}: write {:#x} <- {:#010x}", self.name, offset, value);

        let addr = RegisterFile::word_index(offset);
        match self.profile.decode(addr) {
            Some(RegisterRole::Enable(inpin)) => self.write_enable(inpin, addr, value),
            Some(RegisterRole::Status(inpin)) => self.write_status(inpin, offset, value),
            None => self.regs.store(addr, value),
        }
    }

    fn write_enable(&mut self, inpin: usize, addr: usize, data: u32) {
        let Some(reg) = self.regs.word_mut(addr) else {
            return;
        };
        match self.pins[inpin].write_enable(reg, data) {
            EnableOutcome::Cleared => {}
            EnableOutcome::Armed { enable } => {
                debug!("{}: inpin {} enable {:#010x}", self.name, inpin, enable);
            }
            EnableOutcome::MaskUpdated {
                unmasked,
                masked,
                mask,
            } => {
                if unmasked != 0 {
                    debug!(
                        "{}: inpin {} unmask {:#010x} now {:#010x}",
                        self.name, inpin, unmasked, mask
                    );
                }
                if masked != 0 {
                    debug!(
                        "{}: inpin {} mask {:#010x} now {:#010x}",
                        self.name, inpin, masked, mask
                    );
                }
            }
        }
    }

    fn write_status(&mut self, inpin: usize, offset: u64, data: u32) {
        if data == 0 {
            self.report(GuestError::InvalidStatusAck(offset));
            return;
        }

        let profile = Arc::clone(&self.profile);
        let Some(route) = profile.route(inpin) else {
            return;
        };
        let Some(reg) = self.regs.word_mut(route.status_addr) else {
            return;
        };
        let outcome = self.pins[inpin].acknowledge(route, reg, data);
        if outcome.reinit {
            debug!("{}: inpin {} status reinitialized", self.name, inpin);
            return;
        }

        if !outcome.updates.is_empty() {
            trace!("{}: inpin {} all isr done", self.name, inpin);
        }
        if outcome.promoted != 0 {
            debug!(
                "{}: inpin {} promoted pending {:#010x}",
                self.name, inpin, outcome.promoted
            );
        }
        self.apply(inpin, &outcome.updates);
    }

    /// Zeroes registers and pin state. Output lines are left as they are and
    /// OR gate inputs keep following their sources.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.pins.fill(PinState::default());
        debug!("{}: reset", self.name);
    }

    pub fn enable(&self, inpin: usize) -> u32 {
        self.pins.get(inpin).map(|p| p.enable).unwrap_or(0)
    }

    pub fn mask(&self, inpin: usize) -> u32 {
        self.pins.get(inpin).map(|p| p.mask).unwrap_or(0)
    }

    pub fn pending(&self, inpin: usize) -> u32 {
        self.pins.get(inpin).map(|p| p.pending).unwrap_or(0)
    }

    /// Current status word of `inpin`, as firmware would read it.
    pub fn status(&self, inpin: usize) -> u32 {
        self.profile
            .route(inpin)
            .map(|r| self.regs.load(r.status_addr))
            .unwrap_or(0)
    }

    /// Raw OR gate input levels of `inpin`.
    pub fn levels(&self, inpin: usize) -> u32 {
        self.inputs.levels(inpin)
    }

    pub fn snapshot_state(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            profile: self.profile.name().to_string(),
            registers: self.regs.non_zero().collect(),
            pins: self
                .pins
                .iter()
                .enumerate()
                .map(|(i, p)| PinSnapshot {
                    enable: p.enable,
                    mask: p.mask,
                    pending: p.pending,
                    levels: self.inputs.levels(i),
                })
                .collect(),
        }
    }

    /// Loads state captured from a controller with the same profile shape.
    /// Output lines are not re-driven.
    pub fn restore_state(&mut self, snapshot: &ControllerSnapshot) -> SimResult<()> {
        if snapshot.profile != self.profile.name() {
            return Err(SimulationError::SnapshotMismatch(format!(
                "profile '{}' restored into '{}'",
                snapshot.profile,
                self.profile.name()
            )));
        }
        if snapshot.pins.len() != self.pins.len() {
            return Err(SimulationError::SnapshotMismatch(format!(
                "{} pins restored into {}",
                snapshot.pins.len(),
                self.pins.len()
            )));
        }
        if let Some(offset) = snapshot
            .registers
            .keys()
            .find(|o| **o % 4 != 0 || !self.regs.contains(**o))
        {
            return Err(SimulationError::SnapshotMismatch(format!(
                "register offset {:#x} outside register space",
                offset
            )));
        }

        let lines = if self.profile.num_lines() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.profile.num_lines()) - 1
        };
        for (i, p) in snapshot.pins.iter().enumerate() {
            // Multi routes only ever queue bits below their fanout.
            let reachable = match self.profile.route(i) {
                Some(route) if route.is_multi() && route.fanout < 32 => {
                    lines & ((1u32 << route.fanout) - 1)
                }
                _ => lines,
            };
            if p.pending & !reachable != 0 {
                return Err(SimulationError::SnapshotMismatch(format!(
                    "inpin {} pending {:#010x} outside {:#010x}",
                    i, p.pending, reachable
                )));
            }
            if p.levels & !lines != 0 {
                return Err(SimulationError::SnapshotMismatch(format!(
                    "inpin {} levels {:#010x} outside {:#010x}",
                    i, p.levels, lines
                )));
            }
        }

        self.regs.reset();
        for (offset, value) in &snapshot.registers {
            self.regs.store(RegisterFile::word_index(*offset), *value);
        }
        for (i, p) in snapshot.pins.iter().enumerate() {
            self.pins[i] = PinState {
                enable: p.enable,
                mask: p.mask,
                pending: p.pending,
            };
            // Pin count was checked above.
            let _ = self.inputs.set_levels(i, p.levels);
        }
        Ok(())
    }
}

impl Peripheral for Controller {
    fn read(&self, offset: u64, size: u32) -> SimResult<u32> {
        check_access(offset, size)?;
        Ok(self.mmio_read(offset))
    }

    fn write(&mut self, offset: u64, size: u32, value: u32) -> SimResult<()> {
        check_access(offset, size)?;
        self.mmio_write(offset, value);
        Ok(())
    }

    fn reset(&mut self) {
        Controller::reset(self);
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot_state()).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let snapshot: ControllerSnapshot = serde_json::from_value(state)
            .map_err(|e| SimulationError::SnapshotMismatch(e.to_string()))?;
        self.restore_state(&snapshot)
    }
}
