// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Executes scenario scripts against a single controller or a wired system.

use anyhow::Context;
use labwired_intc_config::{
    resolve_profile, OutputExpectation, ReadDetails, ScenarioScript, ScenarioStep,
    StateExpectation, StepKeyword,
};
use labwired_intc_core::signals::ErrorRecorder;
use labwired_intc_core::snapshot::SystemSnapshot;
use labwired_intc_core::system::IntcSystem;
use labwired_intc_core::{Controller, DigitalLevel, LineRecorder, Profile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

enum Target {
    Controller {
        ctrl: Box<Controller>,
        lines: LineRecorder,
    },
    System(Box<IntcSystem>),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Zero-based index into the script's steps.
    pub step: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub steps_executed: usize,
    pub failures: Vec<StepFailure>,
    pub guest_errors: usize,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ScenarioRunner {
    target: Target,
    errors: ErrorRecorder,
}

impl ScenarioRunner {
    pub fn for_profile(profile: Profile) -> Self {
        let lines = LineRecorder::new();
        let errors = ErrorRecorder::new();
        let ctrl = Controller::new(Arc::new(profile), Box::new(lines.clone()))
            .with_error_sink(Box::new(errors.clone()));
        Self {
            target: Target::Controller {
                ctrl: Box::new(ctrl),
                lines,
            },
            errors,
        }
    }

    pub fn for_system(system: IntcSystem) -> Self {
        let errors = ErrorRecorder::new();
        let system = system.with_error_sink(errors.clone());
        Self {
            target: Target::System(Box::new(system)),
            errors,
        }
    }

    /// Builds the model a script names. Relative paths resolve against the
    /// script's directory.
    pub fn for_script(script: &ScenarioScript, script_path: &Path) -> anyhow::Result<Self> {
        let base_dir = script_path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(reference) = &script.profile {
            let desc = resolve_profile(reference, base_dir)?;
            let profile = Profile::from_descriptor(&desc)
                .with_context(|| format!("Invalid profile '{}'", reference))?;
            info!("Scenario target: controller {}", profile.name());
            return Ok(Self::for_profile(profile));
        }
        if let Some(system) = &script.system {
            let system = IntcSystem::from_file(base_dir.join(system))?;
            info!("Scenario target: system {}", system.name);
            return Ok(Self::for_system(system));
        }
        anyhow::bail!("Scenario must name either a 'profile' or a 'system'")
    }

    pub fn guest_errors(&self) -> usize {
        self.errors.count()
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        match &self.target {
            Target::Controller { ctrl, .. } => SystemSnapshot {
                controllers: BTreeMap::from([(ctrl.name().to_string(), ctrl.snapshot_state())]),
            },
            Target::System(system) => system.snapshot(),
        }
    }

    /// Runs every step. Expectation mismatches are collected; a step that
    /// cannot be executed at all aborts the run with an error.
    pub fn run(&mut self, steps: &[ScenarioStep]) -> anyhow::Result<RunReport> {
        let mut report = RunReport::default();
        for (index, step) in steps.iter().enumerate() {
            let outcome = self
                .step(step)
                .with_context(|| format!("Step {} failed to execute", index))?;
            report.steps_executed += 1;
            if let Some(message) = outcome {
                info!("Step {}: expectation failed: {}", index, message);
                report.failures.push(StepFailure {
                    step: index,
                    message,
                });
            }
        }
        report.guest_errors = self.guest_errors();
        Ok(report)
    }

    /// Executes one step; returns a message when an expectation did not hold.
    fn step(&mut self, step: &ScenarioStep) -> anyhow::Result<Option<String>> {
        debug!("step: {:?}", step);
        match step {
            ScenarioStep::Keyword(StepKeyword::Reset) => {
                match &mut self.target {
                    Target::Controller { ctrl, .. } => ctrl.reset(),
                    Target::System(system) => system.reset(),
                }
                Ok(None)
            }
            ScenarioStep::SourceLine(s) => {
                let d = &s.source_line;
                let (inpin, line) = (d.inpin as usize, d.line as usize);
                match &mut self.target {
                    Target::Controller { ctrl, .. } => {
                        check_name(ctrl, d.controller.as_deref())?;
                        ctrl.set_source_line(inpin, line, d.level);
                    }
                    Target::System(system) => {
                        let name = require_name(d.controller.as_deref())?;
                        system.set_source_line(name, inpin, line, d.level)?;
                    }
                }
                Ok(None)
            }
            ScenarioStep::Raise(s) => {
                let d = &s.raise;
                match &mut self.target {
                    Target::Controller { ctrl, .. } => {
                        check_name(ctrl, d.controller.as_deref())?;
                        ctrl.assert_source(d.inpin as usize, d.level);
                    }
                    Target::System(system) => {
                        let name = require_name(d.controller.as_deref())?;
                        system.assert_source(name, d.inpin as usize, d.level)?;
                    }
                }
                Ok(None)
            }
            ScenarioStep::Write(s) => {
                match &mut self.target {
                    Target::Controller { ctrl, .. } => ctrl.mmio_write(s.write.offset, s.write.value),
                    Target::System(system) => system.write(s.write.offset, s.write.value),
                }
                Ok(None)
            }
            ScenarioStep::Read(s) => Ok(self.read(&s.read)),
            ScenarioStep::ExpectOutput(s) => self.expect_output(&s.expect_output),
            ScenarioStep::ExpectState(s) => self.expect_state(&s.expect_state),
            ScenarioStep::ExpectGuestErrors(s) => {
                let seen = self.guest_errors();
                Ok((seen != s.expect_guest_errors).then(|| {
                    format!(
                        "expected {} guest errors, saw {}",
                        s.expect_guest_errors, seen
                    )
                }))
            }
        }
    }

    fn read(&self, d: &ReadDetails) -> Option<String> {
        let value = match &self.target {
            Target::Controller { ctrl, .. } => ctrl.mmio_read(d.offset),
            Target::System(system) => system.read(d.offset),
        };
        debug!("read {:#x} = {:#010x}", d.offset, value);
        match d.expect {
            Some(expected) if expected != value => Some(format!(
                "read {:#x}: expected {:#010x}, got {:#010x}",
                d.offset, expected, value
            )),
            _ => None,
        }
    }

    fn expect_output(&self, e: &OutputExpectation) -> anyhow::Result<Option<String>> {
        let line = e.line as usize;
        let level = match &self.target {
            Target::Controller { ctrl, lines } => {
                check_name(ctrl, e.controller.as_deref())?;
                lines.level(line)
            }
            Target::System(system) => {
                let name = require_name(e.controller.as_deref())?;
                if system.controller(name).is_none() {
                    anyhow::bail!("Unknown controller '{}'", name);
                }
                system.output_level(name, line)
            }
        };
        let expected = DigitalLevel::from(e.level);
        Ok((level != expected)
            .then(|| format!("output {}: expected {:?}, got {:?}", line, expected, level)))
    }

    fn expect_state(&self, e: &StateExpectation) -> anyhow::Result<Option<String>> {
        let ctrl = match &self.target {
            Target::Controller { ctrl, .. } => {
                check_name(ctrl, e.controller.as_deref())?;
                &**ctrl
            }
            Target::System(system) => {
                let name = require_name(e.controller.as_deref())?;
                system
                    .controller(name)
                    .with_context(|| format!("Unknown controller '{}'", name))?
            }
        };
        let inpin = e.inpin as usize;
        if ctrl.profile().route(inpin).is_none() {
            anyhow::bail!("'{}' has no input pin {}", ctrl.name(), inpin);
        }

        let checks = [
            ("enable", e.enable, ctrl.enable(inpin)),
            ("mask", e.mask, ctrl.mask(inpin)),
            ("pending", e.pending, ctrl.pending(inpin)),
            ("status", e.status, ctrl.status(inpin)),
        ];
        let mismatches: Vec<String> = checks
            .iter()
            .filter_map(|(field, expected, actual)| match expected {
                Some(v) if v != actual => Some(format!(
                    "{} expected {:#010x}, got {:#010x}",
                    field, v, actual
                )),
                _ => None,
            })
            .collect();

        if mismatches.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!(
                "{} inpin {}: {}",
                ctrl.name(),
                inpin,
                mismatches.join(", ")
            )))
        }
    }
}

fn check_name(ctrl: &Controller, name: Option<&str>) -> anyhow::Result<()> {
    match name {
        Some(n) if n != ctrl.name() => anyhow::bail!(
            "Step names controller '{}' but the scenario drives '{}'",
            n,
            ctrl.name()
        ),
        _ => Ok(()),
    }
}

fn require_name(name: Option<&str>) -> anyhow::Result<&str> {
    name.context("System scenarios must name a controller in every step")
}
