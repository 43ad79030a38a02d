// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Several controllers on one bus, with output lines cascaded into other
//! controllers' source lines.

use crate::controller::Controller;
use crate::error::GuestError;
use crate::profile::Profile;
use crate::signals::{DigitalLevel, GuestErrorSink, IrqSink, LineEvent, TracingErrorSink};
use crate::snapshot::SystemSnapshot;
use crate::SimResult;
use anyhow::Context;
use labwired_intc_config::{resolve_profile, SystemManifest};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Upper bound on line events forwarded within one step.
const MAX_PROPAGATION: usize = 4096;

type EventQueue = Arc<Mutex<VecDeque<(usize, LineEvent)>>>;

/// Output sink handed to each controller: queues the change for the system
/// to route before the current step returns.
#[derive(Debug)]
struct QueueSink {
    index: usize,
    queue: EventQueue,
}

impl IrqSink for QueueSink {
    fn set_output(&mut self, line: usize, level: DigitalLevel) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back((self.index, LineEvent { line, level }));
        }
    }
}

/// Receives output changes that are not linked to another controller.
pub trait SystemIrqSink: std::fmt::Debug + Send {
    fn set_output(&mut self, controller: &str, line: usize, level: DigitalLevel);
}

impl SystemIrqSink for crate::signals::NullSink {
    fn set_output(&mut self, _controller: &str, _line: usize, _level: DigitalLevel) {}
}

pub struct ControllerEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Controller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkTarget {
    controller: usize,
    inpin: usize,
    line: usize,
}

pub struct IntcSystem {
    pub name: String,
    pub controllers: Vec<ControllerEntry>,
    links: HashMap<(usize, usize), LinkTarget>,
    queue: EventQueue,
    levels: HashMap<(usize, usize), DigitalLevel>,
    external: Box<dyn SystemIrqSink>,
    errors: Box<dyn GuestErrorSink>,
}

impl IntcSystem {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            controllers: Vec::new(),
            links: HashMap::new(),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            levels: HashMap::new(),
            external: Box::new(crate::signals::NullSink),
            errors: Box::new(TracingErrorSink),
        }
    }

    /// Maps a controller at `base`. Windows may not overlap.
    pub fn add_controller(&mut self, name: &str, base: u64, profile: Profile) -> anyhow::Result<()> {
        if self.index_of(name).is_some() {
            anyhow::bail!("Duplicate controller id '{}'", name);
        }
        let size = profile.mem_size();
        let end = base
            .checked_add(size)
            .with_context(|| format!("Controller '{}' window overflows the bus", name))?;
        if let Some(other) = self
            .controllers
            .iter()
            .find(|c| base < c.base + c.size && c.base < end)
        {
            anyhow::bail!(
                "Controller '{}' at {:#x} overlaps '{}' at {:#x}",
                name,
                base,
                other.name,
                other.base
            );
        }

        let sink = QueueSink {
            index: self.controllers.len(),
            queue: Arc::clone(&self.queue),
        };
        let dev = Controller::new(Arc::new(profile), Box::new(sink)).with_name(name);
        self.controllers.push(ControllerEntry {
            name: name.to_string(),
            base,
            size,
            dev,
        });
        Ok(())
    }

    /// Routes `from`'s output line into a source line of `to`.
    pub fn link(
        &mut self,
        from: &str,
        outpin: usize,
        to: &str,
        inpin: usize,
        line: usize,
    ) -> anyhow::Result<()> {
        let src = self
            .index_of(from)
            .with_context(|| format!("Unknown controller '{}'", from))?;
        let dst = self
            .index_of(to)
            .with_context(|| format!("Unknown controller '{}'", to))?;
        if src == dst {
            anyhow::bail!("Controller '{}' cannot be linked to itself", from);
        }

        let src_profile = self.controllers[src].dev.profile();
        if outpin >= src_profile.num_outpins() {
            anyhow::bail!("'{}' has no output pin {}", from, outpin);
        }
        let dst_profile = self.controllers[dst].dev.profile();
        if inpin >= dst_profile.num_inpins() || line >= dst_profile.num_lines() {
            anyhow::bail!("'{}' has no source line {} on input pin {}", to, line, inpin);
        }

        if self.links.contains_key(&(src, outpin)) {
            anyhow::bail!("Output {} of '{}' is linked twice", outpin, from);
        }
        self.links.insert(
            (src, outpin),
            LinkTarget {
                controller: dst,
                inpin,
                line,
            },
        );
        Ok(())
    }

    pub fn from_manifest(manifest: &SystemManifest, base_dir: &Path) -> anyhow::Result<Self> {
        manifest.validate()?;
        manifest.validate_layout(base_dir)?;
        let mut system = Self::empty(&manifest.name);

        for c in &manifest.controllers {
            let desc = resolve_profile(&c.profile, base_dir)
                .with_context(|| format!("Failed to load profile for '{}'", c.id))?;
            let profile = Profile::from_descriptor(&desc)?;
            info!(
                "Mapping {} ({}) at {:#x}",
                c.id,
                profile.name(),
                c.base_address
            );
            system.add_controller(&c.id, c.base_address, profile)?;
        }

        for l in &manifest.links {
            system.link(
                &l.from.controller,
                l.from.outpin as usize,
                &l.to.controller,
                l.to.inpin as usize,
                l.to.line as usize,
            )?;
        }

        Ok(system)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Loading system manifest: {:?}", path);
        let manifest = SystemManifest::from_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest(&manifest, base_dir)
    }

    /// INTC0 and INTC1 as wired on the AST2700: INTC1 output `i` feeds
    /// line `i` of INTC0's GICINT192_201 aggregator.
    pub fn ast2700() -> anyhow::Result<Self> {
        let mut system = Self::empty("ast2700");
        system.add_controller("intc0", 0x1210_0000, Profile::ast2700_intc0())?;
        system.add_controller("intc1", 0x14C1_8000, Profile::ast2700_intc1())?;
        for i in 0..6 {
            system.link("intc1", i, "intc0", 0, i)?;
        }
        Ok(system)
    }

    pub fn with_external_sink(mut self, sink: Box<dyn SystemIrqSink>) -> Self {
        self.external = sink;
        self
    }

    pub fn with_error_sink<S>(mut self, errors: S) -> Self
    where
        S: GuestErrorSink + Clone + 'static,
    {
        self.errors = Box::new(errors.clone());
        let controllers = std::mem::take(&mut self.controllers);
        self.controllers = controllers
            .into_iter()
            .map(|mut c| {
                c.dev = c.dev.with_error_sink(Box::new(errors.clone()));
                c
            })
            .collect();
        self
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.controllers.iter().position(|c| c.name == name)
    }

    pub fn controller(&self, name: &str) -> Option<&Controller> {
        self.controllers
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.dev)
    }

    fn find(&self, addr: u64) -> Option<usize> {
        self.controllers
            .iter()
            .position(|c| addr >= c.base && addr < c.base + c.size)
    }

    pub fn read(&self, addr: u64) -> u32 {
        match self.find(addr) {
            Some(i) => {
                let c = &self.controllers[i];
                c.dev.mmio_read(addr - c.base)
            }
            None => {
                self.errors
                    .report(&self.name, &GuestError::OutOfBoundsRead(addr));
                0
            }
        }
    }

    pub fn write(&mut self, addr: u64, value: u32) {
        match self.find(addr) {
            Some(i) => {
                let c = &mut self.controllers[i];
                c.dev.mmio_write(addr - c.base, value);
                self.propagate();
            }
            None => self
                .errors
                .report(&self.name, &GuestError::OutOfBoundsWrite(addr)),
        }
    }

    pub fn set_source_line(
        &mut self,
        controller: &str,
        inpin: usize,
        line: usize,
        level: bool,
    ) -> anyhow::Result<()> {
        let i = self
            .index_of(controller)
            .with_context(|| format!("Unknown controller '{}'", controller))?;
        self.controllers[i].dev.set_source_line(inpin, line, level);
        self.propagate();
        Ok(())
    }

    pub fn assert_source(&mut self, controller: &str, inpin: usize, level: bool) -> anyhow::Result<()> {
        let i = self
            .index_of(controller)
            .with_context(|| format!("Unknown controller '{}'", controller))?;
        self.controllers[i].dev.assert_source(inpin, level);
        self.propagate();
        Ok(())
    }

    /// Last level driven on a controller's output line.
    pub fn output_level(&self, controller: &str, line: usize) -> DigitalLevel {
        self.index_of(controller)
            .and_then(|i| self.levels.get(&(i, line)).copied())
            .unwrap_or_default()
    }

    /// Resets every controller. Output levels and gate inputs are untouched.
    pub fn reset(&mut self) {
        for c in &mut self.controllers {
            c.dev.reset();
        }
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            controllers: self
                .controllers
                .iter()
                .map(|c| (c.name.clone(), c.dev.snapshot_state()))
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: &SystemSnapshot) -> SimResult<()> {
        for c in &mut self.controllers {
            if let Some(state) = snapshot.controllers.get(&c.name) {
                c.dev.restore_state(state)?;
            }
        }
        Ok(())
    }

    fn pop_event(&self) -> Option<(usize, LineEvent)> {
        self.queue.lock().ok().and_then(|mut q| q.pop_front())
    }

    /// Routes queued output changes until the cascade settles.
    fn propagate(&mut self) {
        let mut forwarded = 0;
        while let Some((src, event)) = self.pop_event() {
            forwarded += 1;
            if forwarded > MAX_PROPAGATION {
                warn!(
                    "{}: interrupt cascade did not settle after {} events",
                    self.name, MAX_PROPAGATION
                );
                if let Ok(mut q) = self.queue.lock() {
                    q.clear();
                }
                return;
            }

            self.levels.insert((src, event.line), event.level);
            match self.links.get(&(src, event.line)).copied() {
                Some(target) => {
                    self.controllers[target.controller].dev.set_source_line(
                        target.inpin,
                        target.line,
                        event.level.is_high(),
                    );
                }
                None => {
                    let name = &self.controllers[src].name;
                    self.external.set_output(name, event.line, event.level);
                }
            }
        }
    }
}
