// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use labwired_intc_config::{ProfileDescriptor, ProfileError};
use std::collections::HashMap;
use std::ops::Range;

/// Routing of one input pin. Register addresses are word indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqRoute {
    pub name: Option<String>,
    pub inpin: usize,
    pub outpin: usize,
    pub fanout: usize,
    pub enable_addr: usize,
    pub status_addr: usize,
}

impl IrqRoute {
    /// A fan-out pin drives output `outpin + i` from source bit `i`.
    pub fn is_multi(&self) -> bool {
        self.fanout > 1
    }

    pub fn outpins(&self) -> Range<usize> {
        self.outpin..self.outpin + self.fanout
    }

    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("inpin{}", self.inpin))
    }
}

/// What a register word means to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRole {
    Enable(usize),
    Status(usize),
}

/// Immutable per-variant configuration.
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    id: u32,
    description: Option<String>,
    num_lines: usize,
    num_inpins: usize,
    num_outpins: usize,
    mem_size: u64,
    reg_size: u64,
    routes: Vec<IrqRoute>,
    decode: HashMap<usize, RegisterRole>,
}

impl Profile {
    /// Validates the descriptor and builds the decode table.
    pub fn from_descriptor(desc: &ProfileDescriptor) -> Result<Self, ProfileError> {
        desc.validate()?;
        Ok(Self::build(desc))
    }

    fn build(desc: &ProfileDescriptor) -> Self {
        let routes: Vec<IrqRoute> = desc
            .routes
            .iter()
            .map(|r| IrqRoute {
                name: r.name.clone(),
                inpin: r.inpin as usize,
                outpin: r.outpin as usize,
                fanout: r.fanout as usize,
                enable_addr: (r.enable >> 2) as usize,
                status_addr: (r.status >> 2) as usize,
            })
            .collect();

        let mut decode = HashMap::with_capacity(routes.len() * 2);
        for route in &routes {
            decode.insert(route.enable_addr, RegisterRole::Enable(route.inpin));
            decode.insert(route.status_addr, RegisterRole::Status(route.inpin));
        }

        Self {
            name: desc.name.clone(),
            id: desc.id,
            description: desc.description.clone(),
            num_lines: desc.num_lines as usize,
            num_inpins: desc.num_inpins as usize,
            num_outpins: desc.num_outpins as usize,
            mem_size: desc.mem_size_bytes().unwrap_or(desc.reg_size),
            reg_size: desc.reg_size,
            routes,
            decode,
        }
    }

    /// 10 inputs, 19 outputs, 8 KiB of registers.
    pub fn ast2700_intc0() -> Self {
        Self::build(&ProfileDescriptor::ast2700_intc0())
    }

    /// 6 inputs, 6 outputs, strictly 1:1.
    pub fn ast2700_intc1() -> Self {
        Self::build(&ProfileDescriptor::ast2700_intc1())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn num_lines(&self) -> usize {
        self.num_lines
    }

    pub fn num_inpins(&self) -> usize {
        self.num_inpins
    }

    pub fn num_outpins(&self) -> usize {
        self.num_outpins
    }

    /// Size of the MMIO window the controller occupies on a bus.
    pub fn mem_size(&self) -> u64 {
        self.mem_size
    }

    /// Bytes of decoded register space; accesses at or past this are rejected.
    pub fn reg_size(&self) -> u64 {
        self.reg_size
    }

    pub fn routes(&self) -> &[IrqRoute] {
        &self.routes
    }

    pub fn route(&self, inpin: usize) -> Option<&IrqRoute> {
        self.routes.get(inpin)
    }

    /// Role of the register at word address `addr`, if any route claims it.
    pub fn decode(&self, addr: usize) -> Option<RegisterRole> {
        self.decode.get(&addr).copied()
    }
}

impl TryFrom<&ProfileDescriptor> for Profile {
    type Error = ProfileError;

    fn try_from(desc: &ProfileDescriptor) -> Result<Self, Self::Error> {
        Self::from_descriptor(desc)
    }
}
