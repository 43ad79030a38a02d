// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_num_lines() -> u32 {
    32
}

fn default_fanout() -> u32 {
    1
}

/// Widest source-line vector an input pin can aggregate.
pub const MAX_LINES: u32 = 32;

/// Names accepted by [`builtin_profile`].
pub const BUILTIN_PROFILES: &[&str] = &["ast2700-intc0", "ast2700-intc1"];

/// One row of a controller's IRQ routing table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    pub inpin: u32,
    pub outpin: u32,
    #[serde(default = "default_fanout")]
    pub fanout: u32,
    /// Byte offset of the enable register.
    pub enable: u64,
    /// Byte offset of the status register.
    pub status: u64,
}

/// Static description of one controller variant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProfileDescriptor {
    pub name: String,
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_num_lines")]
    pub num_lines: u32,
    pub num_inpins: u32,
    pub num_outpins: u32,
    pub mem_size: String, // e.g. "16KiB"
    pub reg_size: u64,
    pub routes: Vec<RouteDescriptor>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("num_lines must be between 1 and {max}, got {got}")]
    InvalidLineCount { got: u32, max: u32 },
    #[error("profile needs at least one input and one output pin")]
    NoPins,
    #[error("invalid mem_size '{0}'")]
    InvalidMemSize(String),
    #[error("reg_size {reg_size:#x} must be non-zero, word aligned and fit in mem_size {mem_size:#x}")]
    InvalidRegSize { reg_size: u64, mem_size: u64 },
    #[error("expected {expected} routes (one per input pin), found {found}")]
    RouteCount { expected: u32, found: usize },
    #[error("route #{position} is for input pin {inpin}; routes must be listed in input pin order")]
    RouteOrder { position: usize, inpin: u32 },
    #[error("input pin {inpin}: fanout {fanout} must be between 1 and num_lines")]
    InvalidFanout { inpin: u32, fanout: u32 },
    #[error("input pin {inpin}: outputs {outpin}..{end} exceed num_outpins {num_outpins}")]
    OutputRange {
        inpin: u32,
        outpin: u32,
        end: u32,
        num_outpins: u32,
    },
    #[error("input pin {inpin}: register offset {offset:#x} is unaligned or outside reg_size")]
    BadRegister { inpin: u32, offset: u64 },
    #[error("register offset {offset:#x} is claimed by more than one route")]
    DuplicateRegister { offset: u64 },
}

impl ProfileDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile at {:?}", path))?;

        let profile: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse profile JSON from {:?}", path))?
        } else {
            serde_yaml::from_str(&content).context("Failed to parse Profile Descriptor YAML")?
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let profile: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Profile Descriptor YAML")?;
        profile.validate()?;
        Ok(profile)
    }

    /// Size of the MMIO container in bytes.
    pub fn mem_size_bytes(&self) -> std::result::Result<u64, ProfileError> {
        parse_size(&self.mem_size).map_err(|_| ProfileError::InvalidMemSize(self.mem_size.clone()))
    }

    pub fn validate(&self) -> std::result::Result<(), ProfileError> {
        if self.num_lines == 0 || self.num_lines > MAX_LINES {
            return Err(ProfileError::InvalidLineCount {
                got: self.num_lines,
                max: MAX_LINES,
            });
        }
        if self.num_inpins == 0 || self.num_outpins == 0 {
            return Err(ProfileError::NoPins);
        }

        let mem_size = self.mem_size_bytes()?;
        if self.reg_size == 0 || self.reg_size % 4 != 0 || self.reg_size > mem_size {
            return Err(ProfileError::InvalidRegSize {
                reg_size: self.reg_size,
                mem_size,
            });
        }

        if self.routes.len() != self.num_inpins as usize {
            return Err(ProfileError::RouteCount {
                expected: self.num_inpins,
                found: self.routes.len(),
            });
        }

        let mut claimed = HashSet::new();
        for (position, route) in self.routes.iter().enumerate() {
            if route.inpin as usize != position {
                return Err(ProfileError::RouteOrder {
                    position,
                    inpin: route.inpin,
                });
            }
            if route.fanout == 0 || route.fanout > self.num_lines {
                return Err(ProfileError::InvalidFanout {
                    inpin: route.inpin,
                    fanout: route.fanout,
                });
            }
            let end = route.outpin.saturating_add(route.fanout);
            if end > self.num_outpins {
                return Err(ProfileError::OutputRange {
                    inpin: route.inpin,
                    outpin: route.outpin,
                    end,
                    num_outpins: self.num_outpins,
                });
            }
            for offset in [route.enable, route.status] {
                if offset % 4 != 0 || offset >= self.reg_size {
                    return Err(ProfileError::BadRegister {
                        inpin: route.inpin,
                        offset,
                    });
                }
                if !claimed.insert(offset) {
                    return Err(ProfileError::DuplicateRegister { offset });
                }
            }
        }

        Ok(())
    }

    /// AST2700 INTC0: ten input pins onto nineteen GIC lines.
    ///
    /// Input 0 aggregates GICINT192..201 and drives outputs 0..9 one bit per
    /// output. Inputs 1..9 are GICINT128..136, each OR'd onto outputs 10..18.
    pub fn ast2700_intc0() -> Self {
        let mut routes = vec![RouteDescriptor {
            name: Some("GICINT192_201".to_string()),
            inpin: 0,
            outpin: 0,
            fanout: 10,
            enable: 0x1B00,
            status: 0x1B04,
        }];
        routes.extend((0..9u32).map(|k| {
            let enable = 0x1000 + 0x100 * k as u64;
            RouteDescriptor {
                name: Some(format!("GICINT{}", 128 + k)),
                inpin: k + 1,
                outpin: k + 10,
                fanout: 1,
                enable,
                status: enable + 4,
            }
        }));

        Self {
            name: "ast2700-intc0".to_string(),
            id: 0,
            description: Some("ASPEED 2700 INTC 0 Controller".to_string()),
            num_lines: MAX_LINES,
            num_inpins: 10,
            num_outpins: 19,
            mem_size: "16KiB".to_string(),
            reg_size: 0x2000,
            routes,
        }
    }

    /// AST2700 INTC1: six GICINT192..197 aggregators, each 1:1 onto its own output.
    pub fn ast2700_intc1() -> Self {
        let routes = (0..6u32)
            .map(|k| {
                let enable = 0x100 + 0x10 * k as u64;
                RouteDescriptor {
                    name: Some(format!("GICINT{}", 192 + k)),
                    inpin: k,
                    outpin: k,
                    fanout: 1,
                    enable,
                    status: enable + 4,
                }
            })
            .collect();

        Self {
            name: "ast2700-intc1".to_string(),
            id: 1,
            description: Some("ASPEED 2700 INTC 1 Controller".to_string()),
            num_lines: MAX_LINES,
            num_inpins: 6,
            num_outpins: 6,
            mem_size: "1KiB".to_string(),
            reg_size: 0x3d8,
            routes,
        }
    }
}

/// Look up one of the profiles compiled into the crate.
pub fn builtin_profile(name: &str) -> Option<ProfileDescriptor> {
    match name {
        "ast2700-intc0" => Some(ProfileDescriptor::ast2700_intc0()),
        "ast2700-intc1" => Some(ProfileDescriptor::ast2700_intc1()),
        _ => None,
    }
}

/// Resolve a profile reference: a built-in name, or a file path relative to `base_dir`.
pub fn resolve_profile(reference: &str, base_dir: &Path) -> Result<ProfileDescriptor> {
    if let Some(profile) = builtin_profile(reference) {
        return Ok(profile);
    }
    let path = base_dir.join(reference);
    tracing::debug!("Loading profile from {:?}", path);
    ProfileDescriptor::from_file(&path)
        .with_context(|| format!("'{}' is neither a built-in profile nor a loadable file", reference))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ControllerInstance {
    pub id: String,
    pub profile: String, // built-in name or path relative to the manifest
    pub base_address: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkSource {
    pub controller: String,
    pub outpin: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkTarget {
    pub controller: String,
    pub inpin: u32,
    pub line: u32,
}

/// Wires one controller's output line into another controller's source line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkDescriptor {
    pub from: LinkSource,
    pub to: LinkTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SystemManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub controllers: Vec<ControllerInstance>,
    #[serde(default)]
    pub links: Vec<LinkDescriptor>,
}

impl SystemManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .with_context(|| format!("Failed to open system manifest at {:?}", path))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        manifest.validate_layout(path.parent().unwrap_or_else(|| Path::new(".")))?;
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.controllers.is_empty() {
            anyhow::bail!("System '{}' declares no controllers", self.name);
        }

        let mut ids = HashSet::new();
        for c in &self.controllers {
            if !ids.insert(c.id.as_str()) {
                anyhow::bail!("Duplicate controller id '{}'", c.id);
            }
        }

        for link in &self.links {
            for id in [&link.from.controller, &link.to.controller] {
                if !ids.contains(id.as_str()) {
                    anyhow::bail!("Link references unknown controller '{}'", id);
                }
            }
            if link.from.controller == link.to.controller {
                anyhow::bail!("Controller '{}' cannot be linked to itself", link.from.controller);
            }
        }

        Ok(())
    }

    /// Resolves every controller's profile against `base_dir` and rejects
    /// overlapping `[base_address, base_address + mem_size)` windows.
    pub fn validate_layout(&self, base_dir: &Path) -> Result<()> {
        let mut windows: Vec<(&str, u64, u64)> = Vec::new();
        for c in &self.controllers {
            let profile = resolve_profile(&c.profile, base_dir)
                .with_context(|| format!("Failed to load profile for '{}'", c.id))?;
            let size = profile.mem_size_bytes()?;
            let end = c
                .base_address
                .checked_add(size)
                .with_context(|| format!("Controller '{}' window overflows the bus", c.id))?;
            if let Some((other, base, _)) = windows
                .iter()
                .find(|(_, base, other_end)| c.base_address < *other_end && *base < end)
            {
                anyhow::bail!(
                    "Controller '{}' at {:#x} overlaps '{}' at {:#x}",
                    c.id,
                    c.base_address,
                    other,
                    base
                );
            }
            windows.push((&c.id, c.base_address, end));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceLineDetails {
    #[serde(default)]
    pub controller: Option<String>,
    pub inpin: u32,
    pub line: u32,
    pub level: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceLineStep {
    pub source_line: SourceLineDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RaiseDetails {
    #[serde(default)]
    pub controller: Option<String>,
    pub inpin: u32,
    pub level: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RaiseStep {
    pub raise: RaiseDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WriteDetails {
    pub offset: u64,
    pub value: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WriteStep {
    pub write: WriteDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReadDetails {
    pub offset: u64,
    #[serde(default)]
    pub expect: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReadStep {
    pub read: ReadDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputExpectation {
    #[serde(default)]
    pub controller: Option<String>,
    pub line: u32,
    pub level: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExpectOutputStep {
    pub expect_output: OutputExpectation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StateExpectation {
    #[serde(default)]
    pub controller: Option<String>,
    pub inpin: u32,
    #[serde(default)]
    pub enable: Option<u32>,
    #[serde(default)]
    pub mask: Option<u32>,
    #[serde(default)]
    pub pending: Option<u32>,
    #[serde(default)]
    pub status: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExpectStateStep {
    pub expect_state: StateExpectation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExpectGuestErrorsStep {
    pub expect_guest_errors: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKeyword {
    Reset,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScenarioStep {
    Keyword(StepKeyword),
    SourceLine(SourceLineStep),
    Raise(RaiseStep),
    Write(WriteStep),
    Read(ReadStep),
    ExpectOutput(ExpectOutputStep),
    ExpectState(ExpectStateStep),
    ExpectGuestErrors(ExpectGuestErrorsStep),
}

impl ScenarioStep {
    /// True for steps that only check state and never drive the model.
    pub fn is_expectation(&self) -> bool {
        matches!(
            self,
            ScenarioStep::ExpectOutput(_)
                | ScenarioStep::ExpectState(_)
                | ScenarioStep::ExpectGuestErrors(_)
                | ScenarioStep::Read(ReadStep {
                    read: ReadDetails {
                        expect: Some(_),
                        ..
                    }
                })
        )
    }
}

/// A deterministic sequence of source events, register accesses and checks.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioScript {
    pub schema_version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario script at {:?}", path))?;

        let script: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).context("Failed to parse Scenario Script JSON")?
        } else {
            serde_yaml::from_str(&contents).context("Failed to parse Scenario Script YAML")?
        };
        script.validate()?;
        Ok(script)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Scenario Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        match (&self.profile, &self.system) {
            (None, None) => anyhow::bail!("Scenario must name either a 'profile' or a 'system'"),
            (Some(_), Some(_)) => {
                anyhow::bail!("Scenario cannot name both a 'profile' and a 'system'")
            }
            _ => {}
        }

        if self.steps.is_empty() {
            anyhow::bail!("Scenario has no steps");
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
