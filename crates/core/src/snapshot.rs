// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub profile: String,
    /// Non-zero register words keyed by byte offset.
    pub registers: BTreeMap<u64, u32>,
    pub pins: Vec<PinSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinSnapshot {
    pub enable: u32,
    pub mask: u32,
    pub pending: u32,
    /// Raw OR gate input levels.
    pub levels: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub controllers: BTreeMap<String, ControllerSnapshot>,
}
