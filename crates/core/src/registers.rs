// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Flat array of 32-bit registers indexed by word address (`offset >> 2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    words: Vec<u32>,
    size: u64,
}

impl RegisterFile {
    pub fn new(size: u64) -> Self {
        Self {
            words: vec![0; (size / 4) as usize],
            size,
        }
    }

    /// Decoded size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset < self.size
    }

    pub fn word_index(offset: u64) -> usize {
        (offset >> 2) as usize
    }

    pub fn load(&self, addr: usize) -> u32 {
        self.words.get(addr).copied().unwrap_or(0)
    }

    pub fn store(&mut self, addr: usize, value: u32) {
        if let Some(word) = self.words.get_mut(addr) {
            *word = value;
        }
    }

    pub fn word_mut(&mut self, addr: usize) -> Option<&mut u32> {
        self.words.get_mut(addr)
    }

    pub fn reset(&mut self) {
        self.words.fill(0);
    }

    /// `(byte offset, value)` for every non-zero word.
    pub fn non_zero(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.words
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(i, v)| ((i as u64) << 2, *v))
    }
}
