// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Per-input-pin interrupt state machine.
//!
//! The status word lives in the register file and is passed in by the
//! controller; everything else a pin needs is held here. Single-output pins
//! treat enable, mask, pending and status as opaque 32-bit words. Fan-out
//! pins treat them as one bit per output line.

use crate::profile::IrqRoute;
use crate::signals::DigitalLevel;
use serde::{Deserialize, Serialize};

/// A status write of all ones reinitializes the register instead of
/// acknowledging an ISR.
pub const STATUS_REINIT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    /// Armed source lines. Only grows through enable writes.
    pub enable: u32,
    /// Sources whose ISR is running; blocks delivery.
    pub mask: u32,
    /// Sources that fired while blocked.
    pub pending: u32,
}

/// An output line change requested by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineUpdate {
    pub outpin: usize,
    pub level: DigitalLevel,
}

impl LineUpdate {
    fn raise(outpin: usize) -> Self {
        Self {
            outpin,
            level: DigitalLevel::High,
        }
    }

    fn lower(outpin: usize) -> Self {
        Self {
            outpin,
            level: DigitalLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// Bits written into status.
    pub delivered: u32,
    /// Bits merged into pending.
    pub queued: u32,
    pub updates: Vec<LineUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    /// Zero written with nothing enabled.
    Cleared,
    /// New sources armed.
    Armed { enable: u32 },
    /// Enable set unchanged: the write toggled the in-service mask.
    MaskUpdated {
        unmasked: u32,
        masked: u32,
        mask: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckOutcome {
    /// The write was a full-register reinitialization; pending was not consulted.
    pub reinit: bool,
    /// Bits moved from pending into status.
    pub promoted: u32,
    pub updates: Vec<LineUpdate>,
}

impl PinState {
    /// Delivers `select` (raised and enabled sources) or queues it.
    pub fn trigger(&mut self, route: &IrqRoute, status: &mut u32, select: u32) -> TriggerOutcome {
        if route.is_multi() {
            self.trigger_multi(route, status, select)
        } else {
            self.trigger_single(route, status, select)
        }
    }

    fn trigger_single(&mut self, route: &IrqRoute, status: &mut u32, select: u32) -> TriggerOutcome {
        if self.mask != 0 || *status != 0 {
            // ISR running or previous delivery unacknowledged
            self.pending |= select;
            TriggerOutcome {
                queued: select,
                ..Default::default()
            }
        } else {
            *status = select;
            TriggerOutcome {
                delivered: select,
                queued: 0,
                updates: vec![LineUpdate::raise(route.outpin)],
            }
        }
    }

    fn trigger_multi(&mut self, route: &IrqRoute, status: &mut u32, select: u32) -> TriggerOutcome {
        let mut outcome = TriggerOutcome::default();
        for i in 0..route.fanout {
            let bit = 1u32 << i;
            if select & bit == 0 {
                continue;
            }
            if self.mask & bit != 0 || *status & bit != 0 {
                self.pending |= bit;
                outcome.queued |= bit;
            } else {
                *status |= bit;
                outcome.delivered |= bit;
                outcome.updates.push(LineUpdate::raise(route.outpin + i));
            }
        }
        outcome
    }

    /// Enable register write.
    ///
    /// Arms new sources, or, when every written bit is already armed,
    /// toggles the in-service mask: changed bits set in `data` are unmasked,
    /// changed bits clear in `data` are masked. `reg` always ends up holding
    /// `data`.
    ///
    /// A write that both sets and clears changed bits updates each bit on its
    /// own; an unmask never clears bits the same write masks.
    pub fn write_enable(&mut self, reg: &mut u32, data: u32) -> EnableOutcome {
        if data == 0 && self.enable == 0 {
            *reg = data;
            return EnableOutcome::Cleared;
        }

        let old_enable = self.enable;
        self.enable |= data;
        if self.enable != old_enable {
            *reg = data;
            return EnableOutcome::Armed {
                enable: self.enable,
            };
        }

        let change = *reg ^ data;
        let unmasked = change & data;
        let masked = change & !data;
        self.mask &= !unmasked;
        self.mask |= masked;
        *reg = data;
        EnableOutcome::MaskUpdated {
            unmasked,
            masked,
            mask: self.mask,
        }
    }

    /// Status register write with non-zero `data`: clears acknowledged bits
    /// and promotes pending work or drops the output.
    pub fn acknowledge(&mut self, route: &IrqRoute, reg: &mut u32, data: u32) -> AckOutcome {
        *reg &= !data;

        if data == STATUS_REINIT {
            return AckOutcome {
                reinit: true,
                ..Default::default()
            };
        }

        if route.is_multi() {
            self.acknowledge_multi(route, reg, data)
        } else {
            self.acknowledge_single(route, reg)
        }
    }

    fn acknowledge_single(&mut self, route: &IrqRoute, reg: &mut u32) -> AckOutcome {
        let mut outcome = AckOutcome::default();
        if *reg != 0 {
            return outcome;
        }

        if self.pending != 0 {
            *reg = self.pending;
            outcome.promoted = self.pending;
            self.pending = 0;
            outcome.updates.push(LineUpdate::raise(route.outpin));
        } else {
            outcome.updates.push(LineUpdate::lower(route.outpin));
        }
        outcome
    }

    fn acknowledge_multi(&mut self, route: &IrqRoute, reg: &mut u32, data: u32) -> AckOutcome {
        let mut outcome = AckOutcome::default();
        for i in 0..route.fanout {
            let bit = 1u32 << i;
            if data & bit == 0 {
                continue;
            }
            if self.pending & bit != 0 {
                *reg |= bit;
                self.pending &= !bit;
                outcome.promoted |= bit;
                outcome.updates.push(LineUpdate::raise(route.outpin + i));
            } else {
                outcome.updates.push(LineUpdate::lower(route.outpin + i));
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single() -> IrqRoute {
        IrqRoute {
            name: None,
            inpin: 1,
            outpin: 10,
            fanout: 1,
            enable_addr: 0x400,
            status_addr: 0x401,
        }
    }

    fn fanout() -> IrqRoute {
        IrqRoute {
            name: None,
            inpin: 0,
            outpin: 0,
            fanout: 10,
            enable_addr: 0x6C0,
            status_addr: 0x6C1,
        }
    }

    #[test]
    fn test_single_delivers_when_idle() {
        let mut pin = PinState::default();
        let mut status = 0;
        let out = pin.trigger(&single(), &mut status, 0x5);
        assert_eq!(status, 0x5);
        assert_eq!(out.delivered, 0x5);
        assert_eq!(out.updates, vec![LineUpdate::raise(10)]);
        assert_eq!(pin.pending, 0);
    }

    #[test]
    fn test_single_queues_behind_status() {
        let mut pin = PinState::default();
        let mut status = 0x1;
        let out = pin.trigger(&single(), &mut status, 0x2);
        assert_eq!(status, 0x1);
        assert_eq!(pin.pending, 0x2);
        assert_eq!(out.queued, 0x2);
        assert!(out.updates.is_empty());
    }

    #[test]
    fn test_single_queues_behind_any_mask_bit() {
        let mut pin = PinState {
            mask: 0x8,
            ..Default::default()
        };
        let mut status = 0;
        pin.trigger(&single(), &mut status, 0x1);
        assert_eq!(status, 0);
        assert_eq!(pin.pending, 0x1);
    }

    #[test]
    fn test_multi_decides_per_bit() {
        let mut pin = PinState {
            mask: 1 << 3,
            ..Default::default()
        };
        let mut status = 1 << 2;
        let select = (1 << 2) | (1 << 3) | (1 << 5);
        let out = pin.trigger(&fanout(), &mut status, select);
        assert_eq!(status, (1 << 2) | (1 << 5));
        assert_eq!(pin.pending, (1 << 2) | (1 << 3));
        assert_eq!(out.updates, vec![LineUpdate::raise(5)]);
    }

    #[test]
    fn test_multi_ignores_bits_past_fanout() {
        let mut pin = PinState::default();
        let mut status = 0;
        let out = pin.trigger(&fanout(), &mut status, 1 << 12);
        assert_eq!(status, 0);
        assert_eq!(pin.pending, 0);
        assert_eq!(out, TriggerOutcome::default());
    }

    #[test]
    fn test_enable_zero_with_nothing_enabled() {
        let mut pin = PinState::default();
        let mut reg = 0;
        assert_eq!(pin.write_enable(&mut reg, 0), EnableOutcome::Cleared);
        assert_eq!(pin.enable, 0);
    }

    #[test]
    fn test_enable_is_monotonic() {
        let mut pin = PinState::default();
        let mut reg = 0;
        assert_eq!(
            pin.write_enable(&mut reg, 0x1),
            EnableOutcome::Armed { enable: 0x1 }
        );
        assert_eq!(
            pin.write_enable(&mut reg, 0x2),
            EnableOutcome::Armed { enable: 0x3 }
        );
        assert_eq!(reg, 0x2);
        assert_eq!(pin.enable, 0x3);
        assert_eq!(pin.mask, 0);
    }

    #[test]
    fn test_enable_rewrite_toggles_mask() {
        let mut pin = PinState::default();
        let mut reg = 0;
        pin.write_enable(&mut reg, 0x3);

        // Dropping bit 1 from the register masks it.
        assert_eq!(
            pin.write_enable(&mut reg, 0x1),
            EnableOutcome::MaskUpdated {
                unmasked: 0,
                masked: 0x2,
                mask: 0x2
            }
        );
        assert_eq!(pin.enable, 0x3);

        // Writing it back unmasks it.
        assert_eq!(
            pin.write_enable(&mut reg, 0x3),
            EnableOutcome::MaskUpdated {
                unmasked: 0x2,
                masked: 0,
                mask: 0
            }
        );
        assert_eq!(reg, 0x3);
    }

    #[test]
    fn test_enable_identical_rewrite_changes_nothing() {
        let mut pin = PinState::default();
        let mut reg = 0;
        pin.write_enable(&mut reg, 0x1);
        assert_eq!(
            pin.write_enable(&mut reg, 0x1),
            EnableOutcome::MaskUpdated {
                unmasked: 0,
                masked: 0,
                mask: 0
            }
        );
        assert_eq!(pin.enable, 0x1);
    }

    #[test]
    fn test_enable_zero_after_arming_masks_everything_written_before() {
        let mut pin = PinState::default();
        let mut reg = 0;
        pin.write_enable(&mut reg, 0x5);
        let out = pin.write_enable(&mut reg, 0);
        assert_eq!(
            out,
            EnableOutcome::MaskUpdated {
                unmasked: 0,
                masked: 0x5,
                mask: 0x5
            }
        );
        assert_eq!(pin.enable, 0x5);
    }

    #[test]
    fn test_mixed_change_updates_each_bit_on_its_own() {
        let mut pin = PinState {
            enable: 0x3,
            mask: 0x2,
            pending: 0,
        };
        let mut reg = 0x1;
        // bit 0 leaves the register (mask), bit 1 enters it (unmask)
        let out = pin.write_enable(&mut reg, 0x2);
        assert_eq!(
            out,
            EnableOutcome::MaskUpdated {
                unmasked: 0x2,
                masked: 0x1,
                mask: 0x1
            }
        );
        // The unmask of bit 1 leaves the freshly masked bit 0 in place.
        assert_eq!(pin.mask, 0x1);
        assert_eq!(reg, 0x2);
    }

    #[test]
    fn test_single_ack_lowers_line() {
        let mut pin = PinState::default();
        let mut reg = 0x1;
        let out = pin.acknowledge(&single(), &mut reg, 0x1);
        assert_eq!(reg, 0);
        assert_eq!(out.updates, vec![LineUpdate::lower(10)]);
    }

    #[test]
    fn test_single_partial_ack_keeps_line() {
        let mut pin = PinState {
            pending: 0x4,
            ..Default::default()
        };
        let mut reg = 0x3;
        let out = pin.acknowledge(&single(), &mut reg, 0x1);
        assert_eq!(reg, 0x2);
        assert!(out.updates.is_empty());
        assert_eq!(pin.pending, 0x4);
    }

    #[test]
    fn test_single_ack_promotes_whole_pending_word() {
        let mut pin = PinState {
            pending: 0x6,
            ..Default::default()
        };
        let mut reg = 0x1;
        let out = pin.acknowledge(&single(), &mut reg, 0x1);
        assert_eq!(reg, 0x6);
        assert_eq!(pin.pending, 0);
        assert_eq!(out.promoted, 0x6);
        assert_eq!(out.updates, vec![LineUpdate::raise(10)]);
    }

    #[test]
    fn test_reinit_write_never_drains_pending() {
        let mut pin = PinState {
            pending: 0x1,
            ..Default::default()
        };
        let mut reg = 0x1;
        let out = pin.acknowledge(&single(), &mut reg, STATUS_REINIT);
        assert!(out.reinit);
        assert_eq!(reg, 0);
        assert_eq!(pin.pending, 0x1);
        assert!(out.updates.is_empty());
    }

    #[test]
    fn test_multi_ack_per_bit() {
        let mut pin = PinState {
            pending: 1 << 5,
            ..Default::default()
        };
        let mut reg = (1 << 2) | (1 << 5) | (1 << 7);
        let out = pin.acknowledge(&fanout(), &mut reg, (1 << 2) | (1 << 5));
        assert_eq!(reg, (1 << 5) | (1 << 7));
        assert_eq!(pin.pending, 0);
        assert_eq!(out.promoted, 1 << 5);
        assert_eq!(
            out.updates,
            vec![LineUpdate::lower(2), LineUpdate::raise(5)]
        );
    }

    #[test]
    fn test_multi_ack_ignores_unwritten_pending_bits() {
        let mut pin = PinState {
            pending: 1 << 4,
            ..Default::default()
        };
        let mut reg = 1 << 1;
        let out = pin.acknowledge(&fanout(), &mut reg, 1 << 1);
        assert_eq!(reg, 0);
        assert_eq!(pin.pending, 1 << 4);
        assert_eq!(out.updates, vec![LineUpdate::lower(1)]);
    }
}
