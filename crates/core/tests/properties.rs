// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use labwired_intc_core::signals::ErrorRecorder;
use labwired_intc_core::{Controller, DigitalLevel, LineRecorder, Profile};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Enable(u32),
    Ack(u32),
    Line { line: usize, high: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..4).prop_map(Op::Enable),
        (1u32..4).prop_map(Op::Ack),
        (0usize..2, any::<bool>()).prop_map(|(line, high)| Op::Line { line, high }),
    ]
}

fn fanout_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..0x400).prop_map(Op::Enable),
        (1u32..0x400).prop_map(Op::Ack),
        (0usize..10, any::<bool>()).prop_map(|(line, high)| Op::Line { line, high }),
    ]
}

fn controller(profile: Profile) -> (Controller, LineRecorder, ErrorRecorder) {
    let lines = LineRecorder::new();
    let errors = ErrorRecorder::new();
    let ctrl = Controller::new(Arc::new(profile), Box::new(lines.clone()))
        .with_error_sink(Box::new(errors.clone()));
    (ctrl, lines, errors)
}

proptest! {
    // 1:1 route on INTC1 pin 0: the output line is high exactly while
    // status is non-zero, as long as firmware never writes all-ones.
    #[test]
    fn single_output_tracks_status(ops in proptest::collection::vec(op(), 1..64)) {
        let (mut ctrl, lines, errors) = controller(Profile::ast2700_intc1());
        for op in ops {
            match op {
                Op::Enable(v) => ctrl.mmio_write(0x100, v),
                Op::Ack(v) => ctrl.mmio_write(0x104, v),
                Op::Line { line, high } => {
                    let before = ctrl.status(0) | ctrl.pending(0);
                    ctrl.set_source_line(0, line, high);
                    if ctrl.levels(0) != 0 {
                        let select = ctrl.levels(0) & ctrl.enable(0);
                        prop_assert_eq!((ctrl.status(0) | ctrl.pending(0)) & select, select);
                    } else {
                        // Gate went low: nothing to deliver.
                        prop_assert!(!high);
                        prop_assert_eq!(ctrl.status(0) | ctrl.pending(0), before);
                    }
                }
            }
            let expected = DigitalLevel::from(ctrl.status(0) != 0);
            prop_assert_eq!(lines.level(0), expected);
        }
        prop_assert_eq!(errors.count(), 0);
    }

    // Fan-out route on INTC0 pin 0: output `i` follows status bit `i`.
    #[test]
    fn fanout_outputs_track_status_bits(ops in proptest::collection::vec(fanout_op(), 1..64)) {
        let (mut ctrl, lines, errors) = controller(Profile::ast2700_intc0());
        for op in ops {
            match op {
                Op::Enable(v) => ctrl.mmio_write(0x1B00, v),
                Op::Ack(v) => ctrl.mmio_write(0x1B04, v),
                Op::Line { line, high } => ctrl.set_source_line(0, line, high),
            }
            let status = ctrl.status(0);
            for i in 0..10 {
                prop_assert_eq!(lines.level(i), DigitalLevel::from(status & (1 << i) != 0));
            }
            prop_assert_eq!(ctrl.pending(0) & !0x3FF, 0);
        }
        prop_assert_eq!(errors.count(), 0);
    }

    // Accesses past the decoded range never disturb controller state.
    #[test]
    fn out_of_bounds_writes_are_inert(offset in 0x3d8u64..0x10000, value in any::<u32>()) {
        let (mut ctrl, lines, errors) = controller(Profile::ast2700_intc1());
        ctrl.mmio_write(0x100, 0x1);
        ctrl.set_source_line(0, 0, true);
        let before = ctrl.snapshot_state();
        lines.clear();

        ctrl.mmio_write(offset & !3, value);
        prop_assert_eq!(ctrl.mmio_read(offset & !3), 0);
        prop_assert_eq!(ctrl.snapshot_state(), before);
        prop_assert!(lines.events().is_empty());
        prop_assert_eq!(errors.count(), 2);
    }
}
