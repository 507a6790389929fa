mod common;

use std::time::Instant;

use common::{pad, rig};
use quadgrid_core::instrument::scan::{SCAN_STEP, SINE};
use quadgrid_core::instrument::ScanInstrument;
use quadgrid_types::{Generation, LedTarget};

#[test]
fn cursor_walks_and_solo_pauses_it() {
    let mut rig = rig(Generation::Mk2, ScanInstrument::new);
    let t0 = Instant::now();
    rig.press(LedTarget::Side(0), t0);
    assert_eq!(rig.control.instrument().cursor(), Some(pad(0, 0)));
    assert_eq!(rig.led(LedTarget::Grid(pad(0, 0))), Some(vec![0, 63, 0]));

    let t1 = t0 + SCAN_STEP;
    rig.control.step_once(t1);
    assert_eq!(rig.control.instrument().cursor(), Some(pad(1, 0)));
    assert_eq!(rig.led(LedTarget::Grid(pad(0, 0))), Some(vec![0, 0, 0]));

    let t2 = t1 + SCAN_STEP;
    rig.press(LedTarget::Top(1), t2);
    assert!(rig.control.instrument().is_paused());
    assert_eq!(rig.control.instrument().cursor(), Some(pad(1, 0)));
    assert_eq!(rig.synth.last_voice(SINE).unwrap().1, [0.0, 1.0, 0.0, 0.0]);
    assert_eq!(rig.led(LedTarget::Top(1)), Some(vec![63, 0, 0]));

    let t3 = t2 + SCAN_STEP;
    rig.control.step_once(t3);
    assert_eq!(rig.control.instrument().cursor(), Some(pad(1, 0)));

    rig.release(LedTarget::Top(1), t3 + SCAN_STEP);
    assert_eq!(rig.control.instrument().cursor(), Some(pad(2, 0)));
    assert_eq!(rig.led(LedTarget::Top(1)), Some(vec![0, 63, 0]));
}

#[test]
fn exit_button_stops_and_silences() {
    let mut rig = rig(Generation::Mk1, ScanInstrument::new);
    let t0 = Instant::now();
    rig.press(LedTarget::Side(0), t0);
    assert!(!rig.press(LedTarget::Top(5), t0));
    rig.control.run().unwrap();
    assert_eq!(rig.synth.last_effect("master_gain"), Some(0.0));
    assert_eq!(rig.synth.releases().len(), 6);
}
