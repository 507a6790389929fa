mod common;

use std::time::Instant;

use common::rig;
use quadgrid_audio::CHANNELS;
use quadgrid_core::hardware::HardwareOp;
use quadgrid_core::instrument::harmonic::pad_at;
use quadgrid_core::instrument::HarmonicInstrument;
use quadgrid_types::{Generation, LedTarget};

#[test]
fn pad_press_sounds_and_lights() {
    let mut rig = rig(Generation::Mk2, HarmonicInstrument::new);
    let c = pad_at(0, 0).unwrap();
    let target = LedTarget::Grid(c);
    assert_eq!(rig.led(target), Some(vec![63, 0, 0]));

    rig.synth.clear();
    assert!(rig.press(target, Instant::now()));
    let triggers = rig.synth.triggers();
    assert_eq!(triggers.len(), 1);

    let (freq, gains) = rig.synth.last_voice(triggers[0]).unwrap();
    // C2 in the bottom-left corner.
    assert!((freq - 65.406).abs() < 0.01);
    let mut expected = [0.0f32; CHANNELS];
    expected[2] = 1.0;
    assert_eq!(gains, expected);
    assert_eq!(rig.led(target), Some(vec![63, 63, 63]));

    assert!(rig.release(target, Instant::now()));
    assert_eq!(rig.synth.releases(), triggers);
    assert_eq!(rig.led(target), Some(vec![63, 0, 0]));
}

#[test]
fn mk1_lights_with_two_channels() {
    let mut rig = rig(Generation::Mk1, HarmonicInstrument::new);
    let target = LedTarget::Grid(pad_at(2, 0).unwrap());
    assert!(rig.press(target, Instant::now()));
    assert_eq!(rig.led(target), Some(vec![3, 3]));
}

#[test]
fn octave_shift_moves_later_notes() {
    let mut rig = rig(Generation::Mk2, HarmonicInstrument::new);
    let now = Instant::now();
    rig.press(LedTarget::Side(4), now);
    rig.synth.clear();
    rig.press(LedTarget::Grid(pad_at(0, 0).unwrap()), now);
    let voice = rig.synth.triggers()[0];
    let (freq, _) = rig.synth.last_voice(voice).unwrap();
    assert!((freq - 130.81).abs() < 0.01);
}

#[test]
fn power_button_ends_the_loop() {
    let mut rig = rig(Generation::Mk2, HarmonicInstrument::new);
    let now = Instant::now();
    rig.press(LedTarget::Grid(pad_at(3, 3).unwrap()), now);
    assert!(!rig.press(LedTarget::Side(6), now));

    rig.control.run().unwrap();
    assert_eq!(rig.synth.last_effect("master_gain"), Some(0.0));
    assert_eq!(rig.synth.releases().len(), 1);
    assert_eq!(rig.hardware.operations().last(), Some(&HardwareOp::Close));
}
