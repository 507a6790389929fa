//! Novation Launchpad over MIDI (`midir`).
//!
//! Button presses arrive on the input connection's callback thread and are
//! forwarded through a channel; `poll_event` drains it without blocking.

use std::sync::mpsc::{self, Receiver};

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use quadgrid_types::{ButtonEvent, Generation};

use super::{HardwareAdapter, HardwareError, HardwareResult};

const CLIENT_NAME: &str = "quadgrid";

/// First controller number of the top button row, both generations.
const TOP_CC_BASE: u8 = 104;
/// Mk1 reports top buttons as `200 + i` to keep them apart from note ids.
const MK1_TOP_ID_BASE: u16 = 200;

const MK2_SYSEX_HEADER: [u8; 6] = [0xF0, 0x00, 0x20, 0x29, 0x02, 0x18];
const MK2_SET_RGB: u8 = 0x0B;
const MK2_LAYOUT: u8 = 0x0E;
const SYSEX_END: u8 = 0xF7;

/// Information about an available MIDI port
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// Input ports visible to the MIDI backend.
pub fn list_ports() -> HardwareResult<Vec<MidiPortInfo>> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| HardwareError(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect())
}

/// Guess the generation from a port name. Only Mk2 announces itself.
pub fn generation_from_name(name: &str) -> Generation {
    if name.to_ascii_lowercase().contains("mk2") {
        Generation::Mk2
    } else {
        Generation::Mk1
    }
}

pub struct LaunchpadAdapter {
    generation: Generation,
    port_name: String,
    input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
    events: Receiver<ButtonEvent>,
}

impl LaunchpadAdapter {
    /// Open the input and output ports of a Launchpad.
    ///
    /// With no `port_index` the first input whose name contains "Launchpad"
    /// is used. The output port is matched by name, falling back to the same
    /// index. With no `generation` it is guessed from the port name.
    pub fn open(port_index: Option<usize>, generation: Option<Generation>) -> HardwareResult<Self> {
        let ports = list_ports()?;
        let port = match port_index {
            Some(index) => ports
                .iter()
                .find(|p| p.index == index)
                .ok_or_else(|| HardwareError(format!("Invalid port index: {}", index)))?,
            None => ports
                .iter()
                .find(|p| p.name.to_ascii_lowercase().contains("launchpad"))
                .ok_or_else(|| HardwareError("no Launchpad found among MIDI inputs".to_string()))?,
        };
        let generation = generation.unwrap_or_else(|| generation_from_name(&port.name));

        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| HardwareError(e.to_string()))?;
        let in_ports = midi_in.ports();
        let in_port = in_ports
            .get(port.index)
            .ok_or_else(|| HardwareError(format!("MIDI input {} disappeared", port.name)))?;

        let (tx, rx) = mpsc::channel();
        let input = midi_in
            .connect(
                in_port,
                "quadgrid-input",
                move |_stamp, message, _| {
                    if let Some(event) = parse_launchpad_message(message, generation) {
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| HardwareError(e.to_string()))?;

        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| HardwareError(e.to_string()))?;
        let out_ports = midi_out.ports();
        let out_index = out_ports
            .iter()
            .position(|p| midi_out.port_name(p).is_ok_and(|n| n == port.name))
            .unwrap_or(port.index);
        let out_port = out_ports
            .get(out_index)
            .ok_or_else(|| HardwareError(format!("no MIDI output for {}", port.name)))?;
        let output = midi_out
            .connect(out_port, "quadgrid-output")
            .map_err(|e| HardwareError(e.to_string()))?;

        log::info!(target: "hardware", "opened {} as Launchpad {}", port.name, generation.name());

        Ok(Self {
            generation,
            port_name: port.name.clone(),
            input: Some(input),
            output: Some(output),
            events: rx,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, message: &[u8]) -> HardwareResult {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| HardwareError("MIDI output closed".to_string()))?;
        output.send(message).map_err(|e| HardwareError(e.to_string()))
    }
}

impl HardwareAdapter for LaunchpadAdapter {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn poll_event(&mut self) -> Option<ButtonEvent> {
        self.events.try_recv().ok()
    }

    fn set_color(&mut self, id: u16, components: &[u8]) -> HardwareResult {
        let message = encode_led(id, components, self.generation)
            .ok_or_else(|| HardwareError(format!("no LED behind id {}", id)))?;
        self.send(&message)
    }

    fn reset(&mut self) -> HardwareResult {
        let message = reset_message(self.generation);
        self.send(&message)
    }

    fn close(&mut self) {
        if let Some(conn) = self.input.take() {
            conn.close();
        }
        if let Some(conn) = self.output.take() {
            conn.close();
        }
        log::info!(target: "hardware", "closed {}", self.port_name);
    }
}

impl Drop for LaunchpadAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode one incoming MIDI message into a button transition.
///
/// Grid and side buttons are notes (velocity 0 or note-off is a release);
/// the top row is CC 104..=111.
pub fn parse_launchpad_message(data: &[u8], generation: Generation) -> Option<ButtonEvent> {
    if data.len() < 3 {
        return None;
    }
    let (status, number, value) = (data[0] & 0xF0, data[1], data[2]);
    match status {
        0x80 => Some(ButtonEvent::release(number as u16)),
        0x90 => Some(ButtonEvent {
            id: number as u16,
            pressed: value > 0,
        }),
        0xB0 if (TOP_CC_BASE..TOP_CC_BASE + 8).contains(&number) => {
            let id = match generation {
                Generation::Mk1 => MK1_TOP_ID_BASE + (number - TOP_CC_BASE) as u16,
                Generation::Mk2 => number as u16,
            };
            Some(ButtonEvent {
                id,
                pressed: value > 0,
            })
        }
        _ => None,
    }
}

/// Encode an LED write. Returns `None` for ids the generation has no LED for.
pub fn encode_led(id: u16, components: &[u8], generation: Generation) -> Option<Vec<u8>> {
    let level = |i: usize, max: u8| components.get(i).copied().unwrap_or(0).min(max);
    match generation {
        Generation::Mk1 => {
            // Copy+clear flags in bits 2-3, green in 4-5, red in 0-1.
            let velocity = 0x0C | (level(1, 3) << 4) | level(0, 3);
            if (MK1_TOP_ID_BASE..MK1_TOP_ID_BASE + 8).contains(&id) {
                Some(vec![0xB0, TOP_CC_BASE + (id - MK1_TOP_ID_BASE) as u8, velocity])
            } else if id < 128 {
                Some(vec![0x90, id as u8, velocity])
            } else {
                None
            }
        }
        Generation::Mk2 => {
            if id > 127 {
                return None;
            }
            let mut message = MK2_SYSEX_HEADER.to_vec();
            message.extend_from_slice(&[
                MK2_SET_RGB,
                id as u8,
                level(0, 63),
                level(1, 63),
                level(2, 63),
                SYSEX_END,
            ]);
            Some(message)
        }
    }
}

/// Message that clears every LED.
pub fn reset_message(generation: Generation) -> Vec<u8> {
    match generation {
        Generation::Mk1 => vec![0xB0, 0x00, 0x00],
        Generation::Mk2 => {
            let mut message = MK2_SYSEX_HEADER.to_vec();
            message.extend_from_slice(&[MK2_LAYOUT, 0x00, SYSEX_END]);
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_with_zero_velocity_is_release() {
        assert_eq!(
            parse_launchpad_message(&[0x90, 34, 127], Generation::Mk1),
            Some(ButtonEvent::press(34))
        );
        assert_eq!(
            parse_launchpad_message(&[0x90, 34, 0], Generation::Mk1),
            Some(ButtonEvent::release(34))
        );
        assert_eq!(
            parse_launchpad_message(&[0x80, 34, 64], Generation::Mk2),
            Some(ButtonEvent::release(34))
        );
    }

    #[test]
    fn top_row_ids_per_generation() {
        assert_eq!(
            parse_launchpad_message(&[0xB0, 104, 127], Generation::Mk1),
            Some(ButtonEvent::press(200))
        );
        assert_eq!(
            parse_launchpad_message(&[0xB0, 111, 0], Generation::Mk2),
            Some(ButtonEvent::release(111))
        );
        assert_eq!(parse_launchpad_message(&[0xB0, 7, 127], Generation::Mk2), None);
    }

    #[test]
    fn short_or_foreign_messages_are_ignored() {
        assert_eq!(parse_launchpad_message(&[], Generation::Mk1), None);
        assert_eq!(parse_launchpad_message(&[0x90, 1], Generation::Mk1), None);
        assert_eq!(parse_launchpad_message(&[0xF8, 0, 0], Generation::Mk2), None);
    }

    #[test]
    fn mk1_velocity_packs_red_and_green() {
        assert_eq!(encode_led(0, &[3, 0], Generation::Mk1), Some(vec![0x90, 0, 0x0F]));
        assert_eq!(encode_led(17, &[0, 3], Generation::Mk1), Some(vec![0x90, 17, 0x3C]));
        assert_eq!(encode_led(203, &[3, 3], Generation::Mk1), Some(vec![0xB0, 107, 0x3F]));
        // Out-of-range levels clamp.
        assert_eq!(encode_led(0, &[9, 9], Generation::Mk1), Some(vec![0x90, 0, 0x3F]));
        assert_eq!(encode_led(150, &[1, 1], Generation::Mk1), None);
    }

    #[test]
    fn mk2_uses_rgb_sysex() {
        assert_eq!(
            encode_led(81, &[63, 10, 0], Generation::Mk2),
            Some(vec![0xF0, 0x00, 0x20, 0x29, 0x02, 0x18, 0x0B, 81, 63, 10, 0, 0xF7])
        );
        assert_eq!(
            reset_message(Generation::Mk2),
            vec![0xF0, 0x00, 0x20, 0x29, 0x02, 0x18, 0x0E, 0x00, 0xF7]
        );
        assert_eq!(reset_message(Generation::Mk1), vec![0xB0, 0x00, 0x00]);
    }

    #[test]
    fn generation_guess_from_port_name() {
        assert_eq!(generation_from_name("Launchpad MK2 MIDI 1"), Generation::Mk2);
        assert_eq!(generation_from_name("Launchpad S"), Generation::Mk1);
    }
}
