//! Synthesis engine trait: a semantic-level abstraction over the sound server.
//!
//! `SynthEngine` captures what the controller *means* to do (retune a voice,
//! open its gate, move an effect control) independently of how it's done (OSC
//! messages to an external synthesis server). This enables unit testing of the
//! control layer without a running server.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};

use crate::osc_sender::{spawn_osc_sender, try_queue_packet, OscSendEntry, SEND_QUEUE_CAPACITY};

/// Number of output channels every voice is panned across.
pub const CHANNELS: usize = 4;

/// Result type for synthesis operations.
pub type SynthResult<T = ()> = Result<T, SynthError>;

/// Error from a synthesis operation.
#[derive(Debug, Clone)]
pub struct SynthError(pub String);

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SynthError {}

impl From<std::io::Error> for SynthError {
    fn from(e: std::io::Error) -> Self {
        SynthError(e.to_string())
    }
}

impl From<String> for SynthError {
    fn from(s: String) -> Self {
        SynthError(s)
    }
}

/// Reference to one voice slot on the synthesis server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceRef(pub u16);

impl fmt::Display for VoiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice {}", self.0)
    }
}

/// Semantic-level synthesis engine trait.
///
/// Each method represents a meaningful sound operation. Implementations
/// translate these into server-specific commands or record them for testing.
pub trait SynthEngine: Send {
    /// Retune a voice and set its per-channel gains.
    fn set_voice_parameters(&self, voice: VoiceRef, frequency: f32, gains: [f32; CHANNELS]) -> SynthResult;

    /// Open the voice's envelope gate.
    fn trigger(&self, voice: VoiceRef) -> SynthResult;

    /// Close the voice's envelope gate. The release phase is the server's business.
    fn release(&self, voice: VoiceRef) -> SynthResult;

    /// Set a named timbre parameter on one voice.
    fn set_voice_param(&self, voice: VoiceRef, name: &str, value: f32) -> SynthResult;

    /// Set a continuous effect control (reverb size, delay time, master gain, ...).
    fn set_effect_parameter(&self, name: &str, value: f32) -> SynthResult;
}

// ─── OSC Synth ──────────────────────────────────────────────────────

pub const ADDR_VOICE_SET: &str = "/quadgrid/voice/set";
pub const ADDR_VOICE_TRIGGER: &str = "/quadgrid/voice/trigger";
pub const ADDR_VOICE_RELEASE: &str = "/quadgrid/voice/release";
pub const ADDR_VOICE_PARAM: &str = "/quadgrid/voice/param";
pub const ADDR_EFFECT: &str = "/quadgrid/fx";

/// Engine implementation that forwards every operation as an OSC message to
/// an external synthesis server over UDP.
pub struct OscSynth {
    socket: UdpSocket,
    server_addr: SocketAddr,
    send_tx: Sender<OscSendEntry>,
    queue_depth: Arc<AtomicUsize>,
    _sender_thread: JoinHandle<()>,
}

impl OscSynth {
    /// Bind a local socket and start the sender thread for `server_addr`.
    pub fn connect(server_addr: &str) -> SynthResult<Self> {
        let resolved = server_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SynthError(format!("cannot resolve synth server {}", server_addr)))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let (send_tx, queue_depth, handle) =
            spawn_osc_sender(socket.try_clone()?, resolved, SEND_QUEUE_CAPACITY)?;
        log::info!(target: "synth", "sending OSC to {}", resolved);
        Ok(Self {
            socket,
            server_addr: resolved,
            send_tx,
            queue_depth,
            _sender_thread: handle,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Packets waiting on the sender thread.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    fn send_message(&self, addr: &str, args: Vec<OscType>) -> SynthResult {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = encode_packet(&packet)?;
        if let Err(buf) = try_queue_packet(&self.send_tx, &self.queue_depth, buf) {
            self.socket.send_to(&buf, self.server_addr)?;
        }
        Ok(())
    }
}

/// Encode a packet with `rosc`.
pub fn encode_packet(packet: &OscPacket) -> SynthResult<Vec<u8>> {
    rosc::encoder::encode(packet).map_err(|e| SynthError(e.to_string()))
}

impl SynthEngine for OscSynth {
    fn set_voice_parameters(&self, voice: VoiceRef, frequency: f32, gains: [f32; CHANNELS]) -> SynthResult {
        let mut args = vec![OscType::Int(voice.0 as i32), OscType::Float(frequency)];
        args.extend(gains.iter().map(|&g| OscType::Float(g)));
        self.send_message(ADDR_VOICE_SET, args)
    }

    fn trigger(&self, voice: VoiceRef) -> SynthResult {
        self.send_message(ADDR_VOICE_TRIGGER, vec![OscType::Int(voice.0 as i32)])
    }

    fn release(&self, voice: VoiceRef) -> SynthResult {
        self.send_message(ADDR_VOICE_RELEASE, vec![OscType::Int(voice.0 as i32)])
    }

    fn set_voice_param(&self, voice: VoiceRef, name: &str, value: f32) -> SynthResult {
        self.send_message(
            ADDR_VOICE_PARAM,
            vec![
                OscType::Int(voice.0 as i32),
                OscType::String(name.to_string()),
                OscType::Float(value),
            ],
        )
    }

    fn set_effect_parameter(&self, name: &str, value: f32) -> SynthResult {
        self.send_message(
            ADDR_EFFECT,
            vec![OscType::String(name.to_string()), OscType::Float(value)],
        )
    }
}

// ─── Test Synth ─────────────────────────────────────────────────────

/// An operation recorded by `TestSynth` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthOp {
    SetVoice {
        voice: VoiceRef,
        frequency: f32,
        gains: [f32; CHANNELS],
    },
    Trigger(VoiceRef),
    Release(VoiceRef),
    SetVoiceParam {
        voice: VoiceRef,
        name: String,
        value: f32,
    },
    SetEffect {
        name: String,
        value: f32,
    },
}

/// A test engine that records all operations into a vector for assertions.
/// All operations succeed unless `fail_all` is set. Uses `Mutex` for interior
/// mutability so the engine is `Send + Sync` (needed for `Arc<TestSynth>` sharing).
pub struct TestSynth {
    ops: Mutex<Vec<SynthOp>>,
    failing: Mutex<bool>,
}

impl TestSynth {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<SynthOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Make every subsequent operation fail (still recorded).
    pub fn fail_all(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&SynthOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Find the first operation matching a predicate.
    pub fn find<F: Fn(&SynthOp) -> bool>(&self, f: F) -> Option<SynthOp> {
        self.ops.lock().unwrap().iter().find(|op| f(op)).cloned()
    }

    /// Voices triggered, in order.
    pub fn triggers(&self) -> Vec<VoiceRef> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                SynthOp::Trigger(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Voices released, in order.
    pub fn releases(&self) -> Vec<VoiceRef> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                SynthOp::Release(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Most recent value sent for an effect control.
    pub fn last_effect(&self, name: &str) -> Option<f32> {
        self.ops.lock().unwrap().iter().rev().find_map(|op| match op {
            SynthOp::SetEffect { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }

    /// Most recent frequency and gains sent for a voice.
    pub fn last_voice(&self, voice: VoiceRef) -> Option<(f32, [f32; CHANNELS])> {
        self.ops.lock().unwrap().iter().rev().find_map(|op| match op {
            SynthOp::SetVoice {
                voice: v,
                frequency,
                gains,
            } if *v == voice => Some((*frequency, *gains)),
            _ => None,
        })
    }

    fn record(&self, op: SynthOp) -> SynthResult {
        self.ops.lock().unwrap().push(op);
        if *self.failing.lock().unwrap() {
            return Err(SynthError("test synth failure".to_string()));
        }
        Ok(())
    }
}

impl SynthEngine for TestSynth {
    fn set_voice_parameters(&self, voice: VoiceRef, frequency: f32, gains: [f32; CHANNELS]) -> SynthResult {
        self.record(SynthOp::SetVoice {
            voice,
            frequency,
            gains,
        })
    }

    fn trigger(&self, voice: VoiceRef) -> SynthResult {
        self.record(SynthOp::Trigger(voice))
    }

    fn release(&self, voice: VoiceRef) -> SynthResult {
        self.record(SynthOp::Release(voice))
    }

    fn set_voice_param(&self, voice: VoiceRef, name: &str, value: f32) -> SynthResult {
        self.record(SynthOp::SetVoiceParam {
            voice,
            name: name.to_string(),
            value,
        })
    }

    fn set_effect_parameter(&self, name: &str, value: f32) -> SynthResult {
        self.record(SynthOp::SetEffect {
            name: name.to_string(),
            value,
        })
    }
}

impl Default for TestSynth {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps `Arc<TestSynth>` to implement `SynthEngine` so an instrument can own
/// a `Box<dyn SynthEngine>` while tests retain an `Arc` for assertions.
pub struct SharedTestSynth(pub Arc<TestSynth>);

impl SynthEngine for SharedTestSynth {
    fn set_voice_parameters(&self, voice: VoiceRef, frequency: f32, gains: [f32; CHANNELS]) -> SynthResult {
        self.0.set_voice_parameters(voice, frequency, gains)
    }
    fn trigger(&self, voice: VoiceRef) -> SynthResult {
        self.0.trigger(voice)
    }
    fn release(&self, voice: VoiceRef) -> SynthResult {
        self.0.release(voice)
    }
    fn set_voice_param(&self, voice: VoiceRef, name: &str, value: f32) -> SynthResult {
        self.0.set_voice_param(voice, name, value)
    }
    fn set_effect_parameter(&self, name: &str, value: f32) -> SynthResult {
        self.0.set_effect_parameter(name, value)
    }
}

// ─── Null Synth ─────────────────────────────────────────────────────

/// Discards everything. Used when no synthesis server is configured.
pub struct NullSynth;

impl SynthEngine for NullSynth {
    fn set_voice_parameters(&self, _voice: VoiceRef, _frequency: f32, _gains: [f32; CHANNELS]) -> SynthResult {
        Ok(())
    }
    fn trigger(&self, _voice: VoiceRef) -> SynthResult {
        Ok(())
    }
    fn release(&self, _voice: VoiceRef) -> SynthResult {
        Ok(())
    }
    fn set_voice_param(&self, _voice: VoiceRef, _name: &str, _value: f32) -> SynthResult {
        Ok(())
    }
    fn set_effect_parameter(&self, _name: &str, _value: f32) -> SynthResult {
        Ok(())
    }
}
