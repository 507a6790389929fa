//! Dedicated OSC send thread.
//!
//! Messages are encoded on the control thread and pushed to a bounded channel.
//! A dedicated sender thread drains the channel and performs `socket.send_to()`,
//! keeping UDP I/O off the control loop.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// A pre-encoded OSC packet ready for UDP transmission.
pub struct OscSendEntry {
    pub encoded_packet: Vec<u8>,
}

/// Channel capacity for the OSC send queue. A full grid refresh plus a
/// retune of every voice stays well below this.
pub const SEND_QUEUE_CAPACITY: usize = 512;

/// Create the sender channel pair and spawn the sender thread.
///
/// Returns `(Sender, queue_depth, JoinHandle)`. The sender thread exits once
/// every `Sender` clone has been dropped.
pub fn spawn_osc_sender(
    socket: UdpSocket,
    server_addr: SocketAddr,
    capacity: usize,
) -> std::io::Result<(Sender<OscSendEntry>, Arc<AtomicUsize>, JoinHandle<()>)> {
    let (tx, rx) = crossbeam_channel::bounded::<OscSendEntry>(capacity.max(1));
    let queue_depth = Arc::new(AtomicUsize::new(0));
    let depth_clone = queue_depth.clone();

    let handle = thread::Builder::new()
        .name("osc-sender".into())
        .spawn(move || {
            sender_loop(socket, server_addr, rx, depth_clone);
        })?;

    Ok((tx, queue_depth, handle))
}

fn sender_loop(
    socket: UdpSocket,
    server_addr: SocketAddr,
    rx: Receiver<OscSendEntry>,
    queue_depth: Arc<AtomicUsize>,
) {
    while let Ok(entry) = rx.recv() {
        queue_depth.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = socket.send_to(&entry.encoded_packet, server_addr) {
            log::debug!(target: "synth::osc_sender", "send to {} failed: {}", server_addr, e);
        }
    }
}

/// Try to push a pre-encoded packet to the sender thread.
/// Hands the packet back when the queue is full or the thread is gone so the
/// caller can send it directly.
pub fn try_queue_packet(
    tx: &Sender<OscSendEntry>,
    queue_depth: &AtomicUsize,
    encoded_packet: Vec<u8>,
) -> Result<(), Vec<u8>> {
    // Count before sending so the sender thread never decrements below zero.
    queue_depth.fetch_add(1, Ordering::Relaxed);
    match tx.try_send(OscSendEntry { encoded_packet }) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(entry)) => {
            queue_depth.fetch_sub(1, Ordering::Relaxed);
            log::warn!(target: "synth::osc_sender", "OSC send queue full, falling back to direct send");
            Err(entry.encoded_packet)
        }
        Err(TrySendError::Disconnected(entry)) => {
            queue_depth.fetch_sub(1, Ordering::Relaxed);
            Err(entry.encoded_packet)
        }
    }
}
