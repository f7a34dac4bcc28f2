//! Layer-2 device boundary. The stack talks to the outside world through
//! [`FrameIo`]: a full-duplex interface yielding and accepting complete
//! Ethernet frames with no extra framing and no checksum offload. Outbound
//! frames travel through a bounded ring so the assembly path never blocks
//! on device I/O.

#[cfg(target_os = "linux")]
pub mod tap;

use std::io;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::warn;

pub const TX_RING_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("device closed")]
    Closed,
}

/// Full-duplex Ethernet frame interface.
///
/// `recv` blocks until a frame arrives and returns its length, or `Ok(0)`
/// once the device is closed (EOF). `send` blocks while the device ring is
/// full. Implementations must be callable from two threads at once (one
/// reader, one writer).
pub trait FrameIo: Send + Sync {
    fn recv(&self, buf: &mut [u8]) -> Result<usize, DeviceError>;
    fn send(&self, frame: &[u8]) -> Result<(), DeviceError>;
    /// Begin cooperative shutdown; a blocked `recv` returns EOF soon after.
    fn close(&self);
}

/// Producer side of the outbound frame ring.
#[derive(Clone)]
pub struct TxRing {
    sender: Sender<Vec<u8>>,
}

impl TxRing {
    pub fn new() -> (TxRing, Receiver<Vec<u8>>) {
        let (sender, receiver) = bounded(TX_RING_CAPACITY);
        (TxRing { sender }, receiver)
    }

    /// Enqueue one frame. A full ring drops the frame rather than blocking
    /// the assembly path.
    pub fn push(&self, frame: Vec<u8>) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("tx ring full, dropping outbound frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain_preserves_order() {
        let (ring, receiver) = TxRing::new();
        assert!(ring.push(vec![1]));
        assert!(ring.push(vec![2, 2]));
        assert_eq!(receiver.try_recv().unwrap(), vec![1]);
        assert_eq!(receiver.try_recv().unwrap(), vec![2, 2]);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn full_ring_drops_instead_of_blocking() {
        let (ring, receiver) = TxRing::new();
        for index in 0..TX_RING_CAPACITY {
            assert!(ring.push(vec![index as u8]));
        }
        assert!(!ring.push(vec![0xff]));
        assert_eq!(receiver.len(), TX_RING_CAPACITY);
    }

    #[test]
    fn disconnected_ring_reports_failure() {
        let (ring, receiver) = TxRing::new();
        drop(receiver);
        assert!(!ring.push(vec![1]));
    }
}
