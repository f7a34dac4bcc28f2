//! User-space dual-stack IPv4/IPv6 TCP/IP engine over a single tap-style
//! layer-2 device.
//!
//! [`Stack`] owns three threads: a reader that drives inbound dispatch to
//! completion frame by frame, a writer that drains the TX ring into the
//! device, and a timer that runs cache maintenance and fragment expiry.
//! Everything protocol-shaped lives in [`handler::PacketHandler`]; the
//! device boundary is the [`device::FrameIo`] trait.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod arp_cache;
pub mod config;
pub mod context;
pub mod device;
pub mod handler;
pub mod nd_cache;
pub mod reassembly;
pub mod sockets;
pub mod stats;
pub mod status;
pub mod timer;
pub mod tracker;
pub mod wire;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Result};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use tracing::{debug, error, info};

pub use crate::addr::{Ip4Host, Ip6Host, MacAddr};
pub use crate::config::StackConfig;
pub use crate::device::{DeviceError, FrameIo, TxRing};
pub use crate::handler::PacketHandler;
pub use crate::sockets::{SocketKey, TcpEvent, UdpEvent};
pub use crate::stats::{PacketStatsRx, PacketStatsTx};
pub use crate::status::TxStatus;

const MIN_MTU: usize = 576;
const MAX_MTU: usize = 9000;
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(1);
const WRITER_IDLE_TIMEOUT: Duration = Duration::from_millis(250);

/// A running stack bound to one device.
pub struct Stack {
    handler: Arc<PacketHandler>,
    device: Arc<dyn FrameIo>,
    timer: timer::Timer,
    shutdown: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<DeviceError>>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Stack {
    /// Build the handler, register periodic maintenance, and start the
    /// reader and writer threads against `device`.
    pub fn new(config: StackConfig, device: Arc<dyn FrameIo>) -> Result<Stack> {
        if config.mac_address.is_unspecified() {
            bail!("stack requires a unicast mac address");
        }
        if !(MIN_MTU..=MAX_MTU).contains(&config.mtu) {
            bail!("mtu {} outside supported range", config.mtu);
        }

        let (ring, outbound) = TxRing::new();
        let handler = Arc::new(PacketHandler::new(&config, ring));
        let shutdown = Arc::new(AtomicBool::new(false));
        let fatal = Arc::new(Mutex::new(None));

        let timer = timer::Timer::new();
        {
            let upkeep = Arc::clone(&handler);
            timer.register(move || upkeep.arp_cache().maintain(), MAINTENANCE_PERIOD);
        }
        {
            let upkeep = Arc::clone(&handler);
            timer.register(move || upkeep.nd_cache().maintain(), MAINTENANCE_PERIOD);
        }
        {
            let upkeep = Arc::clone(&handler);
            timer.register(
                move || {
                    upkeep.reassembly().expire();
                },
                MAINTENANCE_PERIOD,
            );
        }

        let reader = {
            let handler = Arc::clone(&handler);
            let device = Arc::clone(&device);
            let shutdown = Arc::clone(&shutdown);
            let fatal = Arc::clone(&fatal);
            let mtu = config.mtu;
            thread::Builder::new()
                .name("tapstack-rx".to_string())
                .spawn(move || {
                    // Room for the ethernet header and a trailing FCS the
                    // device may hand up.
                    let mut buf = vec![0u8; mtu + 18];
                    loop {
                        if shutdown.load(Ordering::SeqCst) {
                            return;
                        }
                        match device.recv(&mut buf) {
                            Ok(0) => {
                                debug!("device eof, reader exiting");
                                return;
                            }
                            Ok(len) => handler.receive_frame(&buf[..len]),
                            Err(err) => {
                                error!(%err, "device read failed, halting stack");
                                *fatal.lock() = Some(err);
                                shutdown.store(true, Ordering::SeqCst);
                                return;
                            }
                        }
                    }
                })?
        };

        let writer = {
            let device = Arc::clone(&device);
            let shutdown = Arc::clone(&shutdown);
            let fatal = Arc::clone(&fatal);
            thread::Builder::new()
                .name("tapstack-tx".to_string())
                .spawn(move || loop {
                    match outbound.recv_timeout(WRITER_IDLE_TIMEOUT) {
                        Ok(frame) => {
                            if let Err(err) = device.send(&frame) {
                                error!(%err, "device write failed, halting stack");
                                *fatal.lock() = Some(err);
                                shutdown.store(true, Ordering::SeqCst);
                                return;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if shutdown.load(Ordering::SeqCst) {
                                return;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                })?
        };

        info!(mtu = config.mtu, mac = %config.mac_address, "stack started");
        Ok(Stack {
            handler,
            device,
            timer,
            shutdown,
            fatal,
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    pub fn handler(&self) -> &Arc<PacketHandler> {
        &self.handler
    }

    /// The device error that halted the stack, if any.
    pub fn take_fatal_error(&self) -> Option<DeviceError> {
        self.fatal.lock().take()
    }

    pub fn is_halted(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Cooperative shutdown: close the device, stop the timer, join the
    /// worker threads.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.device.close();
        self.timer.shutdown();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        info!("stack stopped");
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.shutdown();
    }
}
