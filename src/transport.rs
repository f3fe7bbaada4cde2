//! The connection to one CAN interface.
//!
//! A `Transport` owns the sending half of the bus and a background thread
//! that owns the receiving half. The SDO client, the PDO codec and the NMT
//! signaller are added to it as further `impl` blocks in their own modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

use crate::bus::CanBus;
use crate::config::DriveConfig;
use crate::demux::{BusEvent, Demultiplexer, Direction};
use crate::error::{Error, TransportError};
use crate::pdo::{Tpdo1, Tpdo2};
use crate::util::{create_frame, frame_to_string};
use crate::wait::{CancelToken, Clock, Deadline, SystemClock};

#[derive(Clone)]
pub struct TransportOptions {
    pub queue_capacity: usize,
    pub read_timeout: Duration,
    pub sdo_timeout: Duration,
    pub poll_interval: Duration,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancelToken,
    pub events: Option<Sender<BusEvent>>,
}

impl TransportOptions {
    pub fn from_config(config: &DriveConfig) -> Self {
        TransportOptions {
            queue_capacity: config.bus.queue_capacity,
            read_timeout: config.bus.read_timeout(),
            sdo_timeout: config.sdo.timeout(),
            poll_interval: config.sdo.poll_interval(),
            ..Default::default()
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: Sender<BusEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        let config = DriveConfig::default();
        TransportOptions {
            queue_capacity: config.bus.queue_capacity,
            read_timeout: config.bus.read_timeout(),
            sdo_timeout: config.sdo.timeout(),
            poll_interval: config.sdo.poll_interval(),
            clock: Arc::new(SystemClock),
            cancel: CancelToken::new(),
            events: None,
        }
    }
}

pub struct Transport<B: CanBus> {
    tx: Mutex<Option<B>>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    demux: Arc<Demultiplexer<B::Frame>>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    /// Held for a whole flush, send and wait cycle.
    pub(crate) sdo_lock: Mutex<()>,
    options: TransportOptions,
}

#[cfg(target_os = "linux")]
impl Transport<crate::bus::SocketCanBus> {
    /// Opens `interface` through SocketCAN and starts receiving.
    pub fn connect(&self, interface: &str) -> Result<(), Error> {
        let bus = crate::bus::SocketCanBus::open(interface, self.options.read_timeout).map_err(|e| {
            warn!("[transport] failed to open '{}': {}", interface, e);
            self.demux.log(Direction::Sys, String::new(), format!("failed to open {}: {}", interface, e));
            e
        })?;
        self.connect_bus(bus)
    }
}

impl<B: CanBus> Transport<B> {
    pub fn new(options: TransportOptions) -> Self {
        let demux = Arc::new(Demultiplexer::new(options.queue_capacity, options.events.clone()));
        Transport {
            tx: Mutex::new(None),
            rx_thread: Mutex::new(None),
            demux,
            connected: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            sdo_lock: Mutex::new(()),
            options,
        }
    }

    /// Takes over `bus` and starts the receive loop on a clone of it. An
    /// existing connection is torn down first.
    pub fn connect_bus(&self, bus: B) -> Result<(), Error> {
        self.disconnect();

        let rx_bus = bus.try_clone()?;
        self.stop.store(false, Ordering::SeqCst);
        *self.tx.lock() = Some(bus);
        self.connected.store(true, Ordering::SeqCst);

        let demux = self.demux.clone();
        let connected = self.connected.clone();
        let stop = self.stop.clone();
        let spawned = thread::Builder::new()
            .name("canopen-rx".to_string())
            .spawn(move || receive_loop(rx_bus, demux, connected, stop));
        match spawned {
            Ok(handle) => *self.rx_thread.lock() = Some(handle),
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                self.tx.lock().take();
                return Err(TransportError::Io(e).into());
            }
        }

        info!("[transport] connected");
        self.demux.log(Direction::Sys, String::new(), "connected".to_string());
        Ok(())
    }

    /// Stops and joins the receive loop, drops the bus and forgets every
    /// queued frame and cached TPDO. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.rx_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("[transport] receive thread panicked");
            }
        }
        let had_bus = self.tx.lock().take().is_some();
        self.connected.store(false, Ordering::SeqCst);
        self.demux.clear();
        if had_bus {
            info!("[transport] disconnected");
            self.demux.log(Direction::Sys, String::new(), "disconnected".to_string());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn send(&self, frame: &B::Frame) -> Result<(), Error> {
        let mut guard = self.tx.lock();
        let bus = match guard.as_mut() {
            Some(bus) if self.is_connected() => bus,
            _ => return Err(TransportError::NotConnected.into()),
        };
        let text = frame_to_string(frame);
        if let Err(e) = bus.transmit(frame) {
            warn!("[transport] failed to send {}: {}", text, e);
            self.demux.log(Direction::Sys, text, format!("send failed: {}", e));
            return Err(e.into());
        }
        trace!("[transport] tx {}", text);
        self.demux.log(Direction::Tx, text, String::new());
        Ok(())
    }

    pub fn send_data(&self, cob_id: u16, data: &[u8]) -> Result<(), Error> {
        let frame = create_frame::<B::Frame>(cob_id, data)?;
        self.send(&frame)
    }

    pub fn tpdo1(&self, node: u8) -> Option<Tpdo1> {
        self.demux.tpdo1(node)
    }

    pub fn tpdo2(&self, node: u8) -> Option<Tpdo2> {
        self.demux.tpdo2(node)
    }

    pub fn queued_responses(&self) -> usize {
        self.demux.queue_len()
    }

    pub(crate) fn next_response(&self) -> Option<B::Frame> {
        self.demux.pop()
    }

    pub(crate) fn flush_responses(&self) -> usize {
        self.demux.flush()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.options.clock
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.options.cancel
    }

    pub fn sdo_timeout(&self) -> Duration {
        self.options.sdo_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval
    }

    /// A deadline `timeout` from now on this transport's clock, cancelled
    /// through its token.
    pub fn deadline(&self, timeout: Duration) -> Deadline {
        Deadline::after(self.options.clock.clone(), timeout, self.options.cancel.clone())
    }

    pub fn pause(&self, duration: Duration) -> Result<(), Error> {
        crate::wait::pause(&self.options.clock, &self.options.cancel, duration)
    }
}

impl<B: CanBus> Drop for Transport<B> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn receive_loop<B: CanBus>(
    mut bus: B,
    demux: Arc<Demultiplexer<B::Frame>>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    debug!("[transport] receive loop started");
    while !stop.load(Ordering::SeqCst) {
        match bus.receive() {
            Ok(frame) => demux.dispatch(&frame),
            Err(nb::Error::WouldBlock) => continue,
            Err(nb::Error::Other(e)) => {
                error!("[transport] receive failed, connection lost: {}", e);
                connected.store(false, Ordering::SeqCst);
                demux.log(Direction::Sys, String::new(), format!("receive failed: {}", e));
                break;
            }
        }
    }
    debug!("[transport] receive loop stopped");
}
