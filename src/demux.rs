//! Routing of received frames.
//!
//! TPDO1/TPDO2 frames from nodes 1..=127 update a per-node snapshot (latest
//! frame wins) and are announced on the event channel. Everything else lands
//! in a bounded response queue that drops its oldest entry when full; the
//! SDO client drains it.
//!
//! The receive thread is the only writer; consumers read snapshots and pop
//! from the queue.

use std::time::SystemTime;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use embedded_can::Frame;
use hashbrown::HashMap;
use log::trace;
use parking_lot::RwLock;

use crate::constant::{COB_FUNC_MASK, COB_FUNC_TPDO_1, COB_FUNC_TPDO_2, COB_NODE_MASK};
use crate::pdo::{Tpdo1, Tpdo2};
use crate::util::{frame_to_string, get_cob_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
    Sys,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub direction: Direction,
    /// candump style text; empty for `Sys` entries.
    pub frame_text: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Log(LogEntry),
    Tpdo1 { node: u8, data: Tpdo1 },
    Tpdo2 { node: u8, data: Tpdo2 },
}

pub struct Demultiplexer<F> {
    queue_tx: Sender<F>,
    queue_rx: Receiver<F>,
    tpdo1: RwLock<HashMap<u8, Tpdo1>>,
    tpdo2: RwLock<HashMap<u8, Tpdo2>>,
    events: Option<Sender<BusEvent>>,
}

impl<F: Frame + Clone> Demultiplexer<F> {
    pub fn new(capacity: usize, events: Option<Sender<BusEvent>>) -> Self {
        let (queue_tx, queue_rx) = bounded(capacity.max(1));
        Demultiplexer {
            queue_tx,
            queue_rx,
            tpdo1: RwLock::new(HashMap::new()),
            tpdo2: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn dispatch(&self, frame: &F) {
        let text = frame_to_string(frame);
        trace!("[transport] rx {}", text);
        self.log(Direction::Rx, text, String::new());

        let Some(cob_id) = get_cob_id(frame) else {
            self.enqueue(frame.clone());
            return;
        };
        let node = (cob_id & COB_NODE_MASK) as u8;
        match (cob_id & COB_FUNC_MASK, node) {
            (COB_FUNC_TPDO_1, 1..=127) => {
                let data = Tpdo1::decode(frame.data());
                self.tpdo1.write().insert(node, data);
                self.notify(BusEvent::Tpdo1 { node, data });
            }
            (COB_FUNC_TPDO_2, 1..=127) => {
                let data = Tpdo2::decode(frame.data());
                self.tpdo2.write().insert(node, data);
                self.notify(BusEvent::Tpdo2 { node, data });
            }
            _ => self.enqueue(frame.clone()),
        }
    }

    fn enqueue(&self, mut frame: F) {
        loop {
            match self.queue_tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(dropped) = self.queue_rx.try_recv() {
                        trace!("[transport] response queue full, dropped {}", frame_to_string(&dropped));
                    }
                    frame = rejected;
                }
                // both ends live in `self`
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn pop(&self) -> Option<F> {
        self.queue_rx.try_recv().ok()
    }

    /// Drops everything queued and returns how many frames that was.
    pub fn flush(&self) -> usize {
        self.queue_rx.try_iter().count()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_rx.len()
    }

    pub fn tpdo1(&self, node: u8) -> Option<Tpdo1> {
        self.tpdo1.read().get(&node).copied()
    }

    pub fn tpdo2(&self, node: u8) -> Option<Tpdo2> {
        self.tpdo2.read().get(&node).copied()
    }

    pub fn clear(&self) {
        self.flush();
        self.tpdo1.write().clear();
        self.tpdo2.write().clear();
    }

    pub fn log(&self, direction: Direction, frame_text: String, message: String) {
        self.notify(BusEvent::Log(LogEntry { timestamp: SystemTime::now(), direction, frame_text, message }));
    }

    fn notify(&self, event: BusEvent) {
        if let Some(events) = &self.events {
            // never block the receive thread on a slow sink
            let _ = events.try_send(event);
        }
    }
}
