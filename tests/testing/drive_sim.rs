//! A CiA 402 drive behind an expedited SDO server, good enough to run the
//! enable sequence, mode changes, moves and homing against.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::mock_bus::{MockHandle, TestFrame};

pub const SOD: u16 = 0x0250;
pub const RTSO: u16 = 0x0231;
pub const SO: u16 = 0x0233;
pub const OE: u16 = 0x0237;
pub const QSA: u16 = 0x0217;
pub const FAULT: u16 = 0x0208;

const TARGET_REACHED: u16 = 1 << 10;
const HOMING_ATTAINED: u16 = 1 << 12;
const HOMING_ERROR: u16 = 1 << 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingOutcome {
    Attained,
    Error,
    Never,
}

pub struct DriveSim {
    pub node_id: u8,
    pub status_word: u16,
    /// Ignore state-machine control words (a drive that cannot leave fault).
    pub stuck: bool,
    /// Do not answer SDO requests at all.
    pub silent: bool,
    /// Move to the target when a set-point is applied.
    pub moves: bool,
    pub homing_outcome: HomingOutcome,
    /// Status reads before homing finishes.
    pub homing_reads: u32,
    /// Value shown in 0x6061 regardless of what was requested.
    pub mode_display_override: Option<i8>,
    pub aborts: HashMap<(u16, u8), u32>,
    pub objects: HashMap<(u16, u8), u32>,
    /// Every SDO download, in order: (index, sub_index, value).
    pub writes: Vec<(u16, u8, u32)>,
    homing_countdown: Option<u32>,
}

impl DriveSim {
    pub fn new(node_id: u8, status_word: u16) -> Self {
        DriveSim {
            node_id,
            status_word,
            stuck: false,
            silent: false,
            moves: true,
            homing_outcome: HomingOutcome::Attained,
            homing_reads: 0,
            mode_display_override: None,
            aborts: HashMap::new(),
            objects: HashMap::new(),
            writes: vec![],
            homing_countdown: None,
        }
    }

    /// Answers SDO requests for `node_id` on `bus` from now on.
    pub fn install(self, bus: &MockHandle) -> Arc<Mutex<DriveSim>> {
        let sim = Arc::new(Mutex::new(self));
        let shared = sim.clone();
        bus.set_responder(move |frame| shared.lock().respond(frame));
        sim
    }

    pub fn control_words(&self) -> Vec<u16> {
        self.writes.iter().filter(|w| (w.0, w.1) == (0x6040, 0)).map(|w| w.2 as u16).collect()
    }

    pub fn writes_to(&self, index: u16) -> Vec<(u8, u32)> {
        self.writes.iter().filter(|w| w.0 == index).map(|w| (w.1, w.2)).collect()
    }

    fn respond(&mut self, frame: &TestFrame) -> Vec<TestFrame> {
        use embedded_can::Frame;

        if frame.cob_id() != 0x600 + self.node_id as u16 || self.silent {
            return vec![];
        }
        let data = frame.data();
        let (command, index, sub_index) = (data[0], u16::from_le_bytes([data[1], data[2]]), data[3]);
        let header = [data[1], data[2], data[3]];
        let response_cob_id = 0x580 + self.node_id as u16;
        let reply = move |cmd: u8, value: u32| {
            let v = value.to_le_bytes();
            TestFrame::std(response_cob_id, &[cmd, header[0], header[1], header[2], v[0], v[1], v[2], v[3]])
        };

        if let Some(code) = self.aborts.get(&(index, sub_index)) {
            return vec![reply(0x80, *code)];
        }

        match command {
            0x2F | 0x2B | 0x23 => {
                let len = match command {
                    0x2F => 1,
                    0x2B => 2,
                    _ => 4,
                };
                let mut raw = [0u8; 4];
                raw[..len].copy_from_slice(&data[4..4 + len]);
                let value = u32::from_le_bytes(raw);
                self.writes.push((index, sub_index, value));
                self.download(index, sub_index, value);
                vec![reply(0x60, 0)]
            }
            0x40 => {
                let (size, value) = self.upload(index, sub_index);
                let cmd = match size {
                    1 => 0x4F,
                    2 => 0x4B,
                    _ => 0x43,
                };
                vec![reply(cmd, value)]
            }
            _ => vec![reply(0x80, 0x0504_0001)],
        }
    }

    fn download(&mut self, index: u16, sub_index: u8, value: u32) {
        self.objects.insert((index, sub_index), value);
        match index {
            0x6040 => self.apply_control_word(value as u16),
            0x6060 => {
                let display = self.mode_display_override.map_or(value as u8, |d| d as u8);
                self.objects.insert((0x6061, 0), display as u32);
            }
            _ => {}
        }
    }

    fn upload(&mut self, index: u16, sub_index: u8) -> (u8, u32) {
        match index {
            0x6041 => {
                if let Some(left) = self.homing_countdown {
                    if left == 0 {
                        self.homing_countdown = None;
                        match self.homing_outcome {
                            HomingOutcome::Attained => self.status_word |= HOMING_ATTAINED,
                            HomingOutcome::Error => self.status_word |= HOMING_ERROR,
                            HomingOutcome::Never => {}
                        }
                    } else {
                        self.homing_countdown = Some(left - 1);
                    }
                }
                (2, self.status_word as u32)
            }
            0x6061 => (1, self.objects.get(&(0x6061, 0)).copied().unwrap_or(0)),
            0x6077 | 0x6071 | 0x6040 => (2, self.objects.get(&(index, sub_index)).copied().unwrap_or(0)),
            _ => (4, self.objects.get(&(index, sub_index)).copied().unwrap_or(0)),
        }
    }

    fn mode(&self) -> i8 {
        self.objects.get(&(0x6060, 0)).copied().unwrap_or(0) as u8 as i8
    }

    fn apply_control_word(&mut self, control_word: u16) {
        if self.stuck {
            return;
        }
        let state = self.status_word & !(TARGET_REACHED | HOMING_ATTAINED | HOMING_ERROR);
        match (control_word, state) {
            (0x80, FAULT) => self.status_word = SOD,
            (0x06, SOD) | (0x06, SO) | (0x06, OE) => self.status_word = RTSO,
            (0x07, RTSO) | (0x07, OE) => self.status_word = SO,
            (0x0F, SO) => self.status_word = OE,
            (0x02, OE) => self.status_word = QSA,
            (0x00, _) => self.status_word = SOD,
            (0x3F, OE) => match self.mode() {
                6 => self.homing_countdown = Some(self.homing_reads),
                1 | 8 if self.moves => {
                    let target = self.objects.get(&(0x607A, 0)).copied().unwrap_or(0);
                    self.objects.insert((0x6064, 0), target);
                    self.status_word |= TARGET_REACHED;
                }
                _ => {}
            },
            _ => {}
        }
    }
}
