use core::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canopen_cia402::{CanBus, TransportError};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use embedded_can::{Frame, Id, StandardId};
use parking_lot::Mutex;

#[derive(Clone, PartialEq, Eq)]
pub struct TestFrame {
    id: Id,
    data: Vec<u8>,
}

impl TestFrame {
    pub fn std(cob_id: u16, data: &[u8]) -> Self {
        TestFrame::new(StandardId::new(cob_id).unwrap(), data).unwrap()
    }

    pub fn cob_id(&self) -> u16 {
        match self.id {
            Id::Standard(sid) => sid.as_raw(),
            Id::Extended(_) => panic!("extended id in test frame"),
        }
    }
}

impl Frame for TestFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            None
        } else {
            Some(TestFrame { id: id.into(), data: data.to_vec() })
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Debug for TestFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "test_frame({:03X}): {:02x?}", self.cob_id(), self.data)
    }
}

/// Produces the frames the bus "answers" with when the transport transmits.
pub type Responder = Box<dyn FnMut(&TestFrame) -> Vec<TestFrame> + Send>;

struct Shared {
    sent: Mutex<Vec<TestFrame>>,
    responder: Mutex<Option<Responder>>,
    inbound: Sender<TestFrame>,
    fail_receive: AtomicBool,
    fail_transmit: AtomicBool,
}

/// In-memory bus. Both clones share the sent log and the inbound channel.
pub struct MockBus {
    shared: Arc<Shared>,
    inbound: Receiver<TestFrame>,
}

/// Test side of a `MockBus`: inspect what was sent, inject frames, break things.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockBus {
    pub fn new() -> (MockBus, MockHandle) {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared {
            sent: Mutex::new(vec![]),
            responder: Mutex::new(None),
            inbound: tx,
            fail_receive: AtomicBool::new(false),
            fail_transmit: AtomicBool::new(false),
        });
        (MockBus { shared: shared.clone(), inbound: rx }, MockHandle { shared })
    }
}

impl CanBus for MockBus {
    type Frame = TestFrame;

    fn transmit(&mut self, frame: &TestFrame) -> Result<(), TransportError> {
        if self.shared.fail_transmit.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.shared.sent.lock().push(frame.clone());
        let responses = match self.shared.responder.lock().as_mut() {
            Some(responder) => responder(frame),
            None => vec![],
        };
        for response in responses {
            let _ = self.shared.inbound.send(response);
        }
        Ok(())
    }

    fn receive(&mut self) -> nb::Result<TestFrame, TransportError> {
        if self.shared.fail_receive.load(Ordering::SeqCst) {
            return Err(nb::Error::Other(TransportError::Closed));
        }
        match self.inbound.recv_timeout(Duration::from_millis(1)) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(nb::Error::WouldBlock),
            Err(RecvTimeoutError::Disconnected) => Err(nb::Error::Other(TransportError::Closed)),
        }
    }

    fn try_clone(&self) -> Result<Self, TransportError> {
        Ok(MockBus { shared: self.shared.clone(), inbound: self.inbound.clone() })
    }
}

impl MockHandle {
    pub fn sent(&self) -> Vec<TestFrame> {
        self.shared.sent.lock().clone()
    }

    pub fn sent_on(&self, cob_id: u16) -> Vec<Vec<u8>> {
        self.sent().into_iter().filter(|f| f.cob_id() == cob_id).map(|f| f.data().to_vec()).collect()
    }

    pub fn clear_sent(&self) {
        self.shared.sent.lock().clear();
    }

    pub fn inject(&self, frame: TestFrame) {
        let _ = self.shared.inbound.send(frame);
    }

    pub fn set_responder(&self, responder: impl FnMut(&TestFrame) -> Vec<TestFrame> + Send + 'static) {
        *self.shared.responder.lock() = Some(Box::new(responder));
    }

    pub fn fail_receive(&self, fail: bool) {
        self.shared.fail_receive.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transmit(&self, fail: bool) {
        self.shared.fail_transmit.store(fail, Ordering::SeqCst);
    }
}

/// Polls `condition` for up to a second of wall time.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
