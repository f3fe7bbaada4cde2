#![allow(dead_code)]

pub mod drive_sim;
pub mod mock_bus;

use std::sync::Arc;
use std::time::{Duration, Instant};

use canopen_cia402::{Clock, ManualClock, Transport, TransportOptions};
use crossbeam_channel::{unbounded, Receiver};

use self::mock_bus::{MockBus, MockHandle};

lazy_static! {
    static ref LOGGER: () = {
        let _ = env_logger::builder().is_test(true).try_init();
    };
}

pub fn init_logger() {
    lazy_static::initialize(&LOGGER);
}

pub struct TestContext {
    pub transport: Transport<MockBus>,
    pub bus: MockHandle,
    pub clock: Arc<ManualClock>,
    pub events: Receiver<canopen_cia402::BusEvent>,
}

impl TestContext {
    /// A connected transport over a mock bus, on virtual time.
    pub fn new() -> Self {
        Self::with_options(|options| options)
    }

    pub fn with_options(adjust: impl FnOnce(TransportOptions) -> TransportOptions) -> Self {
        init_logger();
        let clock = Arc::new(ManualClock::with_real_slice(Duration::from_millis(1)));
        let (events_tx, events) = unbounded();
        let options = TransportOptions::default().with_clock(clock.clone()).with_events(events_tx);
        let transport = Transport::new(adjust(options));
        let (bus, handle) = MockBus::new();
        transport.connect_bus(bus).expect("mock bus connects");
        TestContext { transport, bus: handle, clock, events }
    }

    pub fn clock_now(&self) -> Instant {
        self.clock.now()
    }
}
