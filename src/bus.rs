//! Raw CAN access.
//!
//! The transport only needs three things from a bus: put a frame on the
//! wire, take one off it (giving up after a short read timeout so the
//! receive loop can notice it should stop), and a second handle to the same
//! socket so sending and receiving can live on different threads.

use core::fmt::Debug;

use crate::error::TransportError;

pub trait CanBus: Send + 'static {
    type Frame: embedded_can::Frame + Debug + Clone + Send + 'static;

    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), TransportError>;

    /// `nb::Error::WouldBlock` when nothing arrived within the read timeout.
    fn receive(&mut self) -> nb::Result<Self::Frame, TransportError>;

    fn try_clone(&self) -> Result<Self, TransportError>
    where
        Self: Sized;
}

#[cfg(target_os = "linux")]
pub use self::socket::SocketCanBus;

#[cfg(target_os = "linux")]
mod socket {
    use std::io;
    use std::os::fd::AsFd;
    use std::time::Duration;

    use log::trace;
    use socketcan::{CanFrame, CanSocket, Socket};

    use super::CanBus;
    use crate::error::TransportError;

    /// A SocketCAN raw socket. The interface has to be up already.
    pub struct SocketCanBus {
        socket: CanSocket,
    }

    impl SocketCanBus {
        pub fn open(interface: &str, read_timeout: Duration) -> Result<Self, TransportError> {
            let socket = CanSocket::open(interface)?;
            socket.set_read_timeout(read_timeout)?;
            trace!("[transport] opened SocketCAN interface '{}', read timeout {:?}", interface, read_timeout);
            Ok(SocketCanBus { socket })
        }
    }

    impl CanBus for SocketCanBus {
        type Frame = CanFrame;

        fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
            self.socket.write_frame(frame)?;
            Ok(())
        }

        fn receive(&mut self) -> nb::Result<CanFrame, TransportError> {
            self.socket.read_frame().map_err(|e| match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => nb::Error::WouldBlock,
                _ => nb::Error::Other(TransportError::Io(e)),
            })
        }

        fn try_clone(&self) -> Result<Self, TransportError> {
            let fd = self.socket.as_fd().try_clone_to_owned()?;
            Ok(SocketCanBus { socket: CanSocket::from(fd) })
        }
    }
}
