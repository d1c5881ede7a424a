use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;
use crate::common::error::DriverError;
use crate::driver::traits::Transport;
use crate::debug;

const LOG_TAG: &str = "udp_transport.rs | udp link";

/// udp socket connected to a single controller
/// reads time out so the listener can notice a shutdown between datagrams
pub struct UdpTransport {
    socket: UdpSocket,
    address: String,
}

impl UdpTransport {
    pub fn connect(address: &str, receive_timeout: Duration) -> Result<Self, DriverError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| DriverError::communication(format!("cannot bind udp socket, exception: {}", e)))?;
        socket
            .connect(address)
            .map_err(|e| DriverError::communication(format!("cannot connect udp socket to {}, exception: {}", address, e)))?;
        socket
            .set_read_timeout(Some(receive_timeout))
            .map_err(|e| DriverError::communication(format!("cannot set read timeout, exception: {}", e)))?;

        debug!(LOG_TAG, "udp socket {:?} connected to {}", socket.local_addr().ok(), address);
        Ok(UdpTransport {
            socket,
            address: address.to_string(),
        })
    }
}

impl Transport for UdpTransport {
    fn send(&self, data: &[u8]) -> Result<(), DriverError> {
        self.socket.send(data).map_err(|e| {
            DriverError::communication(format!("cannot send datagram to {}, exception: {}", self.address, e))
        })?;
        Ok(())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(DriverError::communication(format!(
                "cannot receive datagram from {}, exception: {}",
                self.address, e
            ))),
        }
    }
}
