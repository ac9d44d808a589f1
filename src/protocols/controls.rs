//! UDP interface for flight control commands.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::MAX_DATAGRAM_SIZE;
use crate::SimulatorError;
use crate::fdm::state::Controls;
use crate::simulator::{Simulator, lock};

/// Four `f64` values: aileron, elevator, rudder, throttle.
pub const CONTROLS_PACKET_SIZE: usize = 32;

pub fn encode_controls(controls: &Controls) -> [u8; CONTROLS_PACKET_SIZE] {
    let mut packet = [0u8; CONTROLS_PACKET_SIZE];
    let values = [
        controls.aileron,
        controls.elevator,
        controls.rudder,
        controls.throttle,
    ];
    for (chunk, value) in packet.chunks_exact_mut(8).zip(values) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
    packet
}

/// Decodes a controls datagram. The values are returned as sent; clamping
/// happens when they are applied to the model.
pub fn decode_controls(datagram: &[u8]) -> Result<Controls, SimulatorError> {
    let packet: &[u8; CONTROLS_PACKET_SIZE] = datagram.try_into().map_err(|_| {
        SimulatorError::Protocol(format!(
            "expected a {} byte controls datagram but got {} bytes",
            CONTROLS_PACKET_SIZE,
            datagram.len()
        ))
    })?;

    let value = |index: usize| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&packet[index * 8..(index + 1) * 8]);
        f64::from_be_bytes(bytes)
    };

    Ok(Controls {
        aileron: value(0),
        elevator: value(1),
        rudder: value(2),
        throttle: value(3),
    })
}

/// Receives control datagrams and writes them to the model.
pub struct ControlsServer {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl ControlsServer {
    pub async fn bind(address: &str) -> Result<Self, SimulatorError> {
        let socket = UdpSocket::bind(address).await?;
        let local_addr = socket.local_addr()?;

        Ok(ControlsServer { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the server until the cancellation token is triggered.
    pub async fn run(
        &self,
        simulator: Arc<Mutex<Simulator>>,
        cancel: CancellationToken,
    ) -> Result<(), SimulatorError> {
        info!("Controls server listening on {}", self.local_addr);
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Controls server stopped");
                    break;
                }
                result = self.socket.recv_from(&mut buffer) => {
                    let (length, sender) = match result {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("Failed to receive controls datagram: {}", e);
                            continue;
                        }
                    };
                    match decode_controls(&buffer[..length]) {
                        Ok(controls) => {
                            debug!("Controls from {}: {:?}", sender, controls);
                            lock(&simulator).set_controls(controls);
                        }
                        Err(e) => warn!("Dropped datagram from {}: {}", sender, e),
                    }
                }
            }
        }

        Ok(())
    }
}
