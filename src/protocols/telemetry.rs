//! TCP telemetry stream.
//!
//! Every loop period each connected client receives one frame: a 4-byte
//! big-endian length followed by the `postcard` encoding of an [FdmData]
//! snapshot. The stream is one-way; anything a client sends is ignored.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};
use postcard::{from_bytes, to_stdvec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;

use crate::SimulatorError;
use crate::fdm::state::FdmData;
use crate::simulator::{Simulator, lock};

/// Frames larger than this are rejected by [read_telemetry_frame].
const MAX_FRAME_SIZE: usize = 64 * 1024;

pub fn encode_telemetry_frame(data: &FdmData) -> Result<Vec<u8>, SimulatorError> {
    let payload = to_stdvec(data)
        .map_err(|e| SimulatorError::Serialization(format!("Failed to serialize telemetry: {}", e)))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads one frame from a telemetry stream.
pub async fn read_telemetry_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<FdmData, SimulatorError> {
    let mut length_buffer = [0u8; 4];
    reader.read_exact(&mut length_buffer).await?;

    let length = u32::from_be_bytes(length_buffer) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(SimulatorError::Protocol(format!(
            "telemetry frame of {} bytes exceeds {} bytes",
            length, MAX_FRAME_SIZE
        )));
    }

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer).await?;

    from_bytes(&buffer)
        .map_err(|e| SimulatorError::Serialization(format!("Failed to deserialize telemetry: {}", e)))
}

/// Streams telemetry frames to every connected client.
pub struct TelemetryServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TelemetryServer {
    pub async fn bind(address: &str) -> Result<Self, SimulatorError> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;

        Ok(TelemetryServer {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a frame every `period` until the cancellation token is triggered.
    ///
    /// A client whose write fails, or does not complete within one period, is
    /// disconnected.
    pub async fn run(
        &self,
        simulator: Arc<Mutex<Simulator>>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SimulatorError> {
        info!("Telemetry server listening on {}", self.local_addr);

        let mut clients: Vec<(SocketAddr, TcpStream)> = Vec::new();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Telemetry server stopped");
                    break;
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, address)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("Failed to configure telemetry client {}: {}", address, e);
                            }
                            info!("Telemetry client connected: {}", address);
                            clients.push((address, stream));
                        }
                        Err(e) => {
                            error!("Failed to accept telemetry connection: {}", e);
                        }
                    }
                }
                _ = ticker.tick() => {
                    if clients.is_empty() {
                        continue;
                    }
                    let data = lock(&simulator).fdm_data();
                    let frame = encode_telemetry_frame(&data)?;
                    clients = broadcast(clients, &frame, period).await;
                }
            }
        }

        Ok(())
    }
}

async fn broadcast(
    clients: Vec<(SocketAddr, TcpStream)>,
    frame: &[u8],
    write_timeout: Duration,
) -> Vec<(SocketAddr, TcpStream)> {
    let mut connected = Vec::with_capacity(clients.len());

    for (address, mut stream) in clients {
        match timeout(write_timeout, stream.write_all(frame)).await {
            Ok(Ok(())) => connected.push((address, stream)),
            Ok(Err(e)) => warn!("Dropped telemetry client {}: {}", address, e),
            Err(_) => warn!("Dropped telemetry client {}: write timed out", address),
        }
    }

    connected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::fdm::property::Property;
    use crate::tests::stub_model::StubModel;

    #[test]
    fn frame_is_length_prefixed() {
        let data = FdmData {
            time: 3.0,
            latitude: 37.9,
            ..Default::default()
        };

        let frame = encode_telemetry_frame(&data).unwrap();

        let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(length, frame.len() - 4);
        assert_eq!(from_bytes::<FdmData>(&frame[4..]).unwrap(), data);
    }

    #[tokio::test]
    async fn reads_frames_from_a_stream() {
        let data = FdmData {
            altitude: 300.0,
            ..Default::default()
        };
        let mut stream: Vec<u8> = encode_telemetry_frame(&data).unwrap();
        stream.extend(encode_telemetry_frame(&FdmData::default()).unwrap());
        let mut reader = stream.as_slice();

        assert_eq!(read_telemetry_frame(&mut reader).await.unwrap(), data);
        assert_eq!(read_telemetry_frame(&mut reader).await.unwrap(), FdmData::default());
        assert!(matches!(
            read_telemetry_frame(&mut reader).await,
            Err(SimulatorError::Io(_))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_frames() {
        let header = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        let mut reader = &header[..];

        assert!(matches!(
            read_telemetry_frame(&mut reader).await,
            Err(SimulatorError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn streams_snapshots_to_clients() {
        let model = StubModel::new().with(Property::Latitude, 37.9);
        let configuration = Configuration {
            dt: 0.01,
            ..Default::default()
        };
        let simulator = Arc::new(Mutex::new(
            Simulator::new(Box::new(model), &configuration).unwrap(),
        ));
        let server = TelemetryServer::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let simulator = simulator.clone();
            let cancel = cancel.clone();
            async move {
                server
                    .run(simulator, Duration::from_millis(10), cancel)
                    .await
            }
        });

        let mut client = TcpStream::connect(address).await.unwrap();
        let first = timeout(Duration::from_secs(2), read_telemetry_frame(&mut client))
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(2), read_telemetry_frame(&mut client))
            .await
            .unwrap()
            .unwrap();

        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(first.latitude, 37.9);
        assert_eq!(second.dt, 0.01);
    }

    #[tokio::test]
    async fn drops_disconnected_clients() {
        let (client, server_side) = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap();
            let client = TcpStream::connect(address).await.unwrap();
            let (server_side, peer) = listener.accept().await.unwrap();
            (client, (peer, server_side))
        };
        drop(client);

        let frame = encode_telemetry_frame(&FdmData::default()).unwrap();
        let mut clients = vec![server_side];
        // the first write after a reset may still succeed
        for _ in 0..10 {
            clients = broadcast(clients, &frame, Duration::from_millis(100)).await;
            if clients.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(clients.is_empty());
    }
}
