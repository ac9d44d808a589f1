//! UDP interfaces for FDM data: request/response by data group, and periodic
//! pushes of the full data packet to configured clients.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::MAX_DATAGRAM_SIZE;
use crate::SimulatorError;
use crate::configuration::FdmClient;
use crate::fdm::state::{Controls, Engine, FdmData, Gps};
use crate::simulator::{Simulator, lock};

/// Data groups served by [FdmDataServer], selected by the request's command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataGroup {
    Gps = 0x00,
    Accelerometer = 0x01,
    Gyroscope = 0x02,
    Thermometer = 0x03,
    PressureSensor = 0x04,
    PitotTube = 0x05,
    Ins = 0x06,
    Engine = 0x07,
    FlightControls = 0x08,
}

impl DataGroup {
    pub const ALL: [DataGroup; 9] = [
        DataGroup::Gps,
        DataGroup::Accelerometer,
        DataGroup::Gyroscope,
        DataGroup::Thermometer,
        DataGroup::PressureSensor,
        DataGroup::PitotTube,
        DataGroup::Ins,
        DataGroup::Engine,
        DataGroup::FlightControls,
    ];

    pub fn from_command(command: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.command() == command)
    }

    pub const fn command(self) -> u8 {
        self as u8
    }

    /// Number of values in a response for this group.
    pub const fn value_count(self) -> usize {
        match self {
            DataGroup::Gps => 5,
            DataGroup::Accelerometer | DataGroup::Gyroscope => 3,
            DataGroup::Thermometer | DataGroup::PressureSensor | DataGroup::PitotTube => 1,
            DataGroup::Ins => 7,
            DataGroup::Engine => 2,
            DataGroup::FlightControls => 4,
        }
    }

    /// Reads the group's values. Sensor groups are measured with noise.
    pub fn values(self, simulator: &mut Simulator) -> Vec<f64> {
        match self {
            DataGroup::Gps => {
                let gps = Gps::from_model(simulator.model());
                vec![gps.latitude, gps.longitude, gps.altitude, gps.airspeed, gps.heading]
            }
            DataGroup::Accelerometer => simulator
                .measure(|sensors, model| sensors.accelerometer.measure(model))
                .values(),
            DataGroup::Gyroscope => simulator
                .measure(|sensors, model| sensors.gyroscope.measure(model))
                .values(),
            DataGroup::Thermometer => simulator
                .measure(|sensors, model| sensors.thermometer.measure(model))
                .values(),
            DataGroup::PressureSensor => simulator
                .measure(|sensors, model| sensors.pressure_sensor.measure(model))
                .values(),
            DataGroup::PitotTube => simulator
                .measure(|sensors, model| sensors.pitot_tube.measure(model))
                .values(),
            DataGroup::Ins => simulator
                .measure(|sensors, model| sensors.inertial_navigation_system.measure(model))
                .values(),
            DataGroup::Engine => {
                let engine = Engine::from_model(simulator.model());
                vec![engine.thrust, engine.throttle]
            }
            DataGroup::FlightControls => {
                let controls = Controls::from_model(simulator.model());
                vec![controls.aileron, controls.elevator, controls.rudder, controls.throttle]
            }
        }
    }
}

/// Encodes a response: the command byte followed by each value as `f32`.
pub fn encode_group_response(group: DataGroup, values: &[f64]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(1 + values.len() * 4);
    datagram.push(group.command());
    for value in values {
        datagram.extend_from_slice(&(*value as f32).to_be_bytes());
    }
    datagram
}

pub fn decode_group_response(datagram: &[u8]) -> Result<(DataGroup, Vec<f32>), SimulatorError> {
    let (&command, payload) = datagram
        .split_first()
        .ok_or_else(|| SimulatorError::Protocol("empty response".into()))?;
    let group = DataGroup::from_command(command)
        .ok_or_else(|| SimulatorError::Protocol(format!("unknown data group 0x{:02x}", command)))?;
    if payload.len() != group.value_count() * 4 {
        return Err(SimulatorError::Protocol(format!(
            "expected {} values for {:?} but got {} bytes",
            group.value_count(),
            group,
            payload.len()
        )));
    }

    let values = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok((group, values))
}

/// Values in a pushed packet: the simulation time followed by 14 FDM fields.
pub const FDM_PACKET_VALUES: usize = 15;
pub const FDM_PACKET_SIZE: usize = FDM_PACKET_VALUES * 8;

fn packet_values(data: &FdmData) -> [f64; FDM_PACKET_VALUES] {
    [
        data.time,
        data.x_acceleration,
        data.y_acceleration,
        data.z_acceleration,
        data.roll_rate,
        data.pitch_rate,
        data.yaw_rate,
        data.static_pressure,
        data.total_pressure,
        data.temperature,
        data.latitude,
        data.longitude,
        data.altitude,
        data.airspeed,
        data.heading,
    ]
}

/// Encodes the packet pushed to FDM clients as big-endian `f64` values.
pub fn encode_fdm_packet(data: &FdmData) -> Vec<u8> {
    packet_values(data)
        .iter()
        .flat_map(|value| value.to_be_bytes())
        .collect()
}

/// Decodes a pushed packet. Fields the packet does not carry are zero.
pub fn decode_fdm_packet(packet: &[u8]) -> Result<FdmData, SimulatorError> {
    if packet.len() != FDM_PACKET_SIZE {
        return Err(SimulatorError::Protocol(format!(
            "expected a {} byte fdm packet but got {} bytes",
            FDM_PACKET_SIZE,
            packet.len()
        )));
    }

    let mut values = packet.chunks_exact(8).map(|chunk| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        f64::from_be_bytes(bytes)
    });
    let mut next = || values.next().unwrap_or_default();

    Ok(FdmData {
        time: next(),
        x_acceleration: next(),
        y_acceleration: next(),
        z_acceleration: next(),
        roll_rate: next(),
        pitch_rate: next(),
        yaw_rate: next(),
        static_pressure: next(),
        total_pressure: next(),
        temperature: next(),
        latitude: next(),
        longitude: next(),
        altitude: next(),
        airspeed: next(),
        heading: next(),
        ..Default::default()
    })
}

/// Answers single-byte data group requests.
pub struct FdmDataServer {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl FdmDataServer {
    pub async fn bind(address: &str) -> Result<Self, SimulatorError> {
        let socket = UdpSocket::bind(address).await?;
        let local_addr = socket.local_addr()?;

        Ok(FdmDataServer { socket, local_addr })
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
        info!("FDM data server listening on {}", self.local_addr);
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("FDM data server stopped");
                    break;
                }
                result = self.socket.recv_from(&mut buffer) => {
                    let (length, sender) = match result {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("Failed to receive FDM data request: {}", e);
                            continue;
                        }
                    };
                    let Some(&command) = buffer[..length].first() else {
                        warn!("Dropped empty FDM data request from {}", sender);
                        continue;
                    };
                    let Some(group) = DataGroup::from_command(command) else {
                        warn!("Dropped unknown FDM data request 0x{:02x} from {}", command, sender);
                        continue;
                    };

                    let values = group.values(&mut lock(&simulator));
                    let response = encode_group_response(group, &values);
                    debug!("Sending {:?} to {}", group, sender);
                    if let Err(e) = self.socket.send_to(&response, sender).await {
                        warn!("Failed to send FDM data to {}: {}", sender, e);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Pushes the FDM data packet to one client at the client's own rate.
pub struct FdmDataPublisher {
    socket: UdpSocket,
    destination: SocketAddr,
    period: Duration,
}

impl FdmDataPublisher {
    /// Resolves the client address and binds an ephemeral socket for it.
    pub async fn bind(client: &FdmClient) -> Result<Self, SimulatorError> {
        let destination = tokio::net::lookup_host(client.address())
            .await?
            .next()
            .ok_or_else(|| {
                SimulatorError::InvalidConfiguration(format!("cannot resolve {}", client.host))
            })?;
        let period = client.period()?;

        let local = if destination.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;

        Ok(FdmDataPublisher {
            socket,
            destination,
            period,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Sends a packet every period until the cancellation token is triggered.
    pub async fn run(
        &self,
        simulator: Arc<Mutex<Simulator>>,
        cancel: CancellationToken,
    ) -> Result<(), SimulatorError> {
        info!(
            "Sending FDM data to {} every {:?}",
            self.destination, self.period
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stopped sending FDM data to {}", self.destination);
                    break;
                }
                _ = ticker.tick() => {
                    let data = lock(&simulator).fdm_data();
                    let packet = encode_fdm_packet(&data);
                    if let Err(e) = self.socket.send_to(&packet, self.destination).await {
                        warn!("Failed to send FDM data to {}: {}", self.destination, e);
                    }
                }
            }
        }

        Ok(())
    }
}
