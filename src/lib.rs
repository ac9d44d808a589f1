//! Huginn is a flight simulator server for hardware-in-the-loop and
//! software-in-the-loop testing of flight controllers.
//!
//! A flight dynamics model (FDM) engine is driven at a fixed timestep while the
//! simulated aircraft state is published to external clients:
//!
//! * A REST interface returning JSON for the FDM, the instruments and the
//!   simulator state, which also accepts pause/resume/reset/step/run_for commands.
//! * A UDP controls port that writes aileron/elevator/rudder/throttle commands.
//! * A UDP request/response port and periodic UDP pushes of packed sensor data.
//! * A TCP telemetry stream of length-prefixed snapshots.
//!
//! Sensors add Gaussian measurement noise, refreshed at each sensor's update
//! rate in simulation time, on top of the true values read from the model.
//!
//! The physics belong to the engine behind [FlightDynamicsModel]. The crate ships
//! [KinematicModel], a deterministic stand-in that lets the server run without a
//! native engine.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use huginn::{Configuration, KinematicModel, SimulationServer, Simulator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let configuration = Configuration::default();
//!     let simulator = Simulator::new(Box::new(KinematicModel::new()), &configuration)?;
//!
//!     let server = SimulationServer::bind(configuration, Arc::new(Mutex::new(simulator))).await?;
//!     server.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

mod configuration;
mod fdm;
mod http;
mod protocols;
mod sensors;
mod server;
mod simulator;
mod statistics;
mod units;

pub use configuration::{Configuration, FdmClient, InitialCondition};
pub use fdm::builder::{FdmBuilder, TrimMode};
pub use fdm::kinematic::KinematicModel;
pub use fdm::property::Property;
pub use fdm::state::{
    Accelerations, Atmosphere, Controls, Engine, FdmData, Gps, Orientation, Position, Velocities,
};
pub use fdm::FlightDynamicsModel;
pub use http::{HttpResponse, WebServer, route};
pub use protocols::controls::{
    CONTROLS_PACKET_SIZE, ControlsServer, decode_controls, encode_controls,
};
pub use protocols::fdm_data::{
    DataGroup, FDM_PACKET_SIZE, FdmDataPublisher, FdmDataServer, decode_fdm_packet,
    decode_group_response, encode_fdm_packet, encode_group_response,
};
pub use protocols::telemetry::{TelemetryServer, encode_telemetry_frame, read_telemetry_frame};
pub use sensors::{
    Accelerometer, AccelerometerReading, Gyroscope, GyroscopeReading, InertialNavigationSystem,
    InsReading, NoiseModel, PitotTube, PitotTubeReading, PressureSensor, PressureSensorReading,
    Sensors, Thermometer, ThermometerReading,
};
pub use server::SimulationServer;
pub use simulator::command::{CommandRequest, CommandResponse, CommandResult, SimulatorCommand};
pub use simulator::{Simulator, SimulatorStatus, lock};
pub use statistics::Statistics;

/// Errors raised while configuring, running or serving the simulator.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("the flight dynamics model failed to run at t={0:.3}s")]
    FdmRunFailed(f64),

    #[error("failed to trim the aircraft: {0}")]
    TrimFailed(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("the aircraft has crashed")]
    Crashed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
