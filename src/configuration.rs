use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::SimulatorError;
use crate::fdm::builder::TrimMode;

pub const DEFAULT_DT: f64 = 1.0 / 60.0;
pub const DEFAULT_AIRCRAFT: &str = "c172p";
pub const DEFAULT_WEB_PORT: u16 = 8090;
pub const DEFAULT_CONTROLS_PORT: u16 = 10301;
pub const DEFAULT_FDM_DATA_PORT: u16 = 10302;
pub const DEFAULT_TELEMETRY_PORT: u16 = 10303;
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Settings for a simulator run.
///
/// Every field has a default, so a TOML file only needs the keys it overrides:
///
/// ```
/// use huginn::Configuration;
///
/// let configuration: Configuration = toml::from_str(
///     r#"
///     dt = 0.02
///     web_port = 9000
///
///     [initial_condition]
///     altitude = 500.0
///     "#,
/// ).unwrap();
///
/// assert_eq!(configuration.web_port, 9000);
/// assert_eq!(configuration.initial_condition.altitude, 500.0);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Simulation timestep in seconds.
    pub dt: f64,
    /// Name of the aircraft model loaded by the engine.
    pub aircraft: String,
    pub trim_mode: TrimMode,
    pub initial_condition: InitialCondition,
    /// Address the network interfaces bind to.
    pub host: String,
    pub web_port: u16,
    pub controls_port: u16,
    pub fdm_data_port: u16,
    pub telemetry_port: u16,
    /// Destinations that receive periodic FDM data packets.
    pub fdm_clients: Vec<FdmClient>,
    /// Seed for sensor noise; entropy is used when absent.
    pub seed: Option<u64>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            dt: DEFAULT_DT,
            aircraft: DEFAULT_AIRCRAFT.to_string(),
            trim_mode: TrimMode::Full,
            initial_condition: InitialCondition::default(),
            host: DEFAULT_HOST.to_string(),
            web_port: DEFAULT_WEB_PORT,
            controls_port: DEFAULT_CONTROLS_PORT,
            fdm_data_port: DEFAULT_FDM_DATA_PORT,
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            fdm_clients: Vec::new(),
            seed: None,
        }
    }
}

impl Configuration {
    /// Loads a configuration from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, SimulatorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            SimulatorError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        self.period()?;
        self.initial_condition.validate()?;
        for client in &self.fdm_clients {
            client.period()?;
        }
        Ok(())
    }

    /// Simulation timestep as a [Duration].
    pub fn period(&self) -> Result<Duration, SimulatorError> {
        positive_duration(self.dt).ok_or_else(|| {
            SimulatorError::InvalidConfiguration(format!("invalid simulation timestep {}", self.dt))
        })
    }

    pub(crate) fn bind_address(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }
}

/// Initial condition of the aircraft, in degrees and SI units.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct InitialCondition {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level in meters.
    pub altitude: f64,
    /// True airspeed in meters per second.
    pub airspeed: f64,
    /// True heading in degrees.
    pub heading: f64,
}

impl Default for InitialCondition {
    fn default() -> Self {
        InitialCondition {
            latitude: 37.923_254_7,
            longitude: 23.921_773,
            altitude: 300.0,
            airspeed: 30.0,
            heading: 45.0,
        }
    }
}

impl InitialCondition {
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return invalid(format!("invalid latitude {}", self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return invalid(format!("invalid longitude {}", self.longitude));
        }
        if !(0.0..=360.0).contains(&self.heading) {
            return invalid(format!("invalid heading {}", self.heading));
        }
        if self.altitude.is_nan() || self.altitude < 0.0 {
            return invalid(format!("invalid altitude {}", self.altitude));
        }
        if self.airspeed.is_nan() || self.airspeed < 0.0 {
            return invalid(format!("invalid airspeed {}", self.airspeed));
        }
        Ok(())
    }
}

/// A destination for periodic FDM data packets, written `host,port,dt`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FdmClient {
    pub host: String,
    pub port: u16,
    /// Seconds between packets.
    pub dt: f64,
}

impl FdmClient {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Time between packets as a [Duration].
    pub fn period(&self) -> Result<Duration, SimulatorError> {
        positive_duration(self.dt).ok_or_else(|| {
            SimulatorError::InvalidConfiguration(format!("invalid update period {} for {}", self.dt, self))
        })
    }
}

impl fmt::Display for FdmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.host, self.port, self.dt)
    }
}

impl FromStr for FdmClient {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [host, port, dt] = parts.as_slice() else {
            return invalid(format!("expected host,port,dt but got '{}'", s));
        };
        if host.is_empty() {
            return invalid(format!("missing host in '{}'", s));
        }
        let port = port
            .parse()
            .map_err(|_| SimulatorError::InvalidConfiguration(format!("invalid port in '{}'", s)))?;
        let dt = dt
            .parse()
            .map_err(|_| SimulatorError::InvalidConfiguration(format!("invalid dt in '{}'", s)))?;

        Ok(FdmClient {
            host: host.to_string(),
            port,
            dt,
        })
    }
}

/// Converts seconds to a non-zero [Duration], rejecting values it cannot hold.
fn positive_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|duration| !duration.is_zero())
}

fn invalid<T>(message: String) -> Result<T, SimulatorError> {
    Err(SimulatorError::InvalidConfiguration(message))
}
