//! Snapshots of the model state converted to degrees and SI units.

use serde::{Deserialize, Serialize};

use crate::fdm::FlightDynamicsModel;
use crate::fdm::property::Property;
use crate::units::{
    feet_to_meters, fps2_to_mps2, fps_to_mps, knots_to_mps, pounds_to_newtons, psf_to_pascal,
    rankine_to_kelvin, slug_ft3_to_kg_m3,
};

/// Aircraft position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    pub altitude: f64,
    /// True heading in degrees, 0 to 360.
    pub heading: f64,
}

impl Position {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Position {
            latitude: model.property(Property::Latitude),
            longitude: model.property(Property::Longitude),
            altitude: feet_to_meters(model.property(Property::AltitudeSeaLevel)),
            heading: model.property(Property::Psi).to_degrees(),
        }
    }
}

/// Euler angles in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Orientation {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Orientation {
            roll: model.property(Property::Phi).to_degrees(),
            pitch: model.property(Property::Theta).to_degrees(),
            yaw: model.property(Property::Psi).to_degrees(),
        }
    }
}

/// Linear velocities in m/s and body rates in deg/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocities {
    pub true_airspeed: f64,
    pub climb_rate: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
}

impl Velocities {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Velocities {
            true_airspeed: knots_to_mps(model.property(Property::TrueAirspeed)),
            climb_rate: fps_to_mps(-model.property(Property::VelocityDown)),
            u: fps_to_mps(model.property(Property::U)),
            v: fps_to_mps(model.property(Property::V)),
            w: fps_to_mps(model.property(Property::W)),
            roll_rate: model.property(Property::P).to_degrees(),
            pitch_rate: model.property(Property::Q).to_degrees(),
            yaw_rate: model.property(Property::R).to_degrees(),
        }
    }
}

/// Pilot-station accelerations in m/s², angular accelerations in deg/s² and
/// body-axis linear accelerations in m/s².
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accelerations {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub p_dot: f64,
    pub q_dot: f64,
    pub r_dot: f64,
    pub u_dot: f64,
    pub v_dot: f64,
    pub w_dot: f64,
}

impl Accelerations {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Accelerations {
            x: fps2_to_mps2(model.property(Property::PilotAccelerationX)),
            y: fps2_to_mps2(model.property(Property::PilotAccelerationY)),
            z: fps2_to_mps2(model.property(Property::PilotAccelerationZ)),
            p_dot: model.property(Property::PDot).to_degrees(),
            q_dot: model.property(Property::QDot).to_degrees(),
            r_dot: model.property(Property::RDot).to_degrees(),
            u_dot: fps2_to_mps2(model.property(Property::UDot)),
            v_dot: fps2_to_mps2(model.property(Property::VDot)),
            w_dot: fps2_to_mps2(model.property(Property::WDot)),
        }
    }
}

/// Atmosphere at the aircraft position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Atmosphere {
    /// Kelvin.
    pub temperature: f64,
    /// Pascal.
    pub pressure: f64,
    pub sea_level_temperature: f64,
    pub sea_level_pressure: f64,
    /// kg/m³.
    pub density: f64,
}

impl Atmosphere {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Atmosphere {
            temperature: rankine_to_kelvin(model.property(Property::Temperature)),
            pressure: psf_to_pascal(model.property(Property::Pressure)),
            sea_level_temperature: rankine_to_kelvin(model.property(Property::TemperatureSeaLevel)),
            sea_level_pressure: psf_to_pascal(model.property(Property::PressureSeaLevel)),
            density: slug_ft3_to_kg_m3(model.property(Property::Density)),
        }
    }
}

/// Engine output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    /// Newtons.
    pub thrust: f64,
    pub throttle: f64,
    pub rpm: f64,
}

impl Engine {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Engine {
            thrust: pounds_to_newtons(model.property(Property::Thrust)),
            throttle: model.property(Property::ThrottleCmd),
            rpm: model.property(Property::EngineRpm),
        }
    }
}

/// Flight control commands.
///
/// Aileron, elevator and rudder are normalized to [-1, 1]; throttle to [0, 1].
/// Values written to the model are always clamped to those ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Controls {
    pub aileron: f64,
    pub elevator: f64,
    pub rudder: f64,
    pub throttle: f64,
}

impl Controls {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        Controls {
            aileron: model.property(Property::AileronCmd),
            elevator: model.property(Property::ElevatorCmd),
            rudder: model.property(Property::RudderCmd),
            throttle: model.property(Property::ThrottleCmd),
        }
    }

    /// Returns a copy with every command clamped to its range. NaN commands
    /// become neutral.
    pub fn clamped(&self) -> Self {
        Controls {
            aileron: clamp_or_zero(self.aileron, -1.0, 1.0),
            elevator: clamp_or_zero(self.elevator, -1.0, 1.0),
            rudder: clamp_or_zero(self.rudder, -1.0, 1.0),
            throttle: clamp_or_zero(self.throttle, 0.0, 1.0),
        }
    }

    /// Writes the clamped commands to the model.
    pub fn apply(&self, model: &mut dyn FlightDynamicsModel) {
        let controls = self.clamped();
        model.set_property(Property::AileronCmd, controls.aileron);
        model.set_property(Property::ElevatorCmd, controls.elevator);
        model.set_property(Property::RudderCmd, controls.rudder);
        model.set_property(Property::ThrottleCmd, controls.throttle);
    }
}

fn clamp_or_zero(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(min, max) }
}

/// Noise-free GPS instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    pub altitude: f64,
    /// True airspeed in m/s.
    pub airspeed: f64,
    pub heading: f64,
}

impl Gps {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        let position = Position::from_model(model);
        Gps {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude: position.altitude,
            airspeed: knots_to_mps(model.property(Property::TrueAirspeed)),
            heading: position.heading,
        }
    }
}

/// Every true value the simulator publishes, as served by `GET /fdm` and the
/// telemetry stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FdmData {
    pub time: f64,
    pub dt: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub airspeed: f64,
    pub heading: f64,
    pub x_acceleration: f64,
    pub y_acceleration: f64,
    pub z_acceleration: f64,
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    pub temperature: f64,
    pub static_pressure: f64,
    pub total_pressure: f64,
    pub roll: f64,
    pub pitch: f64,
    pub thrust: f64,
    pub aileron: f64,
    pub elevator: f64,
    pub rudder: f64,
    pub throttle: f64,
    pub climb_rate: f64,
}

impl FdmData {
    pub fn from_model(model: &dyn FlightDynamicsModel) -> Self {
        let gps = Gps::from_model(model);
        let accelerations = Accelerations::from_model(model);
        let velocities = Velocities::from_model(model);
        let orientation = Orientation::from_model(model);
        let atmosphere = Atmosphere::from_model(model);
        let engine = Engine::from_model(model);
        let controls = Controls::from_model(model);

        FdmData {
            time: model.sim_time(),
            dt: model.dt(),
            latitude: gps.latitude,
            longitude: gps.longitude,
            altitude: gps.altitude,
            airspeed: gps.airspeed,
            heading: gps.heading,
            x_acceleration: accelerations.x,
            y_acceleration: accelerations.y,
            z_acceleration: accelerations.z,
            roll_rate: velocities.roll_rate,
            pitch_rate: velocities.pitch_rate,
            yaw_rate: velocities.yaw_rate,
            temperature: atmosphere.temperature,
            static_pressure: atmosphere.pressure,
            total_pressure: total_pressure(model),
            roll: orientation.roll,
            pitch: orientation.pitch,
            thrust: engine.thrust,
            aileron: controls.aileron,
            elevator: controls.elevator,
            rudder: controls.rudder,
            throttle: engine.throttle,
            climb_rate: velocities.climb_rate,
        }
    }
}

/// Pitot total pressure in Pascal: static plus dynamic pressure.
pub(crate) fn total_pressure(model: &dyn FlightDynamicsModel) -> f64 {
    psf_to_pascal(model.property(Property::Pressure) + model.property(Property::DynamicPressure))
}
