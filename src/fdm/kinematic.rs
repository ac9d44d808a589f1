//! A deterministic kinematic stand-in for a flight dynamics engine.
//!
//! [KinematicModel] moves the aircraft along its heading at constant true
//! airspeed. Control commands drive the body rates directly, throttle maps
//! linearly to thrust, and the atmosphere follows the ISA troposphere. There is
//! no aerodynamic or propulsion modeling. It exists so that the server, the
//! protocols and the sensors can run end to end without a native engine.

use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_3, FRAC_PI_6, TAU};

use crate::SimulatorError;
use crate::fdm::FlightDynamicsModel;
use crate::fdm::builder::TrimMode;
use crate::fdm::property::Property;

const GRAVITY_FPS2: f64 = 32.174_05;
const EARTH_RADIUS_FT: f64 = 20_925_646.3;
const FPS_PER_KNOT: f64 = 1.687_809_857;

const SEA_LEVEL_TEMPERATURE_R: f64 = 518.67;
const SEA_LEVEL_PRESSURE_PSF: f64 = 2116.22;
const LAPSE_RATE_R_PER_FT: f64 = 0.003_566_16;
const PRESSURE_EXPONENT: f64 = 5.255_88;
const GAS_CONSTANT: f64 = 1716.49;
const HEAT_CAPACITY_RATIO: f64 = 1.4;
const TROPOPAUSE_FT: f64 = 36_089.0;

const MAX_ROLL_RATE: f64 = 1.0;
const MAX_PITCH_RATE: f64 = 0.5;
const MAX_YAW_RATE: f64 = 0.3;
const MAX_BANK: f64 = FRAC_PI_3;
const MAX_PITCH: f64 = FRAC_PI_6;
const MAX_THRUST_LBS: f64 = 400.0;
const IDLE_RPM: f64 = 600.0;
const MAX_RPM: f64 = 2700.0;

/// A kinematic point-mass backend for [FlightDynamicsModel].
#[derive(Debug, Clone)]
pub struct KinematicModel {
    properties: HashMap<Property, f64>,
    ground_elevation_ft: f64,
}

impl Default for KinematicModel {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicModel {
    pub fn new() -> Self {
        let mut model = KinematicModel {
            properties: HashMap::new(),
            ground_elevation_ft: 0.0,
        };
        model.set(Property::Dt, 1.0 / 120.0);
        model.set(Property::TemperatureSeaLevel, SEA_LEVEL_TEMPERATURE_R);
        model.set(Property::PressureSeaLevel, SEA_LEVEL_PRESSURE_PSF);
        model.update_atmosphere();
        model
    }

    /// Terrain elevation under the aircraft, in feet above sea level.
    pub fn with_ground_elevation(mut self, elevation_ft: f64) -> Self {
        self.ground_elevation_ft = elevation_ft;
        self
    }

    fn get(&self, property: Property) -> f64 {
        self.properties.get(&property).copied().unwrap_or(0.0)
    }

    fn set(&mut self, property: Property, value: f64) {
        self.properties.insert(property, value);
    }

    fn update_atmosphere(&mut self) {
        let altitude = self.get(Property::AltitudeSeaLevel).clamp(0.0, TROPOPAUSE_FT);
        let temperature = SEA_LEVEL_TEMPERATURE_R - LAPSE_RATE_R_PER_FT * altitude;
        let pressure =
            SEA_LEVEL_PRESSURE_PSF * (temperature / SEA_LEVEL_TEMPERATURE_R).powf(PRESSURE_EXPONENT);
        let density = pressure / (GAS_CONSTANT * temperature);

        let airspeed_fps = self.get(Property::TrueAirspeed) * FPS_PER_KNOT;
        let speed_of_sound = (HEAT_CAPACITY_RATIO * GAS_CONSTANT * temperature).sqrt();

        self.set(Property::Temperature, temperature);
        self.set(Property::Pressure, pressure);
        self.set(Property::Density, density);
        self.set(Property::DynamicPressure, 0.5 * density * airspeed_fps * airspeed_fps);
        self.set(Property::Mach, airspeed_fps / speed_of_sound);
    }

    fn update_engine(&mut self) {
        let throttle = self.get(Property::ThrottleCmd).clamp(0.0, 1.0);
        if self.get(Property::EngineRunning) > 0.0 {
            self.set(Property::Thrust, throttle * MAX_THRUST_LBS);
            self.set(Property::EngineRpm, IDLE_RPM + throttle * (MAX_RPM - IDLE_RPM));
        } else {
            self.set(Property::Thrust, 0.0);
            self.set(Property::EngineRpm, 0.0);
        }
    }

    fn update_kinematics(&mut self, dt: f64) {
        let airspeed_fps = self.get(Property::TrueAirspeed) * FPS_PER_KNOT;

        let p = self.get(Property::AileronCmd).clamp(-1.0, 1.0) * MAX_ROLL_RATE;
        let q = -self.get(Property::ElevatorCmd).clamp(-1.0, 1.0) * MAX_PITCH_RATE;

        let phi = (self.get(Property::Phi) + p * dt).clamp(-MAX_BANK, MAX_BANK);
        let theta = (self.get(Property::Theta) + q * dt).clamp(-MAX_PITCH, MAX_PITCH);

        // coordinated turn plus a rudder contribution
        let turn_rate = if airspeed_fps > 1.0 {
            GRAVITY_FPS2 * phi.tan() / airspeed_fps
        } else {
            0.0
        };
        let r = turn_rate + self.get(Property::RudderCmd).clamp(-1.0, 1.0) * MAX_YAW_RATE;
        let psi = (self.get(Property::Psi) + r * dt).rem_euclid(TAU);

        let horizontal = airspeed_fps * theta.cos();
        let north = horizontal * psi.cos();
        let east = horizontal * psi.sin();
        let down = -airspeed_fps * theta.sin();

        let latitude = self.get(Property::Latitude);
        let d_latitude = (north * dt / EARTH_RADIUS_FT).to_degrees();
        let d_longitude = (east * dt / (EARTH_RADIUS_FT * latitude.to_radians().cos())).to_degrees();
        let altitude = self.get(Property::AltitudeSeaLevel) - down * dt;

        for (property, rate, previous) in [
            (Property::PDot, p, self.get(Property::P)),
            (Property::QDot, q, self.get(Property::Q)),
            (Property::RDot, r, self.get(Property::R)),
        ] {
            self.set(property, (rate - previous) / dt);
        }

        self.set(Property::P, p);
        self.set(Property::Q, q);
        self.set(Property::R, r);
        self.set(Property::Phi, phi);
        self.set(Property::Theta, theta);
        self.set(Property::Psi, psi);

        self.set(Property::VelocityNorth, north);
        self.set(Property::VelocityEast, east);
        self.set(Property::VelocityDown, down);
        self.set(Property::U, airspeed_fps);
        self.set(Property::V, 0.0);
        self.set(Property::W, 0.0);
        self.set(Property::UDot, 0.0);
        self.set(Property::VDot, 0.0);
        self.set(Property::WDot, 0.0);

        self.set(Property::Latitude, latitude + d_latitude);
        self.set(Property::Longitude, self.get(Property::Longitude) + d_longitude);
        self.set(Property::AltitudeSeaLevel, altitude);
        self.set(Property::AltitudeAboveGround, altitude - self.ground_elevation_ft);

        // the pilot feels the load factor of the turn and the pitch attitude
        self.set(Property::PilotAccelerationX, -GRAVITY_FPS2 * theta.sin());
        self.set(Property::PilotAccelerationY, 0.0);
        self.set(Property::PilotAccelerationZ, -GRAVITY_FPS2 * theta.cos() / phi.cos());
    }

    fn is_finite(&self) -> bool {
        self.properties.values().all(|value| value.is_finite())
    }
}

impl FlightDynamicsModel for KinematicModel {
    fn property(&self, property: Property) -> f64 {
        self.get(property)
    }

    fn set_property(&mut self, property: Property, value: f64) {
        self.set(property, value);
    }

    fn set_dt(&mut self, dt: f64) {
        self.set(Property::Dt, dt);
    }

    fn run_ic(&mut self) -> Result<(), SimulatorError> {
        let altitude = self.get(Property::IcAltitude);
        let airspeed = self.get(Property::IcAirspeed);
        if !(altitude.is_finite() && airspeed.is_finite() && airspeed >= 0.0) {
            return Err(SimulatorError::Initialization(format!(
                "invalid initial condition altitude={} airspeed={}",
                altitude, airspeed
            )));
        }

        self.set(Property::SimTime, 0.0);
        self.set(Property::Latitude, self.get(Property::IcLatitude));
        self.set(Property::Longitude, self.get(Property::IcLongitude));
        self.set(Property::AltitudeSeaLevel, altitude);
        self.set(Property::AltitudeAboveGround, altitude - self.ground_elevation_ft);
        self.set(Property::TrueAirspeed, airspeed);
        self.set(Property::Psi, self.get(Property::IcHeading).to_radians().rem_euclid(TAU));
        for property in [
            Property::Phi,
            Property::Theta,
            Property::P,
            Property::Q,
            Property::R,
            Property::AileronCmd,
            Property::ElevatorCmd,
            Property::RudderCmd,
        ] {
            self.set(property, 0.0);
        }
        self.set(Property::PilotAccelerationZ, -GRAVITY_FPS2);

        self.update_atmosphere();
        self.update_engine();
        Ok(())
    }

    fn run(&mut self) -> Result<(), SimulatorError> {
        let dt = self.get(Property::Dt);
        let time = self.get(Property::SimTime);
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimulatorError::FdmRunFailed(time));
        }

        self.update_engine();
        self.update_kinematics(dt);
        self.update_atmosphere();
        self.set(Property::SimTime, time + dt);

        if self.is_finite() {
            Ok(())
        } else {
            Err(SimulatorError::FdmRunFailed(time))
        }
    }

    fn trim(&mut self, mode: TrimMode) -> Result<(), SimulatorError> {
        let on_ground = self.get(Property::AltitudeAboveGround) <= 0.0;
        match mode {
            TrimMode::Ground if !on_ground => {
                return Err(SimulatorError::TrimFailed(
                    "ground trim requested while airborne".into(),
                ));
            }
            TrimMode::Ground => {}
            _ if on_ground || self.get(Property::TrueAirspeed) <= 0.0 => {
                return Err(SimulatorError::TrimFailed(format!(
                    "{} trim requires the aircraft to be flying",
                    mode
                )));
            }
            _ => {}
        }

        match mode {
            TrimMode::Longitudinal | TrimMode::Pullup => {
                self.set(Property::Theta, 0.0);
                self.set(Property::Q, 0.0);
                self.set(Property::ElevatorCmd, 0.0);
            }
            TrimMode::Turn => {
                for property in [Property::Theta, Property::P, Property::Q, Property::ElevatorCmd] {
                    self.set(property, 0.0);
                }
            }
            TrimMode::Full | TrimMode::Ground => {
                for property in [
                    Property::Phi,
                    Property::Theta,
                    Property::P,
                    Property::Q,
                    Property::R,
                    Property::AileronCmd,
                    Property::ElevatorCmd,
                    Property::RudderCmd,
                ] {
                    self.set(property, 0.0);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn model_at(altitude_ft: f64, airspeed_kts: f64, heading: f64) -> KinematicModel {
        let mut model = KinematicModel::new();
        model.set_dt(0.01);
        model.set_property(Property::IcLatitude, 37.9);
        model.set_property(Property::IcLongitude, 23.9);
        model.set_property(Property::IcAltitude, altitude_ft);
        model.set_property(Property::IcAirspeed, airspeed_kts);
        model.set_property(Property::IcHeading, heading);
        model.run_ic().unwrap();
        model
    }

    #[test]
    fn run_ic_loads_initial_condition() {
        let model = model_at(1000.0, 60.0, 90.0);

        assert_eq!(model.sim_time(), 0.0);
        assert_eq!(model.property(Property::Latitude), 37.9);
        assert_eq!(model.property(Property::AltitudeSeaLevel), 1000.0);
        assert_relative_eq!(model.property(Property::Psi), 90f64.to_radians(), epsilon = 1e-12);
    }

    #[test]
    fn run_advances_simulation_time_by_dt() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        for _ in 0..10 {
            model.run().unwrap();
        }
        assert_relative_eq!(model.sim_time(), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn level_flight_north_increases_latitude_only() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        for _ in 0..100 {
            model.run().unwrap();
        }

        assert!(model.property(Property::Latitude) > 37.9);
        assert_relative_eq!(model.property(Property::Longitude), 23.9, epsilon = 1e-9);
        assert_relative_eq!(model.property(Property::AltitudeSeaLevel), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn nose_up_elevator_climbs() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        model.set_property(Property::ElevatorCmd, -1.0);
        for _ in 0..100 {
            model.run().unwrap();
        }

        assert!(model.property(Property::Theta) > 0.0);
        assert!(model.property(Property::AltitudeSeaLevel) > 1000.0);
        assert!(model.property(Property::VelocityDown) < 0.0);
    }

    #[test]
    fn bank_angle_is_limited() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        model.set_property(Property::AileronCmd, 1.0);
        for _ in 0..1000 {
            model.run().unwrap();
        }
        assert_relative_eq!(model.property(Property::Phi), MAX_BANK, epsilon = 1e-12);
        assert!(model.property(Property::R) > 0.0);
    }

    #[test]
    fn throttle_sets_thrust() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        model.set_property(Property::EngineRunning, 1.0);
        model.set_property(Property::ThrottleCmd, 0.5);
        model.run().unwrap();

        assert_relative_eq!(model.property(Property::Thrust), 200.0, epsilon = 1e-9);
        assert!(model.property(Property::EngineRpm) > IDLE_RPM);
    }

    #[test]
    fn stopped_engine_produces_no_thrust() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        model.set_property(Property::ThrottleCmd, 1.0);
        model.run().unwrap();

        assert_eq!(model.property(Property::Thrust), 0.0);
    }

    #[test]
    fn sea_level_atmosphere_matches_isa() {
        let model = model_at(0.0, 0.0, 0.0);

        assert_relative_eq!(model.property(Property::Temperature), 518.67, epsilon = 1e-9);
        assert_relative_eq!(model.property(Property::Pressure), 2116.22, epsilon = 1e-9);
        assert_relative_eq!(model.property(Property::Density), 0.002_377, epsilon = 1e-5);
    }

    #[test]
    fn pressure_drops_with_altitude() {
        let low = model_at(0.0, 60.0, 0.0);
        let high = model_at(5000.0, 60.0, 0.0);

        assert!(high.property(Property::Pressure) < low.property(Property::Pressure));
        assert!(high.property(Property::Temperature) < low.property(Property::Temperature));
    }

    #[test]
    fn full_trim_levels_the_aircraft() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        model.set_property(Property::AileronCmd, 1.0);
        for _ in 0..20 {
            model.run().unwrap();
        }

        model.trim(TrimMode::Full).unwrap();

        assert_eq!(model.property(Property::Phi), 0.0);
        assert_eq!(model.property(Property::P), 0.0);
        assert_eq!(model.property(Property::AileronCmd), 0.0);
    }

    #[test]
    fn ground_trim_fails_while_airborne() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        assert!(matches!(
            model.trim(TrimMode::Ground),
            Err(SimulatorError::TrimFailed(_))
        ));
    }

    #[test]
    fn flight_trim_fails_on_the_ground() {
        let mut model = model_at(0.0, 60.0, 0.0);
        assert!(model.trim(TrimMode::Full).is_err());
        assert!(model.trim(TrimMode::Ground).is_ok());
    }

    #[test]
    fn run_fails_without_a_timestep() {
        let mut model = model_at(1000.0, 60.0, 0.0);
        model.set_dt(0.0);
        assert!(matches!(model.run(), Err(SimulatorError::FdmRunFailed(_))));
    }

    #[test]
    fn run_ic_rejects_negative_airspeed() {
        let mut model = KinematicModel::new();
        model.set_property(Property::IcAirspeed, -1.0);
        assert!(model.run_ic().is_err());
    }

    #[test]
    fn altitude_above_ground_accounts_for_terrain() {
        let model = {
            let mut model = KinematicModel::new().with_ground_elevation(400.0);
            model.set_property(Property::IcAltitude, 1000.0);
            model.set_property(Property::IcAirspeed, 60.0);
            model.run_ic().unwrap();
            model
        };
        assert_eq!(model.property(Property::AltitudeAboveGround), 600.0);
    }
}
