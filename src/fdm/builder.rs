use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::configuration::{Configuration, InitialCondition};
use crate::units::{meters_to_feet, mps_to_knots};
use crate::{SimulatorError, fdm::FlightDynamicsModel, fdm::property::Property};

const INITIAL_THROTTLE: f64 = 0.65;
const INITIAL_MIXTURE: f64 = 0.87;

/// Flight condition requested from the engine's trim solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimMode {
    Longitudinal,
    Full,
    Ground,
    Pullup,
    Turn,
}

impl TrimMode {
    pub const ALL: [TrimMode; 5] = [
        TrimMode::Longitudinal,
        TrimMode::Full,
        TrimMode::Ground,
        TrimMode::Pullup,
        TrimMode::Turn,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            TrimMode::Longitudinal => "longitudinal",
            TrimMode::Full => "full",
            TrimMode::Ground => "ground",
            TrimMode::Pullup => "pullup",
            TrimMode::Turn => "turn",
        }
    }
}

impl fmt::Display for TrimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrimMode {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrimMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| SimulatorError::InvalidConfiguration(format!("unknown trim mode {}", s)))
    }
}

/// Brings a flight dynamics model to the configured initial condition.
///
/// [FdmBuilder::initialize] is used both when the simulator is created and on
/// every reset, so the aircraft always returns to the same trimmed state.
#[derive(Debug, Clone)]
pub struct FdmBuilder {
    dt: f64,
    initial_condition: InitialCondition,
    trim_mode: TrimMode,
}

impl FdmBuilder {
    pub fn new(configuration: &Configuration) -> Self {
        FdmBuilder {
            dt: configuration.dt,
            initial_condition: configuration.initial_condition,
            trim_mode: configuration.trim_mode,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Loads the initial condition, starts the engine, runs the model once and
    /// trims it.
    pub fn initialize(&self, model: &mut dyn FlightDynamicsModel) -> Result<(), SimulatorError> {
        let ic = &self.initial_condition;
        debug!("Simulation timestep is {}s", self.dt);
        model.set_dt(self.dt);

        model.set_property(Property::IcLatitude, ic.latitude);
        model.set_property(Property::IcLongitude, ic.longitude);
        model.set_property(Property::IcAltitude, meters_to_feet(ic.altitude));
        model.set_property(Property::IcAirspeed, mps_to_knots(ic.airspeed));
        model.set_property(Property::IcHeading, ic.heading);

        model
            .run_ic()
            .map_err(|e| SimulatorError::Initialization(format!("failed to run initial condition: {}", e)))?;

        debug!("Starting the engine");
        model.set_property(Property::EngineRunning, 1.0);
        model.set_property(Property::ThrottleCmd, INITIAL_THROTTLE);
        model.set_property(Property::MixtureCmd, INITIAL_MIXTURE);

        model
            .run()
            .map_err(|e| SimulatorError::Initialization(format!("failed to execute initial run: {}", e)))?;

        debug!("Trimming the aircraft using the {} trim mode", self.trim_mode);
        model.trim(self.trim_mode)?;

        info!(
            "Aircraft initialized at lat={:.6} lon={:.6} alt={:.1}m airspeed={:.1}m/s heading={:.1}",
            ic.latitude, ic.longitude, ic.altitude, ic.airspeed, ic.heading
        );

        Ok(())
    }
}
