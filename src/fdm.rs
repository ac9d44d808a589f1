use crate::SimulatorError;

use property::Property;

pub mod builder;
pub mod kinematic;
pub mod property;
pub mod state;

/// Access to a flight dynamics model engine.
///
/// The engine owns the aircraft state and integrates it; everything in this crate
/// reads and writes that state through named [Property] values expressed in the
/// engine's native units (feet, knots, radians, Rankine, pounds per square foot).
/// Conversions to SI happen in [state](crate::Position) and the sensors.
pub trait FlightDynamicsModel: Send {
    /// Returns the current value of `property`.
    fn property(&self, property: Property) -> f64;

    /// Writes `value` to `property`.
    ///
    /// Writing a read-only output property has no effect until the next step
    /// recomputes it.
    fn set_property(&mut self, property: Property, value: f64);

    /// Sets the integration timestep in seconds.
    fn set_dt(&mut self, dt: f64);

    /// Loads the `ic/*` properties into the model state and resets the simulation
    /// time to zero.
    fn run_ic(&mut self) -> Result<(), SimulatorError>;

    /// Advances the model by one timestep.
    fn run(&mut self) -> Result<(), SimulatorError>;

    /// Asks the engine's trim solver for a steady flight condition.
    fn trim(&mut self, mode: builder::TrimMode) -> Result<(), SimulatorError>;

    /// Simulation time in seconds.
    fn sim_time(&self) -> f64 {
        self.property(Property::SimTime)
    }

    /// Integration timestep in seconds.
    fn dt(&self) -> f64 {
        self.property(Property::Dt)
    }
}
