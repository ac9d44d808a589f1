use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::configuration::Configuration;
use crate::fdm::FlightDynamicsModel;
use crate::fdm::builder::FdmBuilder;
use crate::fdm::property::Property;
use crate::fdm::state::{Controls, FdmData};
use crate::sensors::Sensors;
use crate::statistics::{Statistics, StatisticsEngine};
use crate::SimulatorError;

use command::{CommandRequest, CommandResponse, SimulatorCommand};

pub mod command;

/// State reported by `GET /simulator`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatorStatus {
    pub time: f64,
    pub dt: f64,
    pub running: bool,
    pub paused: bool,
    pub crashed: bool,
}

/// Owns the flight dynamics model and the aircraft sensors, and drives the
/// model in response to the loop and to control commands.
///
/// A new simulator is initialized and paused; the loop only advances the model
/// after a `resume` command. The simulator is shared as `Arc<Mutex<Simulator>>`
/// between the loop, the network tasks and the HTTP thread; use [lock] to access it.
pub struct Simulator {
    model: Box<dyn FlightDynamicsModel>,
    builder: FdmBuilder,
    aircraft: String,
    sensors: Sensors,
    paused: bool,
    crashed: bool,
    statistics: StatisticsEngine,
}

impl Simulator {
    /// Validates the configuration and brings `model` to its initial condition.
    pub fn new(
        mut model: Box<dyn FlightDynamicsModel>,
        configuration: &Configuration,
    ) -> Result<Self, SimulatorError> {
        configuration.validate()?;

        let builder = FdmBuilder::new(configuration);
        builder.initialize(model.as_mut())?;
        let sensors = Sensors::new(configuration.seed, model.sim_time());

        info!(
            "Simulator created for aircraft {} with dt={}s",
            configuration.aircraft, configuration.dt
        );

        Ok(Simulator {
            model,
            builder,
            aircraft: configuration.aircraft.clone(),
            sensors,
            paused: true,
            crashed: false,
            statistics: StatisticsEngine::new(),
        })
    }

    pub fn aircraft(&self) -> &str {
        &self.aircraft
    }

    pub fn model(&self) -> &dyn FlightDynamicsModel {
        self.model.as_ref()
    }

    pub fn time(&self) -> f64 {
        self.model.sim_time()
    }

    pub fn dt(&self) -> f64 {
        self.model.dt()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    pub fn status(&self) -> SimulatorStatus {
        SimulatorStatus {
            time: self.time(),
            dt: self.dt(),
            running: !self.paused && !self.crashed,
            paused: self.paused,
            crashed: self.crashed,
        }
    }

    pub fn statistics(&self) -> Statistics {
        self.statistics.snapshot()
    }

    /// Snapshot of every true value.
    pub fn fdm_data(&self) -> FdmData {
        FdmData::from_model(self.model())
    }

    /// Writes the control commands, clamped to their ranges, to the model.
    pub fn set_controls(&mut self, controls: Controls) {
        controls.apply(self.model.as_mut());
    }

    /// Reads the sensors against the current model state.
    ///
    /// ```no_run
    /// # fn demo(simulator: &mut huginn::Simulator) {
    /// let reading = simulator.measure(|sensors, model| sensors.accelerometer.measure(model));
    /// # }
    /// ```
    pub fn measure<R>(&mut self, read: impl FnOnce(&mut Sensors, &dyn FlightDynamicsModel) -> R) -> R {
        read(&mut self.sensors, self.model.as_ref())
    }

    /// Loop tick: advances the model by one timestep unless paused or crashed.
    pub fn run(&mut self) -> Result<(), SimulatorError> {
        if self.paused || self.crashed {
            return Ok(());
        }
        self.advance()
    }

    /// Advances the model by one timestep whether paused or not.
    pub fn step(&mut self) -> Result<(), SimulatorError> {
        if self.crashed {
            return Err(SimulatorError::Crashed);
        }
        self.advance()
    }

    pub fn pause(&mut self) {
        debug!("Pausing the simulator");
        self.paused = true;
    }

    pub fn resume(&mut self) -> Result<(), SimulatorError> {
        if self.crashed {
            return Err(SimulatorError::Crashed);
        }
        debug!("Resuming the simulator");
        self.paused = false;
        Ok(())
    }

    /// Returns the aircraft to the initial condition and pauses the simulator.
    pub fn reset(&mut self) -> Result<(), SimulatorError> {
        debug!("Resetting the simulator");
        self.paused = true;
        self.builder.initialize(self.model.as_mut())?;
        self.crashed = false;
        self.sensors.reschedule(self.model.sim_time());
        Ok(())
    }

    /// Runs the model for `time_to_run` seconds of simulation time, stopping
    /// early if the aircraft crashes. The paused flag is not changed.
    pub fn run_for(&mut self, time_to_run: f64) -> Result<(), SimulatorError> {
        if !(time_to_run.is_finite() && time_to_run > 0.0) {
            return Err(SimulatorError::InvalidCommand(format!(
                "invalid time to run {}",
                time_to_run
            )));
        }
        if self.crashed {
            return Err(SimulatorError::Crashed);
        }

        let dt = self.builder.dt();
        let start = self.time();
        // bounds the loop for models whose clock does not advance by exactly dt
        let max_steps = ((time_to_run / dt).ceil() as u64).saturating_add(1);
        let tolerance = dt * 1e-6;

        debug!("Running the simulator for {}s", time_to_run);
        for _ in 0..max_steps {
            if self.crashed || self.time() - start >= time_to_run - tolerance {
                break;
            }
            self.advance()?;
        }

        Ok(())
    }

    /// Dispatches `command` and reports the outcome.
    pub fn execute(&mut self, command: SimulatorCommand) -> CommandResponse {
        let result = match command {
            SimulatorCommand::Pause => {
                self.pause();
                Ok(())
            }
            SimulatorCommand::Resume => self.resume(),
            SimulatorCommand::Reset => self.reset(),
            SimulatorCommand::Step => self.step(),
            SimulatorCommand::RunFor { time_to_run } => self.run_for(time_to_run),
        };

        match result {
            Ok(()) => CommandResponse::ok(command.name()),
            Err(e) => {
                warn!("Command {} failed: {}", command.name(), e);
                CommandResponse::error(Some(command.name()), &e)
            }
        }
    }

    /// Resolves and executes a command request.
    pub fn handle(&mut self, request: &CommandRequest) -> CommandResponse {
        match request.command() {
            Ok(command) => self.execute(command),
            Err(e) => {
                warn!("Rejected simulator command {:?}: {}", request.command, e);
                CommandResponse::error(request.command.as_deref(), &e)
            }
        }
    }

    fn advance(&mut self) -> Result<(), SimulatorError> {
        let time = self.time();
        if let Err(e) = self.model.run() {
            error!("Failed to update the flight dynamics model: {}", e);
            self.statistics.increment_error_count();
            return Err(SimulatorError::FdmRunFailed(time));
        }
        self.statistics.increment_step_count();

        let altitude = self.model.property(Property::AltitudeAboveGround);
        if altitude < 0.0 {
            warn!(
                "The aircraft crashed at t={:.3}s, altitude above ground {:.1}ft",
                self.time(),
                altitude
            );
            self.crashed = true;
            self.paused = true;
        }

        Ok(())
    }
}

/// Locks a shared simulator.
///
/// A panic while the lock was held leaves the simulator state consistent, since
/// every mutation is a plain field update, so a poisoned lock is recovered.
pub fn lock(simulator: &Mutex<Simulator>) -> MutexGuard<'_, Simulator> {
    simulator.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::tests::stub_model::StubModel;

    fn configuration() -> Configuration {
        Configuration {
            dt: 0.01,
            seed: Some(1),
            ..Default::default()
        }
    }

    fn simulator(model: StubModel) -> Simulator {
        Simulator::new(Box::new(model), &configuration()).unwrap()
    }

    #[test]
    fn starts_paused_after_initialization() {
        let simulator = simulator(StubModel::new());
        let status = simulator.status();

        assert!(status.paused);
        assert!(!status.running);
        assert!(!status.crashed);
        assert_relative_eq!(status.dt, 0.01);
        // the builder's initial run advances the clock by one step
        assert_relative_eq!(status.time, 0.01, epsilon = 1e-12);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let configuration = Configuration {
            dt: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            Simulator::new(Box::new(StubModel::new()), &configuration),
            Err(SimulatorError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn run_does_nothing_while_paused() {
        let mut simulator = simulator(StubModel::new());
        let time = simulator.time();

        simulator.run().unwrap();

        assert_eq!(simulator.time(), time);
        assert_eq!(simulator.statistics().step_count, 0);
    }

    #[test]
    fn run_advances_when_resumed() {
        let mut simulator = simulator(StubModel::new());
        let time = simulator.time();

        simulator.resume().unwrap();
        simulator.run().unwrap();
        simulator.run().unwrap();

        assert_relative_eq!(simulator.time(), time + 0.02, epsilon = 1e-12);
        assert_eq!(simulator.statistics().step_count, 2);
        assert!(simulator.status().running);
    }

    #[test]
    fn step_advances_while_paused() {
        let mut simulator = simulator(StubModel::new());
        let time = simulator.time();

        simulator.step().unwrap();

        assert_relative_eq!(simulator.time(), time + 0.01, epsilon = 1e-12);
        assert!(simulator.is_paused());
    }

    #[test]
    fn run_for_advances_by_the_requested_time() {
        let mut simulator = simulator(StubModel::new());
        let time = simulator.time();

        simulator.run_for(0.5).unwrap();

        assert_relative_eq!(simulator.time(), time + 0.5, epsilon = 1e-9);
        assert_eq!(simulator.statistics().step_count, 50);
        assert!(simulator.is_paused());
    }

    #[test]
    fn run_for_keeps_running_state() {
        let mut simulator = simulator(StubModel::new());
        simulator.resume().unwrap();

        simulator.run_for(0.1).unwrap();

        assert!(!simulator.is_paused());
    }

    #[test]
    fn run_for_rounds_up_partial_steps() {
        let mut simulator = simulator(StubModel::new());
        let time = simulator.time();

        simulator.run_for(0.015).unwrap();

        assert_relative_eq!(simulator.time(), time + 0.02, epsilon = 1e-9);
    }

    #[test]
    fn run_for_rejects_invalid_time() {
        let mut simulator = simulator(StubModel::new());

        for time_to_run in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                simulator.run_for(time_to_run),
                Err(SimulatorError::InvalidCommand(_))
            ));
        }
    }

    #[test]
    fn crashes_when_below_ground() {
        let mut model = StubModel::new();
        model.descent_per_run = 400.0;
        let mut simulator = simulator(model);
        simulator.resume().unwrap();

        // 1000ft, minus 400ft for the builder's run: two more runs reach ground
        simulator.run().unwrap();
        assert!(!simulator.is_crashed());
        simulator.run().unwrap();
        simulator.run().unwrap();

        assert!(simulator.is_crashed());
        assert!(simulator.is_paused());
        assert!(matches!(simulator.step(), Err(SimulatorError::Crashed)));
        assert!(matches!(simulator.resume(), Err(SimulatorError::Crashed)));
    }

    #[test]
    fn run_for_stops_on_crash() {
        let mut model = StubModel::new();
        model.descent_per_run = 100.0;
        let mut simulator = simulator(model);
        let time = simulator.time();

        simulator.run_for(10.0).unwrap();

        assert!(simulator.is_crashed());
        assert_relative_eq!(simulator.time(), time + 0.1, epsilon = 1e-9);
    }

    #[test]
    fn run_for_accepts_very_long_runs() {
        let mut model = StubModel::new();
        model.descent_per_run = 100.0;
        let mut simulator = simulator(model);
        let time = simulator.time();

        simulator.run_for(1e300).unwrap();

        assert!(simulator.is_crashed());
        assert_relative_eq!(simulator.time(), time + 0.1, epsilon = 1e-9);
        assert_eq!(simulator.statistics().step_count, 10);
    }

    #[test]
    fn reset_clears_crash_and_pauses() {
        let mut model = StubModel::new();
        model.descent_per_run = 600.0;
        let mut simulator = simulator(model);
        simulator.step().unwrap();
        assert!(simulator.is_crashed());

        simulator.reset().unwrap();

        assert!(!simulator.is_crashed());
        assert!(simulator.is_paused());
        assert_relative_eq!(simulator.time(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn reset_pauses_a_running_simulator() {
        let mut simulator = simulator(StubModel::new());
        simulator.resume().unwrap();
        simulator.run().unwrap();

        simulator.reset().unwrap();

        assert!(simulator.is_paused());
    }

    #[test]
    fn engine_failure_is_reported() {
        let mut simulator = simulator(StubModel::new());
        let time = simulator.time();
        let mut model = StubModel::new();
        model.fail_run = true;
        simulator.model = Box::new(model.with(Property::SimTime, time));

        assert!(matches!(simulator.step(), Err(SimulatorError::FdmRunFailed(t)) if t == time));
        assert_eq!(simulator.statistics().error_count, 1);
    }

    #[test]
    fn execute_reports_results() {
        let mut simulator = simulator(StubModel::new());

        assert_eq!(simulator.execute(SimulatorCommand::Resume), CommandResponse::ok("resume"));
        assert!(!simulator.is_paused());
        assert_eq!(simulator.execute(SimulatorCommand::Pause), CommandResponse::ok("pause"));
        assert!(simulator.is_paused());
        assert!(simulator.execute(SimulatorCommand::Step).is_ok());
        assert!(simulator.execute(SimulatorCommand::RunFor { time_to_run: 0.05 }).is_ok());
        assert!(simulator.execute(SimulatorCommand::Reset).is_ok());

        let response = simulator.execute(SimulatorCommand::RunFor { time_to_run: -1.0 });
        assert!(!response.is_ok());
        assert_eq!(response.command.as_deref(), Some("run_for"));
    }

    #[test]
    fn handle_rejects_unknown_commands() {
        let mut simulator = simulator(StubModel::new());
        let request = CommandRequest {
            command: Some("fly".into()),
            time_to_run: None,
        };

        let response = simulator.handle(&request);

        assert!(!response.is_ok());
        assert_eq!(response.command.as_deref(), Some("fly"));
        assert_eq!(response.reason.as_deref(), Some(command::UNKNOWN_COMMAND));
    }

    #[test]
    fn set_controls_clamps_commands() {
        let mut simulator = simulator(StubModel::new());

        simulator.set_controls(Controls {
            aileron: 2.0,
            elevator: -0.5,
            rudder: 0.0,
            throttle: 1.5,
        });

        let controls = Controls::from_model(simulator.model());
        assert_eq!(controls.aileron, 1.0);
        assert_eq!(controls.elevator, -0.5);
        assert_eq!(controls.throttle, 1.0);
    }

    #[test]
    fn measure_reads_sensors_against_the_model() {
        let mut simulator = simulator(StubModel::new().with(Property::Temperature, 518.67));

        let reading = simulator.measure(|sensors, model| sensors.thermometer.measure(model));
        let noise = simulator.measure(|sensors, _| sensors.thermometer.measurement_noise());

        assert_relative_eq!(reading.temperature, 288.15 + noise, epsilon = 1e-6);
    }

    #[test]
    fn lock_recovers_from_poisoning() {
        let simulator = std::sync::Arc::new(Mutex::new(simulator(StubModel::new())));
        let poisoner = simulator.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(simulator.is_poisoned());
        assert!(lock(&simulator).is_paused());
    }
}
