//! Aircraft sensors.
//!
//! A sensor reports the true value read from the model plus a measurement noise
//! sample. Each noise sample is `bias + N(0, sigma)` and is held until the
//! simulation time passes the sensor's next update time, so a 5 Hz sensor polled
//! at 60 Hz keeps the same error for about twelve frames.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::SimulatorError;
use crate::fdm::FlightDynamicsModel;
use crate::fdm::state::{Accelerations, Atmosphere, Gps, Orientation, Velocities, total_pressure};

/// Gaussian measurement error with a constant bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    bias: f64,
    sigma: f64,
}

impl NoiseModel {
    pub fn new(bias: f64, sigma: f64) -> Result<Self, SimulatorError> {
        if !bias.is_finite() || !sigma.is_finite() || sigma < 0.0 {
            return Err(SimulatorError::InvalidConfiguration(format!(
                "invalid noise model bias={} sigma={}",
                bias, sigma
            )));
        }
        Ok(NoiseModel { bias, sigma })
    }

    const fn fixed(bias: f64, sigma: f64) -> Self {
        NoiseModel { bias, sigma }
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        let standard: f64 = StandardNormal.sample(rng);
        self.bias + self.sigma * standard
    }
}

/// Noise samples for `N` channels refreshed on a simulation-time schedule.
#[derive(Debug, Clone)]
struct NoiseChannels<const N: usize> {
    models: [NoiseModel; N],
    samples: [f64; N],
    update_rate: f64,
    update_at: f64,
    rng: StdRng,
}

impl<const N: usize> NoiseChannels<N> {
    fn new(
        models: [NoiseModel; N],
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        if !(update_rate.is_finite() && update_rate > 0.0) {
            return Err(SimulatorError::InvalidConfiguration(format!(
                "invalid sensor update rate {}",
                update_rate
            )));
        }

        Ok(Self::scheduled(models, update_rate, now, rng))
    }

    /// Builds the channels without checking the update rate.
    fn scheduled(models: [NoiseModel; N], update_rate: f64, now: f64, rng: StdRng) -> Self {
        let mut channels = NoiseChannels {
            models,
            samples: [0.0; N],
            update_rate,
            update_at: now,
            rng,
        };
        channels.refresh(now);
        channels
    }

    fn refresh(&mut self, now: f64) {
        for (sample, model) in self.samples.iter_mut().zip(&self.models) {
            *sample = model.sample(&mut self.rng);
        }
        self.update_at = now + 1.0 / self.update_rate;
    }

    /// Returns the current samples, drawing new ones when the update time has passed.
    fn current(&mut self, now: f64) -> [f64; N] {
        if now > self.update_at {
            self.refresh(now);
        }
        self.samples
    }
}

fn add<const N: usize>(truth: [f64; N], noise: [f64; N]) -> [f64; N] {
    let mut sum = truth;
    for (value, error) in sum.iter_mut().zip(noise) {
        *value += error;
    }
    sum
}

macro_rules! reading {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(pub $field: f64),+
        }

        impl $name {
            pub fn values(&self) -> Vec<f64> {
                vec![$(self.$field),+]
            }
        }
    };
}

reading!(
    /// Pilot-station accelerations in m/s².
    AccelerometerReading { x, y, z }
);
reading!(
    /// Body rates in deg/s.
    GyroscopeReading { roll_rate, pitch_rate, yaw_rate }
);
reading!(
    /// Static air temperature in Kelvin.
    ThermometerReading { temperature }
);
reading!(
    /// Static pressure in Pascal.
    PressureSensorReading { static_pressure }
);
reading!(
    /// Total pressure in Pascal.
    PitotTubeReading { total_pressure }
);
reading!(
    /// Inertial navigation solution: degrees, meters and m/s.
    InsReading { latitude, longitude, altitude, airspeed, heading, roll, pitch }
);

/// Accelerometer measuring the pilot-station accelerations.
#[derive(Debug, Clone)]
pub struct Accelerometer {
    noise: NoiseChannels<3>,
}

impl Accelerometer {
    pub const UPDATE_RATE: f64 = 250.0;
    pub const NOISE: [NoiseModel; 3] = [NoiseModel::fixed(0.0, 0.09); 3];

    pub fn new(now: f64, rng: StdRng) -> Self {
        Accelerometer {
            noise: NoiseChannels::scheduled(Self::NOISE, Self::UPDATE_RATE, now, rng),
        }
    }

    pub fn with_noise(
        noise: [NoiseModel; 3],
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        Ok(Accelerometer {
            noise: NoiseChannels::new(noise, update_rate, now, rng)?,
        })
    }

    pub fn true_reading(&self, model: &dyn FlightDynamicsModel) -> AccelerometerReading {
        let accelerations = Accelerations::from_model(model);
        AccelerometerReading {
            x: accelerations.x,
            y: accelerations.y,
            z: accelerations.z,
        }
    }

    pub fn measure(&mut self, model: &dyn FlightDynamicsModel) -> AccelerometerReading {
        let truth = self.true_reading(model);
        let [x, y, z] = add([truth.x, truth.y, truth.z], self.noise.current(model.sim_time()));
        AccelerometerReading { x, y, z }
    }

    pub fn measurement_noise(&self) -> [f64; 3] {
        self.noise.samples
    }

    pub fn update_rate(&self) -> f64 {
        self.noise.update_rate
    }
}

/// Gyroscope measuring the body rates.
#[derive(Debug, Clone)]
pub struct Gyroscope {
    noise: NoiseChannels<3>,
}

impl Gyroscope {
    pub const UPDATE_RATE: f64 = 100.0;
    pub const NOISE: [NoiseModel; 3] = [NoiseModel::fixed(0.002, 0.0005); 3];

    pub fn new(now: f64, rng: StdRng) -> Self {
        Gyroscope {
            noise: NoiseChannels::scheduled(Self::NOISE, Self::UPDATE_RATE, now, rng),
        }
    }

    pub fn with_noise(
        noise: [NoiseModel; 3],
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        Ok(Gyroscope {
            noise: NoiseChannels::new(noise, update_rate, now, rng)?,
        })
    }

    pub fn true_reading(&self, model: &dyn FlightDynamicsModel) -> GyroscopeReading {
        let velocities = Velocities::from_model(model);
        GyroscopeReading {
            roll_rate: velocities.roll_rate,
            pitch_rate: velocities.pitch_rate,
            yaw_rate: velocities.yaw_rate,
        }
    }

    pub fn measure(&mut self, model: &dyn FlightDynamicsModel) -> GyroscopeReading {
        let truth = self.true_reading(model);
        let [roll_rate, pitch_rate, yaw_rate] = add(
            [truth.roll_rate, truth.pitch_rate, truth.yaw_rate],
            self.noise.current(model.sim_time()),
        );
        GyroscopeReading {
            roll_rate,
            pitch_rate,
            yaw_rate,
        }
    }

    pub fn measurement_noise(&self) -> [f64; 3] {
        self.noise.samples
    }

    pub fn update_rate(&self) -> f64 {
        self.noise.update_rate
    }
}

/// Static air temperature probe.
#[derive(Debug, Clone)]
pub struct Thermometer {
    noise: NoiseChannels<1>,
}

impl Thermometer {
    pub const UPDATE_RATE: f64 = 50.0;
    pub const NOISE: NoiseModel = NoiseModel::fixed(0.1, 0.5);

    pub fn new(now: f64, rng: StdRng) -> Self {
        Thermometer {
            noise: NoiseChannels::scheduled([Self::NOISE], Self::UPDATE_RATE, now, rng),
        }
    }

    pub fn with_noise(
        noise: NoiseModel,
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        Ok(Thermometer {
            noise: NoiseChannels::new([noise], update_rate, now, rng)?,
        })
    }

    pub fn true_reading(&self, model: &dyn FlightDynamicsModel) -> ThermometerReading {
        ThermometerReading {
            temperature: Atmosphere::from_model(model).temperature,
        }
    }

    pub fn measure(&mut self, model: &dyn FlightDynamicsModel) -> ThermometerReading {
        let truth = self.true_reading(model);
        let [temperature] = add([truth.temperature], self.noise.current(model.sim_time()));
        ThermometerReading { temperature }
    }

    pub fn measurement_noise(&self) -> f64 {
        self.noise.samples[0]
    }

    pub fn update_rate(&self) -> f64 {
        self.noise.update_rate
    }
}

/// Static pressure port.
#[derive(Debug, Clone)]
pub struct PressureSensor {
    noise: NoiseChannels<1>,
}

impl PressureSensor {
    pub const UPDATE_RATE: f64 = 250.0;
    pub const NOISE: NoiseModel = NoiseModel::fixed(100.0, 10.0);

    pub fn new(now: f64, rng: StdRng) -> Self {
        PressureSensor {
            noise: NoiseChannels::scheduled([Self::NOISE], Self::UPDATE_RATE, now, rng),
        }
    }

    pub fn with_noise(
        noise: NoiseModel,
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        Ok(PressureSensor {
            noise: NoiseChannels::new([noise], update_rate, now, rng)?,
        })
    }

    pub fn true_reading(&self, model: &dyn FlightDynamicsModel) -> PressureSensorReading {
        PressureSensorReading {
            static_pressure: Atmosphere::from_model(model).pressure,
        }
    }

    pub fn measure(&mut self, model: &dyn FlightDynamicsModel) -> PressureSensorReading {
        let truth = self.true_reading(model);
        let [static_pressure] = add([truth.static_pressure], self.noise.current(model.sim_time()));
        PressureSensorReading { static_pressure }
    }

    pub fn measurement_noise(&self) -> f64 {
        self.noise.samples[0]
    }

    pub fn update_rate(&self) -> f64 {
        self.noise.update_rate
    }
}

/// Pitot probe measuring total pressure.
#[derive(Debug, Clone)]
pub struct PitotTube {
    noise: NoiseChannels<1>,
}

impl PitotTube {
    pub const UPDATE_RATE: f64 = 250.0;
    pub const NOISE: NoiseModel = NoiseModel::fixed(100.0, 10.0);

    pub fn new(now: f64, rng: StdRng) -> Self {
        PitotTube {
            noise: NoiseChannels::scheduled([Self::NOISE], Self::UPDATE_RATE, now, rng),
        }
    }

    pub fn with_noise(
        noise: NoiseModel,
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        Ok(PitotTube {
            noise: NoiseChannels::new([noise], update_rate, now, rng)?,
        })
    }

    pub fn true_reading(&self, model: &dyn FlightDynamicsModel) -> PitotTubeReading {
        PitotTubeReading {
            total_pressure: total_pressure(model),
        }
    }

    pub fn measure(&mut self, model: &dyn FlightDynamicsModel) -> PitotTubeReading {
        let truth = self.true_reading(model);
        let [total_pressure] = add([truth.total_pressure], self.noise.current(model.sim_time()));
        PitotTubeReading { total_pressure }
    }

    pub fn measurement_noise(&self) -> f64 {
        self.noise.samples[0]
    }

    pub fn update_rate(&self) -> f64 {
        self.noise.update_rate
    }
}

/// Inertial navigation system.
#[derive(Debug, Clone)]
pub struct InertialNavigationSystem {
    noise: NoiseChannels<7>,
}

impl InertialNavigationSystem {
    pub const UPDATE_RATE: f64 = 5.0;
    /// Latitude, longitude, altitude, airspeed, heading, roll, pitch.
    pub const NOISE: [NoiseModel; 7] = [
        NoiseModel::fixed(0.0001, 0.00005),
        NoiseModel::fixed(0.0001, 0.00005),
        NoiseModel::fixed(7.0, 3.0),
        NoiseModel::fixed(3.0, 1.0),
        NoiseModel::fixed(2.1, 0.4),
        NoiseModel::fixed(1.0, 0.5),
        NoiseModel::fixed(0.7, 0.2),
    ];

    pub fn new(now: f64, rng: StdRng) -> Self {
        InertialNavigationSystem {
            noise: NoiseChannels::scheduled(Self::NOISE, Self::UPDATE_RATE, now, rng),
        }
    }

    pub fn with_noise(
        noise: [NoiseModel; 7],
        update_rate: f64,
        now: f64,
        rng: StdRng,
    ) -> Result<Self, SimulatorError> {
        Ok(InertialNavigationSystem {
            noise: NoiseChannels::new(noise, update_rate, now, rng)?,
        })
    }

    pub fn true_reading(&self, model: &dyn FlightDynamicsModel) -> InsReading {
        let gps = Gps::from_model(model);
        let orientation = Orientation::from_model(model);
        InsReading {
            latitude: gps.latitude,
            longitude: gps.longitude,
            altitude: gps.altitude,
            airspeed: gps.airspeed,
            heading: gps.heading,
            roll: orientation.roll,
            pitch: orientation.pitch,
        }
    }

    pub fn measure(&mut self, model: &dyn FlightDynamicsModel) -> InsReading {
        let truth = self.true_reading(model);
        let [latitude, longitude, altitude, airspeed, heading, roll, pitch] = add(
            [
                truth.latitude,
                truth.longitude,
                truth.altitude,
                truth.airspeed,
                truth.heading,
                truth.roll,
                truth.pitch,
            ],
            self.noise.current(model.sim_time()),
        );
        InsReading {
            latitude,
            longitude,
            altitude,
            airspeed,
            heading,
            roll,
            pitch,
        }
    }

    pub fn measurement_noise(&self) -> [f64; 7] {
        self.noise.samples
    }

    pub fn update_rate(&self) -> f64 {
        self.noise.update_rate
    }
}

/// The full sensor suite of the aircraft.
#[derive(Debug, Clone)]
pub struct Sensors {
    pub accelerometer: Accelerometer,
    pub gyroscope: Gyroscope,
    pub thermometer: Thermometer,
    pub pressure_sensor: PressureSensor,
    pub pitot_tube: PitotTube,
    pub inertial_navigation_system: InertialNavigationSystem,
}

impl Sensors {
    /// Creates the sensors with their default noise models. Every sensor draws
    /// from its own generator derived from `seed`, or from entropy when `seed`
    /// is `None`.
    pub fn new(seed: Option<u64>, now: f64) -> Self {
        let mut seeds = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut next = || StdRng::seed_from_u64(seeds.r#gen());

        Sensors {
            accelerometer: Accelerometer::new(now, next()),
            gyroscope: Gyroscope::new(now, next()),
            thermometer: Thermometer::new(now, next()),
            pressure_sensor: PressureSensor::new(now, next()),
            pitot_tube: PitotTube::new(now, next()),
            inertial_navigation_system: InertialNavigationSystem::new(now, next()),
        }
    }

    /// Draws fresh noise for every sensor and restarts their schedules at `now`.
    /// Used after the simulation time jumps backwards.
    pub fn reschedule(&mut self, now: f64) {
        self.accelerometer.noise.refresh(now);
        self.gyroscope.noise.refresh(now);
        self.thermometer.noise.refresh(now);
        self.pressure_sensor.noise.refresh(now);
        self.pitot_tube.noise.refresh(now);
        self.inertial_navigation_system.noise.refresh(now);
    }
}
