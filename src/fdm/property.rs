use std::fmt;
use std::str::FromStr;

use crate::SimulatorError;

macro_rules! properties {
    ($($variant:ident => $path:literal),+ $(,)?) => {
        /// Named values in the engine's property tree.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Property {
            $($variant),+
        }

        impl Property {
            /// Every known property, in declaration order.
            pub const ALL: &'static [Property] = &[$(Property::$variant),+];

            /// Path of the property in the engine's property tree.
            pub const fn path(self) -> &'static str {
                match self {
                    $(Property::$variant => $path),+
                }
            }
        }
    };
}

properties! {
    SimTime => "simulation/sim-time-sec",
    Dt => "simulation/dt",

    Latitude => "position/lat-gc-deg",
    Longitude => "position/long-gc-deg",
    AltitudeSeaLevel => "position/h-sl-ft",
    AltitudeAboveGround => "position/h-agl-ft",

    TrueAirspeed => "velocities/vtrue-kts",
    VelocityNorth => "velocities/v-north-fps",
    VelocityEast => "velocities/v-east-fps",
    VelocityDown => "velocities/v-down-fps",
    U => "velocities/u-fps",
    V => "velocities/v-fps",
    W => "velocities/w-fps",
    P => "velocities/p-rad_sec",
    Q => "velocities/q-rad_sec",
    R => "velocities/r-rad_sec",
    Mach => "velocities/mach",

    PilotAccelerationX => "accelerations/a-pilot-x-ft_sec2",
    PilotAccelerationY => "accelerations/a-pilot-y-ft_sec2",
    PilotAccelerationZ => "accelerations/a-pilot-z-ft_sec2",
    PDot => "accelerations/pdot-rad_sec2",
    QDot => "accelerations/qdot-rad_sec2",
    RDot => "accelerations/rdot-rad_sec2",
    UDot => "accelerations/udot-ft_sec2",
    VDot => "accelerations/vdot-ft_sec2",
    WDot => "accelerations/wdot-ft_sec2",

    Phi => "attitude/phi-rad",
    Theta => "attitude/theta-rad",
    Psi => "attitude/psi-rad",

    EngineRunning => "propulsion/engine/set-running",
    EngineRpm => "propulsion/engine/engine-rpm",
    Thrust => "propulsion/engine/thrust-lbs",

    Temperature => "atmosphere/T-R",
    TemperatureSeaLevel => "atmosphere/T-sl-R",
    Pressure => "atmosphere/P-psf",
    PressureSeaLevel => "atmosphere/P-sl-psf",
    Density => "atmosphere/rho-slugs_ft3",
    DynamicPressure => "aero/qbar-psf",

    AileronCmd => "fcs/aileron-cmd-norm",
    ElevatorCmd => "fcs/elevator-cmd-norm",
    RudderCmd => "fcs/rudder-cmd-norm",
    ThrottleCmd => "fcs/throttle-cmd-norm",
    MixtureCmd => "fcs/mixture-cmd-norm",

    IcLatitude => "ic/lat-gc-deg",
    IcLongitude => "ic/long-gc-deg",
    IcAltitude => "ic/h-sl-ft",
    IcAirspeed => "ic/vt-kts",
    IcHeading => "ic/psi-true-deg",
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Property {
    type Err = SimulatorError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .iter()
            .copied()
            .find(|property| property.path() == path)
            .ok_or_else(|| SimulatorError::Protocol(format!("unknown property {}", path)))
    }
}
