//! Conversions from the engine's imperial units to SI.

use uom::si::acceleration::{foot_per_second_squared, meter_per_second_squared};
use uom::si::f64::{Acceleration, Force, Length, Pressure, ThermodynamicTemperature, Velocity};
use uom::si::force::{newton, pound_force};
use uom::si::length::{foot, meter};
use uom::si::pressure::{pascal, pound_force_per_square_foot};
use uom::si::thermodynamic_temperature::{degree_rankine, kelvin};
use uom::si::velocity::{foot_per_second, knot, meter_per_second};

/// kg/m³ in one slug/ft³.
pub const KG_PER_CUBIC_METER_PER_SLUG_PER_CUBIC_FOOT: f64 = 515.378_818;

pub fn feet_to_meters(value: f64) -> f64 {
    Length::new::<foot>(value).get::<meter>()
}

pub fn meters_to_feet(value: f64) -> f64 {
    Length::new::<meter>(value).get::<foot>()
}

pub fn fps_to_mps(value: f64) -> f64 {
    Velocity::new::<foot_per_second>(value).get::<meter_per_second>()
}

pub fn knots_to_mps(value: f64) -> f64 {
    Velocity::new::<knot>(value).get::<meter_per_second>()
}

pub fn mps_to_knots(value: f64) -> f64 {
    Velocity::new::<meter_per_second>(value).get::<knot>()
}

pub fn fps2_to_mps2(value: f64) -> f64 {
    Acceleration::new::<foot_per_second_squared>(value).get::<meter_per_second_squared>()
}

pub fn rankine_to_kelvin(value: f64) -> f64 {
    ThermodynamicTemperature::new::<degree_rankine>(value).get::<kelvin>()
}

pub fn psf_to_pascal(value: f64) -> f64 {
    Pressure::new::<pound_force_per_square_foot>(value).get::<pascal>()
}

pub fn pounds_to_newtons(value: f64) -> f64 {
    Force::new::<pound_force>(value).get::<newton>()
}

pub fn slug_ft3_to_kg_m3(value: f64) -> f64 {
    value * KG_PER_CUBIC_METER_PER_SLUG_PER_CUBIC_FOOT
}
