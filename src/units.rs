// Unit-safe physical quantities used across the HAL
//
// Thin f64 newtypes. Reads that fail at the hardware level are reported with an
// infinite sentinel value instead of a separate error channel, so downstream
// math can propagate the failure without branching at every step.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Relative angle, unbounded (multi-turn).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    /// Sentinel returned when a reading could not be obtained.
    pub const INVALID: Angle = Angle(f64::INFINITY);

    pub const fn from_degrees(degrees: f64) -> Self {
        Self(degrees)
    }

    pub fn from_revolutions(revolutions: f64) -> Self {
        Self(revolutions * 360.0)
    }

    pub fn as_degrees(&self) -> f64 {
        self.0
    }

    pub fn as_revolutions(&self) -> f64 {
        self.0 / 360.0
    }

    /// False for the error sentinel (or a NaN produced by math on one).
    pub fn is_valid(&self) -> bool {
        self.0.is_finite()
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0 + rhs.0)
    }
}

impl AddAssign for Angle {
    fn add_assign(&mut self, rhs: Angle) {
        self.0 += rhs.0;
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0 - rhs.0)
    }
}

impl SubAssign for Angle {
    fn sub_assign(&mut self, rhs: Angle) {
        self.0 -= rhs.0;
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Angle {
        Angle(-self.0)
    }
}

impl Mul<f64> for Angle {
    type Output = Angle;

    fn mul(self, rhs: f64) -> Angle {
        Angle(self.0 * rhs)
    }
}

impl Div<f64> for Angle {
    type Output = Angle;

    fn div(self, rhs: f64) -> Angle {
        Angle(self.0 / rhs)
    }
}

/// Angular velocity. Stored as rpm, the native unit of the motor gearing.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct AngularVelocity(f64);

impl AngularVelocity {
    pub const fn from_rpm(rpm: f64) -> Self {
        Self(rpm)
    }

    pub fn from_degrees_per_second(dps: f64) -> Self {
        Self(dps / 6.0)
    }

    pub fn as_rpm(&self) -> f64 {
        self.0
    }

    pub fn as_degrees_per_second(&self) -> f64 {
        self.0 * 6.0
    }
}

impl Mul<f64> for AngularVelocity {
    type Output = AngularVelocity;

    fn mul(self, rhs: f64) -> AngularVelocity {
        AngularVelocity(self.0 * rhs)
    }
}

impl Div for AngularVelocity {
    // ratio of two velocities is dimensionless
    type Output = f64;

    fn div(self, rhs: AngularVelocity) -> f64 {
        self.0 / rhs.0
    }
}

impl Neg for AngularVelocity {
    type Output = AngularVelocity;

    fn neg(self) -> AngularVelocity {
        AngularVelocity(-self.0)
    }
}

/// Distance measured by a range sensor.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Length(f64);

impl Length {
    /// Sentinel returned when a reading could not be obtained.
    pub const INVALID: Length = Length(f64::INFINITY);

    pub const fn from_millimeters(millimeters: f64) -> Self {
        Self(millimeters)
    }

    pub fn from_meters(meters: f64) -> Self {
        Self(meters * 1000.0)
    }

    pub fn as_millimeters(&self) -> f64 {
        self.0
    }

    pub fn as_meters(&self) -> f64 {
        self.0 / 1000.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_finite()
    }
}

impl Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        Length(self.0 + rhs.0)
    }
}

impl Sub for Length {
    type Output = Length;

    fn sub(self, rhs: Length) -> Length {
        Length(self.0 - rhs.0)
    }
}

/// Motor winding temperature in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(celsius: f64) -> Self {
        Self(celsius)
    }

    pub fn as_celsius(&self) -> f64 {
        self.0
    }
}

/// Motor current draw in amps.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Current(f64);

impl Current {
    pub fn from_amps(amps: f64) -> Self {
        Self(amps)
    }

    pub fn from_milliamps(milliamps: f64) -> Self {
        Self(milliamps / 1000.0)
    }

    pub fn as_amps(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_arithmetic() {
        let a = Angle::from_degrees(90.0);
        let b = Angle::from_revolutions(0.25);
        assert_eq!((a + b).as_degrees(), 180.0);
        assert_eq!((a - b).as_degrees(), 0.0);
        assert_eq!((a * 2.0).as_degrees(), 180.0);
        assert_eq!((a / 2.0).as_degrees(), 45.0);
        assert_eq!((-a).as_degrees(), -90.0);
    }

    #[test]
    fn invalid_sentinel_propagates() {
        assert!(!Angle::INVALID.is_valid());
        assert!(!(Angle::INVALID + Angle::from_degrees(10.0)).is_valid());
        // INFINITY - INFINITY is NaN, still invalid
        assert!(!(Angle::INVALID - Angle::INVALID).is_valid());
        assert!(Angle::ZERO.is_valid());
    }

    #[test]
    fn velocity_ratio_is_dimensionless() {
        let blue = AngularVelocity::from_rpm(600.0);
        let output = AngularVelocity::from_rpm(200.0);
        assert_eq!(blue / output, 3.0);
        assert_eq!(AngularVelocity::from_degrees_per_second(600.0).as_rpm(), 100.0);
    }
}
