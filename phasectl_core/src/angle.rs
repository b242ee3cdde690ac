//! Plane angle with an explicit unit at every boundary.
//!
//! Stored canonically in radians; degrees are a view.

use std::f64::consts::{PI, TAU};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Degrees,
    Radians,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Angle {
    rad: f64,
}

impl Angle {
    pub const ZERO: Angle = Angle { rad: 0.0 };

    pub fn new(value: f64, unit: AngleUnit) -> Self {
        match unit {
            AngleUnit::Degrees => Self::from_degrees(value),
            AngleUnit::Radians => Self::from_radians(value),
        }
    }

    #[inline]
    pub const fn from_radians(rad: f64) -> Self {
        Self { rad }
    }

    #[inline]
    pub fn from_degrees(deg: f64) -> Self {
        Self {
            rad: deg.to_radians(),
        }
    }

    #[inline]
    pub fn radians(self) -> f64 {
        self.rad
    }

    #[inline]
    pub fn degrees(self) -> f64 {
        self.rad.to_degrees()
    }

    pub fn value_in(self, unit: AngleUnit) -> f64 {
        match unit {
            AngleUnit::Degrees => self.degrees(),
            AngleUnit::Radians => self.radians(),
        }
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self { rad: self.rad.abs() }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.rad == 0.0
    }

    pub fn is_finite(self) -> bool {
        self.rad.is_finite()
    }

    /// Equivalent angle in `[-π, π]`.
    pub fn wrap_pi(self) -> Self {
        if !self.rad.is_finite() {
            return self;
        }
        let wrapped = (self.rad + PI).rem_euclid(TAU) - PI;
        // rem_euclid maps +π onto -π; keep the sign of the input at the boundary.
        if wrapped == -PI && self.rad > 0.0 {
            Self { rad: PI }
        } else {
            Self { rad: wrapped }
        }
    }
}

impl Add for Angle {
    type Output = Angle;
    fn add(self, rhs: Angle) -> Angle {
        Angle {
            rad: self.rad + rhs.rad,
        }
    }
}

impl AddAssign for Angle {
    fn add_assign(&mut self, rhs: Angle) {
        self.rad += rhs.rad;
    }
}

impl Sub for Angle {
    type Output = Angle;
    fn sub(self, rhs: Angle) -> Angle {
        Angle {
            rad: self.rad - rhs.rad,
        }
    }
}

impl Neg for Angle {
    type Output = Angle;
    fn neg(self) -> Angle {
        Angle { rad: -self.rad }
    }
}

impl Mul<f64> for Angle {
    type Output = Angle;
    fn mul(self, k: f64) -> Angle {
        Angle { rad: self.rad * k }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}°", self.degrees())
    }
}
