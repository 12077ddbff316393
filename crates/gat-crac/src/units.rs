//! Physical units of CNEC thresholds, flows and range-action setpoints.
//!
//! Flows are computed by the sensitivity engine in megawatts and, when the
//! engine supports it, in amperes. Thresholds may be declared in MW, A or in
//! percent of the branch Imax; they are resolved to MW or A before the linear
//! problem is built, never inside the solver.
//!
//! # Conversion
//!
//! ```text
//!                 P [MW] × 1000
//!   I [A]  =  ─────────────────────
//!              √3 × U_nominal [kV]
//! ```
//!
//! The quantity newtypes ([`Megawatts`], [`Amperes`], [`Kilovolts`]) keep
//! the raw `f64` layout and only exist to stop a voltage from being passed
//! where a current is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic and helpers shared by every quantity newtype
macro_rules! impl_quantity {
    ($type:ty, $symbol:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:.2} {}", self.0, $symbol)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power flow in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_quantity!(Megawatts, "MW");

/// Current in amperes (A)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Amperes(pub f64);

impl_quantity!(Amperes, "A");

/// Nominal voltage of a branch side in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_quantity!(Kilovolts, "kV");

impl Megawatts {
    /// Current carried by this active power at the given nominal voltage.
    #[inline]
    pub fn to_amperes(self, nominal_voltage: Kilovolts) -> Amperes {
        Amperes(self.0 * mw_to_a_factor(nominal_voltage))
    }
}

impl Amperes {
    /// Active power carried by this current at the given nominal voltage.
    #[inline]
    pub fn to_megawatts(self, nominal_voltage: Kilovolts) -> Megawatts {
        Megawatts(self.0 / mw_to_a_factor(nominal_voltage))
    }
}

/// Multiplier turning a MW value into amperes: `1000 / (√3 × U)`.
#[inline]
pub fn mw_to_a_factor(nominal_voltage: Kilovolts) -> f64 {
    1000.0 / (3f64.sqrt() * nominal_voltage.0)
}

/// Unit in which a threshold, flow or setpoint is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[serde(alias = "mw")]
    Megawatt,
    #[serde(alias = "a")]
    Ampere,
    /// Percent of the Imax of the monitored side
    PercentImax,
    /// Setpoint of a PST expressed as an angle
    Degree,
    /// Setpoint of a PST expressed as a tap position
    Tap,
}

impl Unit {
    /// Units in which flows can be computed and optimised.
    pub fn is_flow_unit(self) -> bool {
        matches!(self, Unit::Megawatt | Unit::Ampere)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Megawatt => "MW",
            Unit::Ampere => "A",
            Unit::PercentImax => "%Imax",
            Unit::Degree => "°",
            Unit::Tap => "tap",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mw_ampere_round_trip() {
        let u = Kilovolts(400.0);
        let i = Megawatts(1000.0).to_amperes(u);
        assert!((i.value() - 1443.375).abs() < 1e-3);
        assert!((i.to_megawatts(u).value() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantity_arithmetic() {
        let total: Megawatts = [Megawatts(10.0), Megawatts(-4.0)].into_iter().sum();
        assert_eq!(total, Megawatts(6.0));
        assert_eq!((-total).abs(), Megawatts(6.0));
        assert_eq!(total * 2.0 / 4.0, Megawatts(3.0));
        assert_eq!(Amperes(5.0).max(Amperes(7.0)), Amperes(7.0));
    }

    #[test]
    fn test_unit_display_and_serde() {
        assert_eq!(Unit::Megawatt.to_string(), "MW");
        let parsed: Unit = serde_json::from_str("\"percent_imax\"").unwrap();
        assert_eq!(parsed, Unit::PercentImax);
        assert!(Unit::Ampere.is_flow_unit());
        assert!(!Unit::Tap.is_flow_unit());
    }
}
