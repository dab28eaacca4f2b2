//! Option Greeks
//!
//! First order sensitivities reported alongside each scanned contract.

use serde::{Deserialize, Serialize};

/// Option Greeks (sensitivities)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta: dV/dS (sensitivity to spot)
    pub delta: f64,
    /// Gamma: d²V/dS² (sensitivity of delta to spot)
    pub gamma: f64,
    /// Theta: dV/dt, per calendar day
    pub theta: f64,
    /// Vega: dV/dσ, per 1 vol point
    pub vega: f64,
    /// Rho: dV/dr, per 1 percentage point of rate
    pub rho: f64,
}

impl Greeks {
    pub fn new(delta: f64, gamma: f64, theta: f64, vega: f64, rho: f64) -> Self {
        Self {
            delta,
            gamma,
            theta,
            vega,
            rho,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

/// Model price together with its Greeks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceAndGreeks {
    pub price: f64,
    pub greeks: Greeks,
}

impl PriceAndGreeks {
    pub fn new(price: f64, greeks: Greeks) -> Self {
        Self { price, greeks }
    }

    /// Price with every sensitivity zeroed
    pub fn intrinsic_only(price: f64) -> Self {
        Self {
            price,
            greeks: Greeks::zero(),
        }
    }
}
