//! Black-Scholes Model
//!
//! Provides:
//! - European option pricing with Greeks
//! - Implied volatility solver (Newton-Raphson with bisection fallback)
//!
//! Pure functions, no state: safe to call from any number of workers.

use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

use crate::core::{Greeks, OptionType, PriceAndGreeks, ScannerError, ScannerResult};

/// Calendar days per year for theta
const DAYS_PER_YEAR: f64 = 365.0;

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes d1 parameter
pub fn d1(spot: f64, strike: f64, rate: f64, vol: f64, time: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * vol * vol) * time) / (vol * time.sqrt())
}

fn check_inputs(spot: f64, strike: f64, time: f64, rate: f64, vol: f64) -> ScannerResult<()> {
    if !(spot.is_finite() && spot > 0.0) {
        return Err(ScannerError::invalid_input(format!("spot must be positive, got {}", spot)));
    }
    if !(strike.is_finite() && strike > 0.0) {
        return Err(ScannerError::invalid_input(format!(
            "strike must be positive, got {}",
            strike
        )));
    }
    if !(time.is_finite() && time >= 0.0) {
        return Err(ScannerError::invalid_input(format!(
            "time to expiry must be non-negative, got {}",
            time
        )));
    }
    if !(vol.is_finite() && vol >= 0.0) {
        return Err(ScannerError::invalid_input(format!(
            "volatility must be non-negative, got {}",
            vol
        )));
    }
    if !rate.is_finite() {
        return Err(ScannerError::invalid_input("risk-free rate must be finite"));
    }
    Ok(())
}

/// European option price and Greeks.
///
/// At expiry or with zero volatility the model is singular; the result is
/// then exactly the intrinsic value with every Greek zero. Theta is per
/// calendar day, vega per vol point and rho per percentage point of rate.
pub fn price_and_greeks(
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    vol: f64,
    option_type: OptionType,
) -> ScannerResult<PriceAndGreeks> {
    check_inputs(spot, strike, time, rate, vol)?;

    if time <= 0.0 || vol <= 0.0 {
        return Ok(PriceAndGreeks::intrinsic_only(option_type.intrinsic(spot, strike)));
    }

    let sqrt_t = time.sqrt();
    let d1 = d1(spot, strike, rate, vol, time);
    let d2 = d1 - vol * sqrt_t;
    let df = (-rate * time).exp();
    let pdf_d1 = norm_pdf(d1);

    // Same for call and put
    let gamma = pdf_d1 / (spot * vol * sqrt_t);
    let vega = spot * pdf_d1 * sqrt_t / 100.0;
    let decay = -spot * pdf_d1 * vol / (2.0 * sqrt_t);

    let (price, delta, theta, rho) = match option_type {
        OptionType::Call => {
            let nd1 = norm_cdf(d1);
            let nd2 = norm_cdf(d2);
            (
                spot * nd1 - strike * df * nd2,
                nd1,
                decay - rate * strike * df * nd2,
                strike * time * df * nd2 / 100.0,
            )
        }
        OptionType::Put => {
            let n_neg_d1 = norm_cdf(-d1);
            let n_neg_d2 = norm_cdf(-d2);
            (
                strike * df * n_neg_d2 - spot * n_neg_d1,
                -n_neg_d1,
                decay + rate * strike * df * n_neg_d2,
                -strike * time * df * n_neg_d2 / 100.0,
            )
        }
    };

    Ok(PriceAndGreeks::new(
        price,
        Greeks::new(delta, gamma, theta / DAYS_PER_YEAR, vega, rho),
    ))
}

/// Price only
pub fn price(
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    vol: f64,
    option_type: OptionType,
) -> ScannerResult<f64> {
    price_and_greeks(spot, strike, time, rate, vol, option_type).map(|p| p.price)
}

/// Implied volatility solver using Newton-Raphson with bisection fallback
pub fn implied_volatility(
    market_price: f64,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    option_type: OptionType,
) -> ScannerResult<f64> {
    if !(market_price.is_finite() && market_price > 0.0) {
        return Err(ScannerError::invalid_input("non-positive option price"));
    }
    if time <= 0.0 {
        return Err(ScannerError::invalid_input("non-positive time to expiry"));
    }
    check_inputs(spot, strike, time, rate, 0.0)?;

    // Below discounted intrinsic there is no solution
    let df = (-rate * time).exp();
    let lower = match option_type {
        OptionType::Call => (spot - strike * df).max(0.0),
        OptionType::Put => (strike * df - spot).max(0.0),
    };
    if market_price < lower * 0.99 {
        return Err(ScannerError::invalid_input("price below intrinsic value"));
    }

    // Brenner-Subrahmanyam initial guess
    let mut vol = (market_price / (0.4 * spot * time.sqrt())).clamp(0.01, 3.0);

    let tol = 1e-8;
    for _ in 0..100 {
        let diff = price(spot, strike, time, rate, vol, option_type)? - market_price;
        if diff.abs() < tol {
            return Ok(vol);
        }

        let vega = spot * norm_pdf(d1(spot, strike, rate, vol, time)) * time.sqrt();
        if vega.abs() < 1e-12 {
            break;
        }

        let next = vol - diff / vega;
        if next <= 0.0 || next > 5.0 {
            break;
        }
        vol = next;
    }

    bisection_iv(market_price, spot, strike, time, rate, option_type)
}

/// Bisection method for IV (slower but more robust)
fn bisection_iv(
    market_price: f64,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    option_type: OptionType,
) -> ScannerResult<f64> {
    let mut low = 0.001;
    let mut high = 5.0;
    let tol = 1e-8;

    for _ in 0..200 {
        let mid = (low + high) / 2.0;
        let diff = price(spot, strike, time, rate, mid, option_type)? - market_price;

        if diff.abs() < tol || (high - low) < tol {
            return Ok(mid);
        }
        if diff > 0.0 {
            high = mid;
        } else {
            low = mid;
        }
    }

    Err(ScannerError::invalid_input("IV solver did not converge"))
}
