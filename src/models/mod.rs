//! Pricing models
//!
//! - Black-Scholes: closed-form European pricing, Greeks and IV solver

pub mod black_scholes;

pub use black_scholes::{implied_volatility, norm_cdf, norm_pdf, price, price_and_greeks};
