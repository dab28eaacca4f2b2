//! Core data types for the options scanner
//!
//! Defines fundamental types:
//! - OptionType and expiration timing
//! - OptionQuote / SymbolChain: normalized upstream data
//! - Contract: a quote annotated with model output
//! - Greeks
//! - Clock: injectable time source

pub mod clock;
pub mod contract;
pub mod error;
pub mod greeks;
pub mod option;
pub mod quote;

pub use clock::*;
pub use contract::*;
pub use error::*;
pub use greeks::*;
pub use option::*;
pub use quote::*;
