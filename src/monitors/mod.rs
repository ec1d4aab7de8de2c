//! Probing and health evaluation
//!
//! - [`prober`]: performs the network check and classifies its outcome
//! - [`hysteresis`]: turns outcomes into health state and alert decisions

pub mod hysteresis;
pub mod prober;

pub use hysteresis::{AlertDecision, Transition, step};
pub use prober::{HttpProber, Probe};
