//! nnspec-core: Core types for neutron spectrum unfolding.
//!
//! This crate provides the detector response model, spectrum and measurement
//! vectors, the error taxonomy, and the settings shared by the solvers.
//!

pub mod config;
pub mod error;
pub mod measurement;
pub mod response;
pub mod spectrum;

pub use config::{PoiKind, PriorKind, TrendType, UnfoldingSettings};
pub use error::{check_dimension, Error, Result};
pub use measurement::{charge_to_cps, cps_readings, BeamDelivery, ChargeCalibration, MeasurementUnits};
pub use response::{normalize, NormalizedResponse, ResponseMatrix};
pub use spectrum::{Measurements, Spectrum};
