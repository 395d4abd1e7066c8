//! nnspec-io: File I/O for nnspec.
//!
//! This crate reads the plain-text inputs of an unfolding session (vectors,
//! response matrices, measurement files, `key=value` settings) and writes
//! results as CSV tables.
//!

mod error;
mod reader;
mod settings;
mod writer;

pub use error::{Error, Result};
pub use reader::{
    read_matrix, read_measurement_file, read_response, read_vector, MeasurementFile,
};
pub use settings::{parse_settings, read_settings};
pub use writer::{
    append_dose, append_poi_row, write_correction_factors, write_spectrum, write_sweep,
    write_trend, DOSE_HEADERS, UNCERTAINTY_SUFFIX,
};
