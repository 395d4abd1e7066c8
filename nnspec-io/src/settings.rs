//! `key=value` settings files.
//!
//! One setting per line. Blank lines and lines starting with `#` are
//! skipped. Keys of the original configuration files are accepted as
//! aliases (`cutoff`, `error`, `meas_units`, `min_num_iterations`,
//! `max_num_iterations`). Unknown keys are logged and ignored.

use crate::error::{Error, Result};
use nnspec_core::UnfoldingSettings;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Reads and validates a settings file, starting from the defaults.
///
/// # Errors
/// I/O errors, [`Error::Parse`] for malformed lines or values, and a core
/// configuration error if the resulting settings are invalid.
pub fn read_settings<P: AsRef<Path>>(path: P) -> Result<UnfoldingSettings> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let settings = parse_settings(&text, path, UnfoldingSettings::default())?;
    settings.validate()?;
    Ok(settings)
}

/// Applies the settings in `text` on top of `base`. `origin` is only used
/// in error messages. The result is not validated.
///
/// # Errors
/// [`Error::Parse`] for malformed lines or values.
pub fn parse_settings(
    text: &str,
    origin: &Path,
    mut base: UnfoldingSettings,
) -> Result<UnfoldingSettings> {
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::parse(origin, line_no, format!("expected key=value, got '{line}'")))?;
        let key = key.trim();
        let value = value.trim();
        apply(&mut base, key, value).map_err(|message| Error::parse(origin, line_no, message))?;
    }
    Ok(base)
}

fn parsed<T>(key: &str, value: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| format!("invalid value '{value}' for {key}: {e}"))
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid value '{value}' for {key}: expected a boolean")),
    }
}

fn apply(settings: &mut UnfoldingSettings, key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        "max_iterations" | "cutoff" => settings.max_iterations = parsed(key, value)?,
        "error_tolerance" | "error" => settings.error_tolerance = parsed(key, value)?,
        "num_poisson_samples" => settings.num_poisson_samples = parsed(key, value)?,
        "seed" => settings.seed = Some(parsed(key, value)?),
        "norm" => settings.norm = parsed(key, value)?,
        "f_factor" => settings.f_factor = parsed(key, value)?,
        "measurement_units" | "meas_units" => settings.measurement_units = parsed(key, value)?,
        "min_iterations" | "min_num_iterations" => settings.min_iterations = parsed(key, value)?,
        "max_schedule_iterations" | "max_num_iterations" => {
            settings.max_schedule_iterations = parsed(key, value)?;
        }
        "iteration_increment" => settings.iteration_increment = parsed(key, value)?,
        "min_beta" => settings.min_beta = parsed(key, value)?,
        "max_beta" => settings.max_beta = parsed(key, value)?,
        "prior" => settings.prior = parsed(key, value)?,
        "parameter_of_interest" => settings.parameter_of_interest = parsed(key, value)?,
        "derivatives" => settings.derivatives = parse_bool(key, value)?,
        "trend_type" => settings.trend_type = parsed(key, value)?,
        _ => log::warn!("ignoring unknown setting '{key}'"),
    }
    Ok(())
}
