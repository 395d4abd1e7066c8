//! Readers for unfolding inputs.
//!
//! Vectors (energy bins, initial spectra, ICRP factors, reference spectra)
//! are one value per line; only the first comma-separated field of a line
//! is used. Matrices are one row per line. Measurement files carry a short
//! free-text header followed by comma-separated readings.

use crate::error::{Error, Result};
use nnspec_core::{
    charge_to_cps, cps_readings, BeamDelivery, ChargeCalibration, Measurements,
    MeasurementUnits, ResponseMatrix, UnfoldingSettings,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

fn csv_reader(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn record_line(record: &csv::StringRecord) -> usize {
    record
        .position()
        .and_then(|p| usize::try_from(p.line()).ok())
        .unwrap_or(0)
}

fn missing(path: &Path, what: &str) -> Error {
    Error::InvalidFormat(format!("{}: missing {what} line", path.display()))
}

fn parse_value(path: &Path, line: usize, field: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|e| Error::parse(path, line, format!("'{field}' is not a number: {e}")))
}

/// Reads a 1-D vector: the first field of every non-empty line.
///
/// # Errors
/// I/O, CSV, or parse errors.
pub fn read_vector<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let mut reader = csv_reader(path)?;
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(field) = record.get(0).filter(|f| !f.is_empty()) {
            values.push(parse_value(path, record_line(&record), field)?);
        }
    }
    log::debug!("read {} value(s) from {}", values.len(), path.display());
    Ok(values)
}

/// Reads a 2-D matrix, one row per line. Empty fields (trailing commas) are
/// ignored.
///
/// # Errors
/// I/O, CSV, or parse errors.
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let mut reader = csv_reader(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record);
        let row = record
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| parse_value(path, line, f))
            .collect::<Result<Vec<_>>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Reads a response matrix (measurements x bins).
///
/// # Errors
/// Read errors, or a core error for a jagged or invalid matrix.
pub fn read_response<P: AsRef<Path>>(path: P) -> Result<ResponseMatrix> {
    let rows = read_matrix(path)?;
    Ok(ResponseMatrix::from_rows(rows)?)
}

/// Contents of a measurement file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementFile {
    /// Free-text irradiation conditions (first line).
    pub conditions: String,
    /// Readings as listed in the file (most moderated first).
    pub readings: Vec<f64>,
    /// Units of `readings`.
    pub units: MeasurementUnits,
    /// Delivered beam, for charge files.
    pub delivery: Option<BeamDelivery>,
    /// Acquisition time in seconds, for charge files.
    pub duration_s: Option<f64>,
}

impl MeasurementFile {
    /// Converts the readings to count rates in response-matrix order.
    ///
    /// Charge readings use `norm` and `f_factor` from `settings` and are
    /// scaled by the beam delivery recorded in the file.
    ///
    /// # Errors
    /// A core configuration error for invalid calibration or readings.
    pub fn to_measurements(&self, settings: &UnfoldingSettings) -> Result<Measurements> {
        let measurements = match (self.units, self.duration_s) {
            (MeasurementUnits::Nc, Some(duration_s)) => charge_to_cps(
                &self.readings,
                &ChargeCalibration {
                    norm: settings.norm,
                    f_factor_fa_per_cps: settings.f_factor,
                    duration_s,
                    delivery: self.delivery,
                },
            )?,
            (MeasurementUnits::Nc, None) => {
                return Err(Error::InvalidFormat(
                    "charge readings require an acquisition time".into(),
                ))
            }
            (MeasurementUnits::Cps, _) => cps_readings(&self.readings)?,
        };
        Ok(measurements)
    }
}

/// Reads a measurement file.
///
/// Charge (`nc`) files:
/// ```text
/// <irradiation conditions>
/// <delivered dose, MU>
/// <dose rate, MU/min>
/// <acquisition time, s>
/// <reading>,<reading>,...
/// ```
/// Count-rate (`cps`) files have only the conditions line before the
/// readings. Readings may span several lines.
///
/// # Errors
/// I/O errors, [`Error::InvalidFormat`] for a truncated header, or
/// [`Error::Parse`] for a non-numeric value.
pub fn read_measurement_file<P: AsRef<Path>>(
    path: P,
    units: MeasurementUnits,
) -> Result<MeasurementFile> {
    let path = path.as_ref();
    let mut input = BufReader::new(File::open(path)?);
    let mut conditions = String::new();
    if input.read_line(&mut conditions)? == 0 {
        return Err(missing(path, "irradiation conditions"));
    }
    // Free text: may itself contain commas, so it is not split.
    let conditions = conditions.trim().to_string();

    // Line numbers below are relative to the rest of the file.
    let mut records = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
        .into_records();
    let mut header = |what: &str| -> Result<f64> {
        let record = records.next().ok_or_else(|| missing(path, what))??;
        let line = record_line(&record) + 1;
        let field = record
            .get(0)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| missing(path, what))?;
        parse_value(path, line, field)
    };

    let (delivery, duration_s) = match units {
        MeasurementUnits::Nc => {
            let dose_mu = header("delivered dose")?;
            let doserate_mu = header("dose rate")?;
            let duration_s = header("acquisition time")?;
            (
                Some(BeamDelivery {
                    dose_mu,
                    doserate_mu,
                }),
                Some(duration_s),
            )
        }
        MeasurementUnits::Cps => (None, None),
    };

    let mut readings = Vec::new();
    for record in records {
        let record = record?;
        let line = record_line(&record) + 1;
        for field in record.iter().filter(|f| !f.is_empty()) {
            readings.push(parse_value(path, line, field)?);
        }
    }
    if readings.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "{}: no readings",
            path.display()
        )));
    }

    log::debug!(
        "read {} {} reading(s) for '{conditions}' from {}",
        readings.len(),
        units,
        path.display()
    );
    Ok(MeasurementFile {
        conditions,
        readings,
        units,
        delivery,
        duration_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_vector_uses_first_field() {
        let file = file_with("1.5e-9,\n2.0,ignored\n\n3\n");
        assert_eq!(read_vector(file.path()).unwrap(), vec![1.5e-9, 2.0, 3.0]);
    }

    #[test]
    fn test_read_vector_parse_error_has_line() {
        let file = file_with("1.0\nabc\n");
        match read_vector(file.path()).unwrap_err() {
            Error::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_matrix_ignores_trailing_commas() {
        let file = file_with("1,2,3,\n4, 5 ,6\n");
        assert_eq!(
            read_matrix(file.path()).unwrap(),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
    }

    #[test]
    fn test_read_response_rejects_jagged() {
        let file = file_with("1,2\n3\n");
        assert!(matches!(
            read_response(file.path()),
            Err(Error::Core(nnspec_core::Error::Dimension { .. }))
        ));
    }

    #[test]
    fn test_read_charge_file() {
        let file = file_with("Linac 6 MV, 10x10 field\r\n100\r\n600\r\n60\r\n1.0,2.0,3.0,\r\n4.0\r\n");
        let m = read_measurement_file(file.path(), MeasurementUnits::Nc).unwrap();
        assert_eq!(m.conditions, "Linac 6 MV, 10x10 field");
        assert_eq!(m.readings, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.duration_s, Some(60.0));
        let delivery = m.delivery.unwrap();
        assert_relative_eq!(delivery.dose_mu, 100.0);
        assert_relative_eq!(delivery.doserate_mu, 600.0);

        let settings = UnfoldingSettings::default();
        let cps = m.to_measurements(&settings).unwrap();
        // 4 nC * 1 / (8e-6 nA/cps) / 60 s * (100 / 600)
        assert_relative_eq!(cps[0], 4.0 / 8e-6 / 60.0 / 6.0, max_relative = 1e-12);
        assert_eq!(cps.len(), 4);
    }

    #[test]
    fn test_read_cps_file() {
        let file = file_with("Source check\n10,20,30\n");
        let m = read_measurement_file(file.path(), MeasurementUnits::Cps).unwrap();
        assert!(m.delivery.is_none());
        let cps = m.to_measurements(&UnfoldingSettings::default()).unwrap();
        assert_eq!(&cps[..], &[30.0, 20.0, 10.0]);
    }

    #[test]
    fn test_measurement_parse_error_has_file_line() {
        let file = file_with("A, B and C\n1.0,2.0\n3.0,n/a\n");
        match read_measurement_file(file.path(), MeasurementUnits::Cps).unwrap_err() {
            Error::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_header() {
        let file = file_with("conditions\n100\n");
        assert!(matches!(
            read_measurement_file(file.path(), MeasurementUnits::Nc),
            Err(Error::InvalidFormat(_))
        ));
    }
}
