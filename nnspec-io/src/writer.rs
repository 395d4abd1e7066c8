//! CSV writers for unfolding results.

use crate::error::Result;
use nnspec_algorithms::{Checkpoint, SweepResult};
use nnspec_core::{check_dimension, TrendType};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Column headers of the dose file.
pub const DOSE_HEADERS: [&str; 3] = [
    "Irradiation Conditions",
    "Dose Rate (mSv/hr)",
    "RMS Error (mSv/hr)",
];

/// Suffix of the uncertainty column that follows each spectrum column.
pub const UNCERTAINTY_SUFFIX: &str = "_ERROR";

fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().flexible(true).from_writer(inner)
}

fn row<T: ToString>(label: impl Into<String>, values: &[T]) -> Vec<String> {
    std::iter::once(label.into())
        .chain(values.iter().map(ToString::to_string))
        .collect()
}

/// Opens `path` for appending and reports whether it was empty.
fn open_append(path: &Path) -> Result<(File, bool)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let empty = file.metadata()?.len() == 0;
    Ok((file, empty))
}

/// Appends one dose row, writing the header first if the file is new or
/// empty.
///
/// # Errors
/// I/O or CSV errors.
pub fn append_dose<P: AsRef<Path>>(path: P, conditions: &str, dose: f64, rms: f64) -> Result<()> {
    let (file, empty) = open_append(path.as_ref())?;
    let mut writer = csv_writer(file);
    if empty {
        writer.write_record(DOSE_HEADERS)?;
    }
    writer.write_record([conditions.to_string(), dose.to_string(), rms.to_string()])?;
    writer.flush()?;
    Ok(())
}

/// Adds a spectrum and its uncertainty as two columns of a spectrum file.
///
/// A new file gets `Energy (MeV)`, `<conditions>` and
/// `<conditions>_ERROR` columns. An existing file keeps its columns and
/// gains the two new ones on every row.
///
/// # Errors
/// - Core dimension error if the vectors differ in length, or if an
///   existing file has a different number of bins.
/// - I/O or CSV errors.
pub fn write_spectrum<P: AsRef<Path>>(
    path: P,
    conditions: &str,
    energy_bins: &[f64],
    spectrum: &[f64],
    uncertainty: &[f64],
) -> Result<()> {
    let path = path.as_ref();
    check_dimension("spectrum", energy_bins.len(), spectrum.len())?;
    check_dimension("spectrum uncertainty", energy_bins.len(), uncertainty.len())?;
    let error_header = format!("{conditions}{UNCERTAINTY_SUFFIX}");

    let existing: Vec<csv::StringRecord> = match File::open(path) {
        Ok(file) => {
            if file.metadata()?.len() == 0 {
                Vec::new()
            } else {
                csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(file)
                    .records()
                    .collect::<std::result::Result<_, _>>()?
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let rows: Vec<Vec<String>> = if existing.is_empty() {
        std::iter::once(vec![
            "Energy (MeV)".to_string(),
            conditions.to_string(),
            error_header,
        ])
        .chain(
            energy_bins
                .iter()
                .zip(spectrum)
                .zip(uncertainty)
                .map(|((e, s), u)| vec![e.to_string(), s.to_string(), u.to_string()]),
        )
        .collect()
    } else {
        check_dimension("existing spectrum file rows", spectrum.len() + 1, existing.len())?;
        let new_columns = std::iter::once([conditions.to_string(), error_header]).chain(
            spectrum
                .iter()
                .zip(uncertainty)
                .map(|(s, u)| [s.to_string(), u.to_string()]),
        );
        existing
            .iter()
            .zip(new_columns)
            .map(|(record, extra)| record.iter().map(str::to_string).chain(extra).collect())
            .collect()
    };

    let mut writer = csv_writer(File::create(path)?);
    for r in &rows {
        writer.write_record(r)?;
    }
    writer.flush()?;
    Ok(())
}

/// Appends one POI trajectory row (`label, v1, v2, ...`). A new or empty
/// file first gets a `Number of iterations` header row.
///
/// # Errors
/// Core dimension error if the lengths differ; I/O or CSV errors.
pub fn append_poi_row<P: AsRef<Path>>(
    path: P,
    label: &str,
    iterations: &[usize],
    values: &[f64],
) -> Result<()> {
    check_dimension("POI values", iterations.len(), values.len())?;
    let (file, empty) = open_append(path.as_ref())?;
    let mut writer = csv_writer(file);
    if empty {
        writer.write_record(row("Number of iterations", iterations))?;
    }
    writer.write_record(row(label, values))?;
    writer.flush()?;
    Ok(())
}

/// Writes a beta sweep: a header row of checkpoints (first cell `0`), then
/// one row per beta.
///
/// # Errors
/// I/O or CSV errors.
pub fn write_sweep<P: AsRef<Path>>(path: P, sweep: &SweepResult) -> Result<()> {
    let mut writer = csv_writer(File::create(path.as_ref())?);
    writer.write_record(row("0", &sweep.checkpoints))?;
    for (beta, values) in sweep.betas.iter().zip(&sweep.values) {
        writer.write_record(row(beta.to_string(), values))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a trend table: detector indices, the measured row, then one row
/// per checkpoint labelled `N = <iterations>`.
///
/// # Errors
/// I/O or CSV errors.
pub fn write_trend<P: AsRef<Path>>(
    path: P,
    kind: TrendType,
    measurements: &[f64],
    trend: &[Checkpoint<Vec<f64>>],
) -> Result<()> {
    let mut writer = csv_writer(File::create(path.as_ref())?);
    let indices: Vec<usize> = (0..measurements.len()).collect();
    writer.write_record(row("Number of moderators", &indices))?;
    match kind {
        TrendType::Cps => writer.write_record(row("Measured data", measurements))?,
        TrendType::Ratio => writer.write_record(row("Measured data", &vec![1; measurements.len()]))?,
    }
    for checkpoint in trend {
        writer.write_record(row(format!("N = {}", checkpoint.scheduled), &checkpoint.value))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes per-checkpoint correction factors with an energy header row.
///
/// # Errors
/// I/O or CSV errors.
pub fn write_correction_factors<P: AsRef<Path>>(
    path: P,
    energy_bins: &[f64],
    factors: &[Checkpoint<Vec<f64>>],
) -> Result<()> {
    let mut writer = csv_writer(File::create(path.as_ref())?);
    writer.write_record(row("Energy (MeV)", energy_bins))?;
    for checkpoint in factors {
        writer.write_record(row(format!("N = {}", checkpoint.scheduled), &checkpoint.value))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_append_dose_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dose.csv");
        append_dose(&path, "run A", 0.5, 0.01).unwrap();
        append_dose(&path, "run B", 1.25, 0.02).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Irradiation Conditions,Dose Rate (mSv/hr),RMS Error (mSv/hr)",
                "run A,0.5,0.01",
                "run B,1.25,0.02",
            ]
        );
    }

    #[test]
    fn test_spectrum_columns_accumulate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spectra.csv");
        let energies = [1e-8, 1e-3, 10.0];
        write_spectrum(&path, "A", &energies, &[1.0, 2.0, 3.0], &[0.1, 0.2, 0.3]).unwrap();
        write_spectrum(&path, "B", &energies, &[4.0, 5.0, 6.0], &[0.4, 0.5, 0.6]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Energy (MeV),A,A_ERROR,B,B_ERROR");
        assert_eq!(lines[3], "10,3,0.3,6,0.6");

        let err = write_spectrum(&path, "C", &[1.0], &[1.0], &[0.0]).unwrap_err();
        assert!(matches!(err, crate::Error::Core(_)));
    }

    #[test]
    fn test_poi_rows_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poi.csv");
        append_poi_row(&path, "A", &[100, 200], &[1.5, 2.5]).unwrap();
        append_poi_row(&path, "B", &[100, 200], &[3.0, 4.0]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Number of iterations,100,200\nA,1.5,2.5\nB,3,4\n");
    }

    #[test]
    fn test_write_sweep() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.csv");
        let sweep = SweepResult {
            betas: vec![0.001, 0.002],
            checkpoints: vec![10, 20],
            values: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        };
        write_sweep(&path, &sweep).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0,10,20\n0.001,1,2\n0.002,3,4\n");
    }

    #[test]
    fn test_write_trend_and_factors() {
        let dir = TempDir::new().unwrap();
        let trend_path = dir.path().join("trend.csv");
        let trend = vec![Checkpoint {
            scheduled: 5,
            executed: 5,
            value: vec![0.5, 1.5],
        }];
        write_trend(&trend_path, TrendType::Ratio, &[10.0, 20.0], &trend).unwrap();
        let text = fs::read_to_string(&trend_path).unwrap();
        assert_eq!(
            text,
            "Number of moderators,0,1\nMeasured data,1,1\nN = 5,0.5,1.5\n"
        );

        let factors_path = dir.path().join("factors.csv");
        write_correction_factors(&factors_path, &[0.1, 1.0], &trend).unwrap();
        let text = fs::read_to_string(&factors_path).unwrap();
        assert_eq!(text, "Energy (MeV),0.1,1\nN = 5,0.5,1.5\n");
    }
}
