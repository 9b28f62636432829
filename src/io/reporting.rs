// src/io/reporting.rs

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::model::classifier::Classifiers;
use crate::model::template::sentinel;
use crate::strategy::materialize::EventRecord;
use crate::strategy::traits::YearDiagnostics;

pub const EVENTS_FILE: &str = "events.csv";
pub const EXTRAS_FILE: &str = "extras.csv";
pub const ERROR_FILE: &str = "error.log";
pub const LOG_FILE: &str = "hat.log";

const EVENT_COLUMNS: [&str; 27] = [
    "step",
    "dist_type_name",
    "product_created",
    "dist_interval_bias",
    "sw_start",
    "sw_end",
    "hw_start",
    "hw_end",
    "min_since_last_dist",
    "max_since_last_dist",
    "last_dist_id",
    "sort_type",
    "measurement_type",
    "efficiency",
    "skew",
    "wood_density",
    "bark_frac",
    "irw_vol",
    "fw_vol",
    "irw_avail",
    "fw_avail",
    "irw_norm",
    "irw_need",
    "irw_frac",
    "fw_colat",
    "fw_norm",
    "fw_need",
];

fn event_cells(record: &EventRecord) -> Vec<String> {
    let c = &record.candidate;
    let t = &c.template;
    let mut cells: Vec<String> = Vec::with_capacity(EVENT_COLUMNS.len() + 1);
    cells.push(record.step.to_string());
    cells.push(t.disturbance_id.to_string());
    cells.push(t.product_created.as_str().to_string());
    cells.push(t.dist_interval_bias.to_string());
    for v in [t.sw_start, t.sw_end, t.hw_start, t.hw_end] {
        cells.push(v.to_string());
    }
    for v in [t.min_since_last_dist, t.max_since_last_dist, t.last_dist_id] {
        cells.push(sentinel(v).to_string());
    }
    cells.push(t.sort_type.as_str().to_string());
    cells.push(record.measurement_type.as_str().to_string());
    cells.push(t.efficiency.to_string());
    cells.push(c.skew.map(|s| s.to_string()).unwrap_or_default());
    for v in [
        c.coefs.wood_density,
        c.coefs.bark_frac,
        c.irw_vol,
        c.fw_vol,
        c.irw_avail,
        c.fw_avail,
        c.irw_norm,
        c.irw_need,
        c.irw_frac,
        c.fw_colat,
        c.fw_norm,
        c.fw_need,
    ] {
        cells.push(v.to_string());
    }
    cells
}

/// Writes the cumulative events log with one classifier column per classifier.
pub fn write_events_log<'a>(
    path: &Path,
    classifiers: &Classifiers,
    records: impl IntoIterator<Item = &'a EventRecord>,
) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = vec!["year"];
    header.extend(classifiers.names().iter().map(String::as_str));
    header.extend(EVENT_COLUMNS);
    header.push("amount");
    wtr.write_record(&header)?;

    let mut count = 0;
    for record in records {
        let mut row = vec![record.year.to_string()];
        row.extend(record.candidate.template.pattern.cells());
        row.extend(event_cells(record));
        row.push(record.candidate.amount.to_string());
        wtr.write_record(&row)?;
        count += 1;
    }
    wtr.flush()?;

    info!(rows = count, path = %path.display(), "events log exported");
    Ok(count)
}

/// Writes one row of scalar diagnostics per allocated year.
pub fn write_diagnostics(path: &Path, data: &[YearDiagnostics]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in data {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    info!(rows = data.len(), path = %path.display(), "diagnostics exported");
    Ok(())
}

/// Both output tables of a run, into a directory created on demand.
pub fn write_run_outputs<'a>(
    dir: &Path,
    classifiers: &Classifiers,
    records: impl IntoIterator<Item = &'a EventRecord>,
    diagnostics: &[YearDiagnostics],
) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_events_log(&dir.join(EVENTS_FILE), classifiers, records)?;
    write_diagnostics(&dir.join(EXTRAS_FILE), diagnostics)?;
    Ok(())
}

/// Creates the run log, truncating the one of a previous run.
pub fn create_run_log(dir: &Path) -> Result<fs::File> {
    fs::create_dir_all(dir)?;
    Ok(fs::File::create(dir.join(LOG_FILE))?)
}

pub fn write_error_log(dir: &Path, label: &str, message: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(ERROR_FILE), format!("{label}\n{message}\n"))?;
    Ok(())
}
