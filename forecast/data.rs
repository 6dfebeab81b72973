//! # Visit Table Loading and Validation
//!
//! The single entry point for TADPOLE spreadsheets (`TADPOLE_LB1_LB2.csv`,
//! `TADPOLE_D1_D2.csv`). It reads the columns the forecasters need, validates
//! them, and derives the three quantities the raw table does not carry:
//!
//! - `CLIN_STAT`: the last whitespace-delimited token of `DX`.
//! - `Ventricles_ICV`: `Ventricles / ICV_bl`.
//! - `AGE_AT_EXAM`: baseline `AGE` plus the years since the subject's first exam.
//!
//! Every column is read as text and cast afterwards. The challenge tables mix
//! numbers with blanks and stray strings in the same column, so schema inference
//! on a prefix of the file is not reliable. Optional numeric columns treat anything
//! that is not a finite number as missing; required columns reject it.

use crate::types::{ClinicalStatus, VisitRecord, VisitTable};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

/// Days per year used when converting exam-date offsets to ages.
const DAYS_PER_YEAR: f64 = 365.25;

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the required column '{0}'.")]
    MissingValuesFound(String),
    #[error("Row {row} of column '{column_name}' holds '{value}', which is not a YYYY-MM-DD date.")]
    InvalidDate {
        column_name: String,
        row: usize,
        value: String,
    },
    #[error("Subject {0} has no 'AGE' value on any visit, so its age at exam is undefined.")]
    NoBaselineAge(i64),
    #[error("The input file contains no data rows.")]
    EmptyTable,
}

/// Loads a visit table and flags the subjects whose `cohort_column` equals 1.
pub fn load_visit_table(path: &str, cohort_column: &str) -> Result<VisitTable, DataError> {
    println!("Loading visit data from '{path}'");
    let df = columns::read_csv(path)?;
    if df.height() == 0 {
        return Err(DataError::EmptyTable);
    }

    let mut required = vec!["RID", "EXAMDATE", "AGE", "DX", "ADAS13", "Ventricles", "ICV_bl"];
    required.push(cohort_column);
    columns::require(&df, &required)?;

    let rids = columns::required_i64(&df, "RID")?;
    let exam_dates = columns::required_dates(&df, "EXAMDATE")?;
    let ages = columns::optional_f64(&df, "AGE")?;
    let diagnoses = columns::optional_str(&df, "DX")?;
    let adas13 = columns::optional_f64(&df, "ADAS13")?;
    let ventricles = columns::optional_f64(&df, "Ventricles")?;
    let icv = columns::optional_f64(&df, "ICV_bl")?;
    let cohort = columns::optional_f64(&df, cohort_column)?;

    // Baseline age and first exam per subject anchor the age-at-exam clock.
    let mut first_exam: HashMap<i64, NaiveDate> = HashMap::new();
    let mut baseline_age: HashMap<i64, f64> = HashMap::new();
    for (idx, &rid) in rids.iter().enumerate() {
        first_exam
            .entry(rid)
            .and_modify(|date| *date = (*date).min(exam_dates[idx]))
            .or_insert(exam_dates[idx]);
        if let Some(age) = ages[idx] {
            baseline_age
                .entry(rid)
                .and_modify(|base| *base = base.min(age))
                .or_insert(age);
        }
    }

    let mut records = Vec::with_capacity(rids.len());
    for (idx, &rid) in rids.iter().enumerate() {
        let base = *baseline_age
            .get(&rid)
            .ok_or(DataError::NoBaselineAge(rid))?;
        let elapsed_days = (exam_dates[idx] - first_exam[&rid]).num_days();

        let ventricles_icv = match (ventricles[idx], icv[idx]) {
            (Some(vent), Some(icv)) => Some(vent / icv).filter(|ratio| ratio.is_finite()),
            _ => None,
        };

        records.push(VisitRecord {
            rid,
            exam_date: exam_dates[idx],
            age_at_exam: elapsed_days as f64 / DAYS_PER_YEAR + base,
            clinical_status: diagnoses[idx]
                .as_deref()
                .and_then(ClinicalStatus::from_diagnosis),
            adas13: adas13[idx],
            ventricles_icv,
            in_cohort: cohort[idx] == Some(1.0),
        });
    }

    let table = VisitTable::from_records(records);
    log::info!(
        "Loaded {} visits of {} subjects ({} in cohort '{}')",
        table.num_visits(),
        table.num_subjects(),
        table.cohort_subjects().len(),
        cohort_column
    );
    Ok(table)
}

/// Column extraction shared with the ground-truth loader.
pub(crate) mod columns {
    use super::*;
    use std::collections::HashSet;
    use std::fs::File;
    use std::path::Path;

    pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

    /// Reads a comma-separated file with every column typed as text.
    pub(crate) fn read_csv(path: &str) -> Result<DataFrame, DataError> {
        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_infer_schema_length(Some(0)),
            )
            .finish()?;
        Ok(df)
    }

    pub(crate) fn require(df: &DataFrame, names: &[&str]) -> Result<(), DataError> {
        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str().to_string())
            .collect();
        for name in names {
            if !present.contains(*name) {
                return Err(DataError::ColumnNotFound(name.to_string()));
            }
        }
        Ok(())
    }

    pub(crate) fn required_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>, DataError> {
        let column = df.column(name)?;
        if column.null_count() > 0 {
            return Err(DataError::MissingValuesFound(name.to_string()));
        }
        let wrong_type = || DataError::ColumnWrongType {
            column_name: name.to_string(),
            expected_type: "i64 (integer)",
            found_type: format!("{:?}", column.dtype()),
        };
        let casted = column.cast(&DataType::Int64).map_err(|_| wrong_type())?;
        if casted.null_count() > 0 {
            return Err(wrong_type());
        }
        Ok(casted.i64()?.into_no_null_iter().collect())
    }

    pub(crate) fn optional_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
        let casted = df.column(name)?.cast(&DataType::Float64)?;
        Ok(casted
            .f64()?
            .into_iter()
            .map(|value| value.filter(|v| v.is_finite()))
            .collect())
    }

    pub(crate) fn optional_str(
        df: &DataFrame,
        name: &str,
    ) -> Result<Vec<Option<String>>, DataError> {
        let casted = df.column(name)?.cast(&DataType::String)?;
        Ok(casted
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    /// Blank cells are missing; any other text must be a `YYYY-MM-DD` date.
    pub(crate) fn optional_dates(
        df: &DataFrame,
        name: &str,
    ) -> Result<Vec<Option<NaiveDate>>, DataError> {
        optional_str(df, name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| match value.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map(Some)
                    .map_err(|_| DataError::InvalidDate {
                        column_name: name.to_string(),
                        row: row + 1,
                        value: text.to_string(),
                    }),
            })
            .collect()
    }

    pub(crate) fn required_dates(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>, DataError> {
        optional_dates(df, name)?
            .into_iter()
            .map(|date| date.ok_or_else(|| DataError::MissingValuesFound(name.to_string())))
            .collect()
    }
}
