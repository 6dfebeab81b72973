//! # Submission Evaluation
//!
//! Scores a submission against observed outcomes. Every ground-truth row is paired
//! with the forecast month of the same subject whose Forecast Date lies closest to
//! the date the outcome was measured: the cognitive assessment date for diagnosis
//! and ADAS13, the scan date for ventricles. A truth value without its date is not
//! scored. Diagnosis is scored with MAUC and BCA, the continuous targets with MAE,
//! WES and CPA.

use crate::data::{DataError, columns};
use crate::metrics::{
    MetricError, calc_bca, calculate_cpa, calculate_wes, mauc, mean_absolute_error,
};
use crate::submission::{SubmissionError, SubmissionRow, SubmissionTable};
use crate::types::{ClassProbabilities, IntervalEstimate};
use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Number of diagnostic classes: CN, MCI, AD.
const NUM_CLASSES: usize = 3;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("Metric could not be computed: {0}")]
    Metric(#[from] MetricError),
    #[error("Ground truth lists subject {rid}, but the submission has no forecast for it.")]
    MissingForecast { rid: i64 },
    #[error("Row {row} has diagnosis '{value}'; expected CN, MCI or AD.")]
    UnknownDiagnosis { row: usize, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize the evaluation report: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// One row of observed outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthRecord {
    pub rid: i64,
    pub cognitive_assessment_date: Option<NaiveDate>,
    /// Class label: 0 = CN, 1 = MCI, 2 = AD.
    pub diagnosis: Option<usize>,
    pub adas13: Option<f64>,
    pub scan_date: Option<NaiveDate>,
    /// Already normalised by intracranial volume.
    pub ventricles: Option<f64>,
}

/// Maps a diagnosis to its class label, reading the last token as the current state
/// (`"MCI to AD"` is AD).
fn diagnosis_label(text: &str) -> Option<usize> {
    match text.split_whitespace().last()? {
        "CN" | "NL" => Some(0),
        "MCI" => Some(1),
        "AD" | "Dementia" => Some(2),
        _ => None,
    }
}

/// Reads a ground-truth CSV with columns `RID, CognitiveAssessmentDate, Diagnosis,
/// ADAS13, ScanDate, Ventricles`.
pub fn load_ground_truth(path: &str) -> Result<Vec<GroundTruthRecord>, EvaluationError> {
    let df = columns::read_csv(path)?;
    columns::require(
        &df,
        &[
            "RID",
            "CognitiveAssessmentDate",
            "Diagnosis",
            "ADAS13",
            "ScanDate",
            "Ventricles",
        ],
    )?;

    let rids = columns::required_i64(&df, "RID")?;
    let assessment_dates = columns::optional_dates(&df, "CognitiveAssessmentDate")?;
    let diagnoses = columns::optional_str(&df, "Diagnosis")?;
    let adas13 = columns::optional_f64(&df, "ADAS13")?;
    let scan_dates = columns::optional_dates(&df, "ScanDate")?;
    let ventricles = columns::optional_f64(&df, "Ventricles")?;

    let mut records = Vec::with_capacity(rids.len());
    for (idx, rid) in rids.into_iter().enumerate() {
        let diagnosis = match diagnoses[idx].as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(diagnosis_label(text).ok_or_else(|| {
                EvaluationError::UnknownDiagnosis {
                    row: idx + 1,
                    value: text.to_string(),
                }
            })?),
        };
        records.push(GroundTruthRecord {
            rid,
            cognitive_assessment_date: assessment_dates[idx],
            diagnosis,
            adas13: adas13[idx],
            scan_date: scan_dates[idx],
            ventricles: ventricles[idx],
        });
    }
    log::info!("Loaded {} ground-truth rows from '{}'", records.len(), path);
    Ok(records)
}

/// Diagnostic scores over the aligned truth items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationScores {
    pub mauc: f64,
    pub bca: f64,
    pub count: usize,
}

/// Interval-forecast scores for one continuous target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetScores {
    pub mae: f64,
    pub wes: f64,
    pub cpa: f64,
    pub count: usize,
}

/// A section is absent when no truth row carried that outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<ClassificationScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adas13: Option<TargetScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ventricles: Option<TargetScores>,
}

impl EvaluationReport {
    pub fn save(&self, path: &str) -> Result<(), EvaluationError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.diagnosis {
            Some(scores) => writeln!(
                f,
                "Diagnosis ({} items): MAUC = {:.4}, BCA = {:.4}",
                scores.count, scores.mauc, scores.bca
            )?,
            None => writeln!(f, "Diagnosis: no ground truth")?,
        }
        for (name, target) in [("ADAS13", &self.adas13), ("Ventricles", &self.ventricles)] {
            match target {
                Some(scores) => writeln!(
                    f,
                    "{name} ({} items): MAE = {:.5}, WES = {:.5}, CPA = {:.4}",
                    scores.count, scores.mae, scores.wes, scores.cpa
                )?,
                None => writeln!(f, "{name}: no ground truth")?,
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct ClassificationItems {
    labels: Vec<usize>,
    probabilities: Vec<[f64; NUM_CLASSES]>,
}

impl ClassificationItems {
    fn push(&mut self, label: usize, probabilities: ClassProbabilities) {
        self.labels.push(label);
        self.probabilities.push(probabilities.as_array());
    }

    fn scores(self) -> Result<Option<ClassificationScores>, MetricError> {
        if self.labels.is_empty() {
            return Ok(None);
        }
        let estimated: Array1<usize> = self
            .probabilities
            .iter()
            .map(|p| ClassProbabilities::new(p[0], p[1], p[2]).most_likely_class())
            .collect();
        let labels = Array1::from(self.labels);
        let probabilities = Array2::from(self.probabilities);

        Ok(Some(ClassificationScores {
            mauc: mauc(labels.view(), probabilities.view(), Some(NUM_CLASSES))?,
            bca: calc_bca(estimated.view(), labels.view(), NUM_CLASSES)?,
            count: labels.len(),
        }))
    }
}

#[derive(Default)]
struct IntervalItems {
    estimates: Vec<f64>,
    lowers: Vec<f64>,
    uppers: Vec<f64>,
    trues: Vec<f64>,
}

impl IntervalItems {
    fn push(&mut self, forecast: IntervalEstimate, observed: f64) {
        self.estimates.push(forecast.estimate);
        self.lowers.push(forecast.lower);
        self.uppers.push(forecast.upper);
        self.trues.push(observed);
    }

    fn scores(&self) -> Result<Option<TargetScores>, MetricError> {
        if self.trues.is_empty() {
            return Ok(None);
        }
        let estimates = ArrayView1::from(self.estimates.as_slice());
        let lowers = ArrayView1::from(self.lowers.as_slice());
        let uppers = ArrayView1::from(self.uppers.as_slice());
        let trues = ArrayView1::from(self.trues.as_slice());

        Ok(Some(TargetScores {
            mae: mean_absolute_error(estimates, trues)?,
            wes: calculate_wes(estimates, lowers, uppers, trues)?,
            cpa: calculate_cpa(estimates, lowers, uppers, trues)?,
            count: self.trues.len(),
        }))
    }
}

/// The forecast month closest to `date`; the earlier month wins a tie.
fn nearest_forecast<'a>(rows: &[&'a SubmissionRow], date: NaiveDate) -> Option<&'a SubmissionRow> {
    rows.iter()
        .min_by_key(|row| ((row.forecast_date - date).num_days().abs(), row.forecast_date))
        .copied()
}

/// Aligns `truth` with `submission` and computes every score.
pub fn evaluate_submission(
    submission: &SubmissionTable,
    truth: &[GroundTruthRecord],
) -> Result<EvaluationReport, EvaluationError> {
    let mut by_subject: HashMap<i64, Vec<&SubmissionRow>> = HashMap::new();
    for row in submission.rows() {
        by_subject.entry(row.rid).or_default().push(row);
    }

    let mut diagnosis = ClassificationItems::default();
    let mut adas13 = IntervalItems::default();
    let mut ventricles = IntervalItems::default();

    for record in truth {
        let missing = || EvaluationError::MissingForecast { rid: record.rid };
        let rows = by_subject.get(&record.rid).ok_or_else(missing)?;

        if let Some(date) = record.cognitive_assessment_date {
            let row = nearest_forecast(rows, date).ok_or_else(missing)?;
            if let Some(label) = record.diagnosis {
                diagnosis.push(label, row.probabilities);
            }
            if let Some(value) = record.adas13 {
                adas13.push(row.adas13, value);
            }
        }
        if let (Some(date), Some(value)) = (record.scan_date, record.ventricles) {
            let row = nearest_forecast(rows, date).ok_or_else(missing)?;
            ventricles.push(row.ventricles_icv, value);
        }
    }
    log::debug!(
        "Aligned {} diagnoses, {} ADAS13 and {} ventricle measurements",
        diagnosis.labels.len(),
        adas13.trues.len(),
        ventricles.trues.len()
    );

    Ok(EvaluationReport {
        diagnosis: diagnosis.scores()?,
        adas13: adas13.scores()?,
        ventricles: ventricles.scores()?,
    })
}
