//! # Prediction Strategies
//!
//! A strategy receives one subject's history and that subject's empty forecast
//! template, and fills every row in place. Two closed-form rules are provided:
//!
//! - [`NaiveStrategy`] repeats the most recent observation of each target.
//! - [`LinearTrendStrategy`] extrapolates a least-squares line of each continuous
//!   target against age at exam.
//!
//! Both forecast the clinical status identically, from a lookup table keyed by the
//! most recent diagnosis.

mod linear_trend;
mod naive;

pub use linear_trend::LinearTrendStrategy;
pub use naive::NaiveStrategy;

use crate::config::{
    FallbackConfig, FallbackEstimate, ForecastConfig, IntervalConfig, StatusPriors, StrategyKind,
};
use crate::template::{ForecastTemplate, TemplateError};
use crate::types::{
    ClassProbabilities, ClinicalStatus, ContinuousTarget, HistoryField, IntervalEstimate,
    SubjectHistory,
};
use thiserror::Error;

/// Faults that abort the forecast of a single subject.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Subject {rid} has no observed {field} in its history.")]
    MissingHistory { rid: i64, field: HistoryField },
    #[error(
        "Subject {rid} has {found} usable (age, {field}) pairs, but a trend needs at least 2."
    )]
    InsufficientHistory {
        rid: i64,
        field: HistoryField,
        found: usize,
    },
    #[error("The {field} history of subject {rid} does not determine a trend: {reason}")]
    DegenerateFit {
        rid: i64,
        field: HistoryField,
        reason: String,
    },
    #[error("Subject {0} has no visits in the input table.")]
    EmptyHistory(i64),
    #[error("Template row for subject {row_rid} was handed to the history of subject {rid}.")]
    SubjectMismatch { rid: i64, row_rid: i64 },
    #[error("Invalid forecast template: {0}")]
    Template(#[from] TemplateError),
}

impl ForecastError {
    /// The subject this error concerns, if it concerns one.
    pub fn rid(&self) -> Option<i64> {
        match self {
            ForecastError::MissingHistory { rid, .. }
            | ForecastError::InsufficientHistory { rid, .. }
            | ForecastError::DegenerateFit { rid, .. }
            | ForecastError::SubjectMismatch { rid, .. } => Some(*rid),
            ForecastError::EmptyHistory(rid) => Some(*rid),
            ForecastError::Template(_) => None,
        }
    }
}

/// Whether a strategy can forecast a subject who never had a field measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Missing history is a `MissingHistory` error.
    Required,
    /// Missing history is replaced by a configured fallback.
    Optional,
}

/// Per-field requirements a strategy declares up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRequirements {
    pub clinical_status: Requirement,
    pub adas13: Requirement,
    pub ventricles_icv: Requirement,
}

impl FieldRequirements {
    pub fn from_fallbacks(fallbacks: &FallbackConfig) -> Self {
        let requirement = |field| {
            if fallbacks.covers(field) {
                Requirement::Optional
            } else {
                Requirement::Required
            }
        };
        Self {
            clinical_status: requirement(HistoryField::ClinicalStatus),
            adas13: requirement(HistoryField::Adas13),
            ventricles_icv: requirement(HistoryField::VentriclesIcv),
        }
    }

    pub fn get(&self, field: HistoryField) -> Requirement {
        match field {
            HistoryField::ClinicalStatus => self.clinical_status,
            HistoryField::Adas13 => self.adas13,
            HistoryField::VentriclesIcv => self.ventricles_icv,
        }
    }

    /// Fields whose absence from a history is fatal.
    pub fn required_fields(&self) -> Vec<HistoryField> {
        [
            HistoryField::ClinicalStatus,
            HistoryField::Adas13,
            HistoryField::VentriclesIcv,
        ]
        .into_iter()
        .filter(|&field| self.get(field) == Requirement::Required)
        .collect()
    }
}

/// The capability shared by every forecasting rule.
pub trait PredictionStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn requirements(&self) -> FieldRequirements;

    /// Fills every row of `template` from `history`. Rows must belong to the
    /// history's subject. On error the template is left untouched.
    fn fill_forecast(
        &self,
        history: &SubjectHistory,
        template: &mut ForecastTemplate,
    ) -> Result<(), ForecastError>;
}

/// Instantiates the strategy named in the configuration.
pub fn strategy_from_config(config: &ForecastConfig) -> Box<dyn PredictionStrategy> {
    let settings = StrategySettings::from_config(config);
    match config.strategy {
        StrategyKind::Naive => Box::new(NaiveStrategy::new(settings)),
        StrategyKind::LinearTrend => Box::new(LinearTrendStrategy::new(settings)),
    }
}

/// The configuration both strategies are built from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategySettings {
    pub priors: StatusPriors,
    pub intervals: IntervalConfig,
    pub fallbacks: FallbackConfig,
}

impl StrategySettings {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            priors: config.status_priors.clone(),
            intervals: config.intervals,
            fallbacks: config.fallbacks,
        }
    }

    /// Status probabilities from the most recent diagnosis, shared by every month.
    fn status_probabilities(
        &self,
        history: &SubjectHistory,
    ) -> Result<ClassProbabilities, ForecastError> {
        match history.most_recent_status() {
            Some(status) => {
                if let ClinicalStatus::Other(_) = status {
                    log::debug!(
                        "Subject {}: status '{}' is outside NL/MCI/Dementia, using the 'other' priors.",
                        history.rid(),
                        status
                    );
                }
                Ok(self.priors.lookup(status))
            }
            None if self.fallbacks.clinical_status => Ok(self.priors.other),
            None => Err(ForecastError::MissingHistory {
                rid: history.rid(),
                field: HistoryField::ClinicalStatus,
            }),
        }
    }

    /// The most recent value of a target, or the flat fallback interval when the
    /// subject never had it measured and a fallback is configured.
    fn latest_or_fallback(
        &self,
        history: &SubjectHistory,
        target: ContinuousTarget,
    ) -> Result<Latest, ForecastError> {
        if let Some(value) = history.most_recent_value(target) {
            return Ok(Latest::Observed(value));
        }
        let fallback = match target {
            ContinuousTarget::Adas13 => self.fallbacks.adas13,
            ContinuousTarget::VentriclesIcv => self.fallbacks.ventricles_icv,
        };
        match fallback {
            Some(estimate) => Ok(Latest::Fallback(fallback_interval(target, estimate))),
            None => Err(ForecastError::MissingHistory {
                rid: history.rid(),
                field: target.field(),
            }),
        }
    }

    fn ventricles_interval(&self, estimate: f64) -> IntervalEstimate {
        let margin = self.intervals.ventricles_relative_half_width * estimate;
        IntervalEstimate {
            estimate,
            lower: (estimate - margin).max(0.0),
            upper: (estimate + margin).min(1.0),
        }
    }
}

enum Latest {
    Observed(f64),
    Fallback(IntervalEstimate),
}

fn fallback_interval(target: ContinuousTarget, fallback: FallbackEstimate) -> IntervalEstimate {
    let upper = fallback.value + fallback.half_width;
    IntervalEstimate {
        estimate: fallback.value,
        lower: (fallback.value - fallback.half_width).max(0.0),
        upper: match target {
            ContinuousTarget::Adas13 => upper,
            ContinuousTarget::VentriclesIcv => upper.min(1.0),
        },
    }
}

fn check_rows_belong_to(
    history: &SubjectHistory,
    template: &ForecastTemplate,
) -> Result<(), ForecastError> {
    match template.rows().iter().find(|row| row.rid != history.rid()) {
        Some(row) => Err(ForecastError::SubjectMismatch {
            rid: history.rid(),
            row_rid: row.rid,
        }),
        None => Ok(()),
    }
}
