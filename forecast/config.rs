use crate::types::{ClassProbabilities, ClinicalStatus, HistoryField};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the human-readable TOML format of a forecast run.

/// Which closed-form rule fills the forecast template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Repeat the most recent observation for every month.
    Naive,
    /// Extrapolate a least-squares line of value against age.
    LinearTrend,
}

/// What the pipeline does when one subject cannot be forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the whole run at the first failing subject.
    Abort,
    /// Log the failure, leave the subject out of the submission and continue.
    Skip,
}

/// The lookup table from most recent clinical status to forecast probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPriors {
    pub normal: ClassProbabilities,
    pub mci: ClassProbabilities,
    pub dementia: ClassProbabilities,
    /// Used for any status outside the challenge vocabulary.
    pub other: ClassProbabilities,
}

impl Default for StatusPriors {
    fn default() -> Self {
        Self {
            normal: ClassProbabilities::new(0.30, 0.40, 0.30),
            mci: ClassProbabilities::new(0.10, 0.50, 0.40),
            dementia: ClassProbabilities::new(0.15, 0.15, 0.70),
            other: ClassProbabilities::new(0.33, 0.33, 0.34),
        }
    }
}

impl StatusPriors {
    pub fn lookup(&self, status: &ClinicalStatus) -> ClassProbabilities {
        match status {
            ClinicalStatus::Normal => self.normal,
            ClinicalStatus::Mci => self.mci,
            ClinicalStatus::Dementia => self.dementia,
            ClinicalStatus::Other(_) => self.other,
        }
    }

    fn entries(&self) -> [(&'static str, &ClassProbabilities); 4] {
        [
            ("normal", &self.normal),
            ("mci", &self.mci),
            ("dementia", &self.dementia),
            ("other", &self.other),
        ]
    }
}

/// Widths of the 50% confidence intervals placed around point estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalConfig {
    /// Absolute half width of the ADAS13 interval, in score points.
    pub adas13_half_width: f64,
    /// Half width of the Ventricles_ICV interval as a fraction of the estimate.
    pub ventricles_relative_half_width: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            adas13_half_width: 1.0,
            ventricles_relative_half_width: 0.01,
        }
    }
}

/// A flat estimate used for subjects who never had a target measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackEstimate {
    pub value: f64,
    pub half_width: f64,
}

/// Optional substitutes for missing histories. A field without a fallback is required,
/// and a subject without any observation of it fails to forecast.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Forecast the `other` priors when a subject never received a diagnosis.
    #[serde(default)]
    pub clinical_status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adas13: Option<FallbackEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ventricles_icv: Option<FallbackEstimate>,
}

impl FallbackConfig {
    pub fn covers(&self, field: HistoryField) -> bool {
        match field {
            HistoryField::ClinicalStatus => self.clinical_status,
            HistoryField::Adas13 => self.adas13.is_some(),
            HistoryField::VentriclesIcv => self.ventricles_icv.is_some(),
        }
    }
}

/// The complete description of a forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Calendar date of forecast month 1. Later months advance by whole months.
    pub anchor_date: NaiveDate,
    /// Number of monthly forecasts per subject.
    pub horizon_months: u32,
    /// Name of the 0/1 column that selects the subjects to forecast.
    pub cohort_column: String,
    pub strategy: StrategyKind,
    pub failure_policy: FailurePolicy,
    /// Fill subjects on the rayon thread pool. Output order is unaffected.
    pub parallel: bool,
    pub status_priors: StatusPriors,
    pub intervals: IntervalConfig,
    pub fallbacks: FallbackConfig,
}

/// The challenge asks for 84 months: some LB4 visits fall seven years after the
/// subject's last LB2 visit.
pub const DEFAULT_HORIZON_MONTHS: u32 = 7 * 12;

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            anchor_date: NaiveDate::from_ymd_opt(2010, 5, 1).expect("2010-05-01 is a valid date"),
            horizon_months: DEFAULT_HORIZON_MONTHS,
            cohort_column: "LB2".to_string(),
            strategy: StrategyKind::Naive,
            failure_policy: FailurePolicy::Abort,
            parallel: true,
            status_priors: StatusPriors::default(),
            intervals: IntervalConfig::default(),
            fallbacks: FallbackConfig::default(),
        }
    }
}

/// Custom error type for configuration loading, saving, and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The forecast horizon must be at least one month.")]
    ZeroHorizon,
    #[error(
        "Status priors for '{status}' must be non-negative and sum to 1.0 (found sum {sum:.4})."
    )]
    InvalidPriors { status: &'static str, sum: f64 },
    #[error("Interval setting '{0}' must be a finite, positive number.")]
    InvalidInterval(&'static str),
    #[error(
        "Fallback for {field} needs a finite value and a finite, positive half width (found value {value}, half width {half_width})."
    )]
    InvalidFallback {
        field: HistoryField,
        value: f64,
        half_width: f64,
    },
}

impl ForecastConfig {
    /// Checks the invariants that deserialization alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_months == 0 {
            return Err(ConfigError::ZeroHorizon);
        }

        for (status, priors) in self.status_priors.entries() {
            let sum = priors.total();
            let non_negative = priors.as_array().iter().all(|&p| p >= 0.0);
            if !non_negative || (sum - 1.0).abs() > 1e-6 {
                return Err(ConfigError::InvalidPriors { status, sum });
            }
        }

        let widths = [
            ("adas13_half_width", self.intervals.adas13_half_width),
            (
                "ventricles_relative_half_width",
                self.intervals.ventricles_relative_half_width,
            ),
        ];
        for (name, width) in widths {
            if !width.is_finite() || width <= 0.0 {
                return Err(ConfigError::InvalidInterval(name));
            }
        }

        let fallbacks = [
            (HistoryField::Adas13, self.fallbacks.adas13),
            (HistoryField::VentriclesIcv, self.fallbacks.ventricles_icv),
        ];
        for (field, fallback) in fallbacks {
            let Some(FallbackEstimate { value, half_width }) = fallback else {
                continue;
            };
            if !value.is_finite() || !half_width.is_finite() || half_width <= 0.0 {
                return Err(ConfigError::InvalidFallback {
                    field,
                    value,
                    half_width,
                });
            }
        }

        Ok(())
    }

    /// Saves the configuration to a file in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file. Missing keys take
    /// their default values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: ForecastConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
