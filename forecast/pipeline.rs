//! # Forecast Pipeline
//!
//! Drives one strategy over a list of subjects: take the subject's history, build
//! its empty template, let the strategy fill it, and concatenate the results in
//! the order the subjects were given. Subjects are independent, so the loop runs on
//! the rayon pool when enabled; the ordered `collect` keeps the output identical to
//! a sequential run.

use crate::config::{ConfigError, FailurePolicy, ForecastConfig};
use crate::strategy::{ForecastError, PredictionStrategy, strategy_from_config};
use crate::submission::{SubmissionError, SubmissionTable};
use crate::template::{ForecastTemplate, TemplateBuilder};
use crate::types::VisitTable;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A subject dropped under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSubject {
    pub rid: i64,
    pub error: ForecastError,
}

#[derive(Debug, Clone)]
pub struct ForecastRun {
    pub submission: SubmissionTable,
    pub skipped: Vec<SkippedSubject>,
}

pub struct ForecastPipeline {
    builder: TemplateBuilder,
    strategy: Box<dyn PredictionStrategy>,
    policy: FailurePolicy,
    parallel: bool,
}

impl ForecastPipeline {
    pub fn new(
        builder: TemplateBuilder,
        strategy: Box<dyn PredictionStrategy>,
        policy: FailurePolicy,
        parallel: bool,
    ) -> Self {
        Self {
            builder,
            strategy,
            policy,
            parallel,
        }
    }

    /// Validates the configuration and wires its strategy, horizon and policy.
    pub fn from_config(config: &ForecastConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let builder = TemplateBuilder::from_config(config).map_err(ForecastError::from)?;
        Ok(Self::new(
            builder,
            strategy_from_config(config),
            config.failure_policy,
            config.parallel,
        ))
    }

    pub fn strategy(&self) -> &dyn PredictionStrategy {
        self.strategy.as_ref()
    }

    /// The filled template of a single subject.
    pub fn forecast_subject(
        &self,
        table: &VisitTable,
        rid: i64,
    ) -> Result<ForecastTemplate, ForecastError> {
        let history = table
            .history(rid)
            .filter(|history| !history.is_empty())
            .ok_or(ForecastError::EmptyHistory(rid))?;
        let mut template = self.builder.build(&[rid]);
        self.strategy.fill_forecast(&history, &mut template)?;
        Ok(template)
    }

    /// Forecasts `subjects` in order. Under [`FailurePolicy::Abort`] the first
    /// failing subject (in input order) ends the run.
    pub fn run(&self, table: &VisitTable, subjects: &[i64]) -> Result<ForecastRun, PipelineError> {
        log::info!(
            "Forecasting {} subjects over {} months with the {} strategy (required history: {:?})",
            subjects.len(),
            self.builder.horizon(),
            self.strategy.name(),
            self.strategy.requirements().required_fields()
        );

        let outcomes: Vec<Result<ForecastTemplate, ForecastError>> = if self.parallel {
            subjects
                .par_iter()
                .map(|&rid| self.forecast_subject(table, rid))
                .collect()
        } else {
            subjects
                .iter()
                .map(|&rid| self.forecast_subject(table, rid))
                .collect()
        };

        let mut templates = Vec::with_capacity(subjects.len());
        let mut skipped = Vec::new();
        for (&rid, outcome) in subjects.iter().zip(outcomes) {
            match outcome {
                Ok(template) => templates.push(template),
                Err(error) => match self.policy {
                    FailurePolicy::Abort => return Err(error.into()),
                    FailurePolicy::Skip => {
                        log::warn!("Skipping subject {rid}: {error}");
                        skipped.push(SkippedSubject { rid, error });
                    }
                },
            }
        }

        let submission = SubmissionTable::from_templates(templates)?;
        log::info!(
            "Produced {} forecast rows; {} subjects skipped",
            submission.len(),
            skipped.len()
        );
        Ok(ForecastRun {
            submission,
            skipped,
        })
    }

    /// Forecasts every subject flagged as belonging to the cohort.
    pub fn run_cohort(&self, table: &VisitTable) -> Result<ForecastRun, PipelineError> {
        self.run(table, &table.cohort_subjects())
    }
}
