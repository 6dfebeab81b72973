//! Empty, fixed-schema forecast tables.
//!
//! One row per (subject, forecast month), subject-major and month-minor. The value
//! columns start out empty and are filled exactly once by a prediction strategy.

use crate::config::ForecastConfig;
use crate::types::{ClassProbabilities, IntervalEstimate};
use chrono::{Months, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("The forecast horizon must be at least one month.")]
    ZeroHorizon,
    #[error("Forecast month {month} past anchor {anchor} is outside the supported calendar range.")]
    DateOverflow { anchor: NaiveDate, month: u32 },
}

/// One forecast month of one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub rid: i64,
    /// 1-based month index.
    pub forecast_month: u32,
    pub forecast_date: NaiveDate,
    pub probabilities: Option<ClassProbabilities>,
    pub adas13: Option<IntervalEstimate>,
    pub ventricles_icv: Option<IntervalEstimate>,
}

impl ForecastRow {
    pub fn is_filled(&self) -> bool {
        self.probabilities.is_some() && self.adas13.is_some() && self.ventricles_icv.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastTemplate {
    rows: Vec<ForecastRow>,
}

impl ForecastTemplate {
    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ForecastRow] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<ForecastRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds empty templates for a fixed anchor date and horizon.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    forecast_dates: Vec<NaiveDate>,
}

impl TemplateBuilder {
    /// Resolves the calendar date of every forecast month up front, so `build`
    /// cannot fail once the builder exists.
    pub fn new(anchor: NaiveDate, horizon: u32) -> Result<Self, TemplateError> {
        if horizon == 0 {
            return Err(TemplateError::ZeroHorizon);
        }

        let forecast_dates = (1..=horizon)
            .map(|month| {
                anchor
                    .checked_add_months(Months::new(month - 1))
                    .ok_or(TemplateError::DateOverflow { anchor, month })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { forecast_dates })
    }

    pub fn from_config(config: &ForecastConfig) -> Result<Self, TemplateError> {
        Self::new(config.anchor_date, config.horizon_months)
    }

    pub fn horizon(&self) -> u32 {
        self.forecast_dates.len() as u32
    }

    pub fn forecast_dates(&self) -> &[NaiveDate] {
        &self.forecast_dates
    }

    /// An empty subject list yields an empty template.
    pub fn build(&self, subjects: &[i64]) -> ForecastTemplate {
        let mut rows = Vec::with_capacity(subjects.len() * self.forecast_dates.len());
        for &rid in subjects {
            for (idx, &forecast_date) in self.forecast_dates.iter().enumerate() {
                rows.push(ForecastRow {
                    rid,
                    forecast_month: idx as u32 + 1,
                    forecast_date,
                    probabilities: None,
                    adas13: None,
                    ventricles_icv: None,
                });
            }
        }
        ForecastTemplate { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rows_are_subject_major_month_minor() {
        let builder = TemplateBuilder::new(date(2010, 5, 1), 3).unwrap();
        let template = builder.build(&[23, 45]);

        let keys: Vec<(i64, u32)> = template
            .rows()
            .iter()
            .map(|row| (row.rid, row.forecast_month))
            .collect();
        assert_eq!(
            keys,
            vec![(23, 1), (23, 2), (23, 3), (45, 1), (45, 2), (45, 3)]
        );

        let dates: Vec<NaiveDate> = template.rows()[..3]
            .iter()
            .map(|row| row.forecast_date)
            .collect();
        assert_eq!(dates, vec![date(2010, 5, 1), date(2010, 6, 1), date(2010, 7, 1)]);
        assert_eq!(template.rows()[3].forecast_date, date(2010, 5, 1));
        assert!(template.rows().iter().all(|row| !row.is_filled()));
    }

    #[test]
    fn months_roll_over_year_boundaries() {
        let builder = TemplateBuilder::new(date(2010, 11, 1), 4).unwrap();
        assert_eq!(
            builder.forecast_dates(),
            &[date(2010, 11, 1), date(2010, 12, 1), date(2011, 1, 1), date(2011, 2, 1)]
        );
    }

    #[test]
    fn full_challenge_horizon_ends_seven_years_later() {
        let builder = TemplateBuilder::new(date(2010, 5, 1), 84).unwrap();
        assert_eq!(builder.horizon(), 84);
        assert_eq!(builder.forecast_dates().last(), Some(&date(2017, 4, 1)));
    }

    #[test]
    fn empty_subject_list_gives_empty_template() {
        let builder = TemplateBuilder::new(date(2010, 5, 1), 84).unwrap();
        let template = builder.build(&[]);
        assert!(template.is_empty());
        assert_eq!(template.len(), 0);
    }

    #[test]
    fn zero_horizon_is_rejected() {
        assert_eq!(
            TemplateBuilder::new(date(2010, 5, 1), 0).unwrap_err(),
            TemplateError::ZeroHorizon
        );
    }
}
