use super::{
    FieldRequirements, ForecastError, Latest, PredictionStrategy, StrategySettings,
    check_rows_belong_to,
};
use crate::template::ForecastTemplate;
use crate::trend::{AffineFit, FitError};
use crate::types::{ContinuousTarget, IntervalEstimate, SubjectHistory};

/// Extrapolates each continuous target along a least-squares line in age.
///
/// The line is fitted on visits where both the value and the age are positive and is
/// evaluated at `age_at_last_exam + month / 12`. ADAS13 never drops below its most
/// recent observation; Ventricles_ICV follows the line directly.
#[derive(Debug, Clone, Default)]
pub struct LinearTrendStrategy {
    settings: StrategySettings,
}

/// How one target evolves over the forecast months.
enum Projection {
    Trend { fit: AffineFit, floor: Option<f64> },
    Flat(IntervalEstimate),
}

impl LinearTrendStrategy {
    pub fn new(settings: StrategySettings) -> Self {
        Self { settings }
    }

    fn projection(
        &self,
        history: &SubjectHistory,
        target: ContinuousTarget,
    ) -> Result<Projection, ForecastError> {
        let latest = match self.settings.latest_or_fallback(history, target)? {
            Latest::Observed(value) => value,
            Latest::Fallback(interval) => return Ok(Projection::Flat(interval)),
        };

        let (ages, values) = history.trend_points(target);
        let fit = AffineFit::fit(&ages, &values).map_err(|e| match e {
            FitError::TooFewPoints(found) => ForecastError::InsufficientHistory {
                rid: history.rid(),
                field: target.field(),
                found,
            },
            other => ForecastError::DegenerateFit {
                rid: history.rid(),
                field: target.field(),
                reason: other.to_string(),
            },
        })?;
        log::trace!(
            "Subject {}: {} trend slope {:.5} per year over {} points",
            history.rid(),
            target.field(),
            fit.slope,
            ages.len()
        );

        let floor = match target {
            ContinuousTarget::Adas13 => Some(latest),
            ContinuousTarget::VentriclesIcv => None,
        };
        Ok(Projection::Trend { fit, floor })
    }

    fn interval_at(
        &self,
        projection: &Projection,
        target: ContinuousTarget,
        age: f64,
    ) -> IntervalEstimate {
        let (fit, floor) = match projection {
            Projection::Flat(interval) => return *interval,
            Projection::Trend { fit, floor } => (fit, floor),
        };
        let predicted = fit.evaluate(age);
        let estimate = floor.map_or(predicted, |latest| predicted.max(latest));

        match target {
            ContinuousTarget::Adas13 => {
                let half_width = self.settings.intervals.adas13_half_width;
                IntervalEstimate {
                    estimate,
                    lower: estimate - half_width,
                    upper: estimate + half_width,
                }
            }
            ContinuousTarget::VentriclesIcv => self.settings.ventricles_interval(estimate),
        }
    }
}

impl PredictionStrategy for LinearTrendStrategy {
    fn name(&self) -> &'static str {
        "linear-trend"
    }

    fn requirements(&self) -> FieldRequirements {
        FieldRequirements::from_fallbacks(&self.settings.fallbacks)
    }

    fn fill_forecast(
        &self,
        history: &SubjectHistory,
        template: &mut ForecastTemplate,
    ) -> Result<(), ForecastError> {
        check_rows_belong_to(history, template)?;

        let last_age = history
            .age_at_last_exam()
            .ok_or(ForecastError::EmptyHistory(history.rid()))?;
        let probabilities = self.settings.status_probabilities(history)?;
        let adas13 = self.projection(history, ContinuousTarget::Adas13)?;
        let ventricles = self.projection(history, ContinuousTarget::VentriclesIcv)?;

        for row in template.rows_mut() {
            let age = last_age + f64::from(row.forecast_month) / 12.0;
            row.probabilities = Some(probabilities);
            row.adas13 = Some(self.interval_at(&adas13, ContinuousTarget::Adas13, age));
            row.ventricles_icv =
                Some(self.interval_at(&ventricles, ContinuousTarget::VentriclesIcv, age));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackConfig, FallbackEstimate};
    use crate::strategy::test_support::{rising_history, visit};
    use crate::template::TemplateBuilder;
    use crate::types::{ClassProbabilities, HistoryField};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn template_for(rid: i64, months: u32) -> ForecastTemplate {
        TemplateBuilder::new(NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(), months)
            .unwrap()
            .build(&[rid])
    }

    #[test]
    fn adas13_rises_along_the_fitted_line() {
        let history = rising_history(3);
        let mut template = template_for(3, 2);
        LinearTrendStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();

        // 4 points per year from the last visit at age 70.5 and score 22.
        let first = template.rows()[0].adas13.unwrap();
        let second = template.rows()[1].adas13.unwrap();
        assert_abs_diff_eq!(first.estimate, 22.0 + 4.0 / 12.0, epsilon = 1e-8);
        assert_abs_diff_eq!(second.estimate, 22.0 + 8.0 / 12.0, epsilon = 1e-8);
        assert!(second.estimate > first.estimate && first.estimate > 22.0);
        assert_abs_diff_eq!(second.lower, second.estimate - 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(second.upper, second.estimate + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn declining_adas13_is_floored_at_latest_observation() {
        let mut first = visit(4, (2010, 1, 1), 70.0);
        first.adas13 = Some(30.0);
        let mut second = visit(4, (2011, 1, 1), 71.0);
        second.adas13 = Some(25.0);
        let history = SubjectHistory::new(4, vec![first, second]);

        let mut template = template_for(4, 24);
        LinearTrendStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();
        for row in template.rows() {
            assert_eq!(row.adas13.unwrap().estimate, 25.0);
        }
    }

    #[test]
    fn ventricles_follow_the_line_without_floor() {
        let mut first = visit(5, (2010, 1, 1), 70.0);
        first.ventricles_icv = Some(0.030);
        let mut second = visit(5, (2011, 1, 1), 71.0);
        second.ventricles_icv = Some(0.024);
        let history = SubjectHistory::new(5, vec![first, second]);

        let mut template = template_for(5, 12);
        LinearTrendStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();
        let last = template.rows()[11].ventricles_icv.unwrap();
        assert_abs_diff_eq!(last.estimate, 0.018, epsilon = 1e-9);
        assert_abs_diff_eq!(last.lower, 0.018 * 0.99, epsilon = 1e-9);
        assert_abs_diff_eq!(last.upper, 0.018 * 1.01, epsilon = 1e-9);
    }

    #[test]
    fn status_probabilities_match_naive_lookup() {
        let history = rising_history(3);
        let mut template = template_for(3, 6);
        LinearTrendStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();
        for row in template.rows() {
            assert_eq!(
                row.probabilities,
                Some(ClassProbabilities::new(0.15, 0.15, 0.70))
            );
        }
    }

    #[test]
    fn one_usable_point_is_insufficient() {
        let mut first = visit(6, (2010, 1, 1), 70.0);
        first.adas13 = Some(0.0);
        let second = visit(6, (2011, 1, 1), 71.0);
        let history = SubjectHistory::new(6, vec![first, second]);

        let err = LinearTrendStrategy::default()
            .fill_forecast(&history, &mut template_for(6, 3))
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                rid: 6,
                field: HistoryField::Adas13,
                found: 1
            }
        );
    }

    #[test]
    fn same_day_visits_are_a_degenerate_fit() {
        let mut first = visit(7, (2010, 1, 1), 70.0);
        first.adas13 = Some(18.0);
        let mut second = visit(7, (2010, 1, 1), 70.0);
        second.adas13 = Some(19.0);
        let history = SubjectHistory::new(7, vec![first, second]);

        let err = LinearTrendStrategy::default()
            .fill_forecast(&history, &mut template_for(7, 3))
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::DegenerateFit {
                rid: 7,
                field: HistoryField::Adas13,
                ..
            }
        ));
    }

    #[test]
    fn fallback_target_stays_flat() {
        let mut first = visit(8, (2010, 1, 1), 70.0);
        first.ventricles_icv = None;
        let mut second = visit(8, (2011, 1, 1), 71.0);
        second.ventricles_icv = None;
        second.adas13 = Some(24.0);
        let history = SubjectHistory::new(8, vec![first, second]);

        let settings = StrategySettings {
            fallbacks: FallbackConfig {
                ventricles_icv: Some(FallbackEstimate {
                    value: 0.02,
                    half_width: 0.005,
                }),
                ..FallbackConfig::default()
            },
            ..StrategySettings::default()
        };
        let mut template = template_for(8, 6);
        LinearTrendStrategy::new(settings)
            .fill_forecast(&history, &mut template)
            .unwrap();
        let vents: Vec<f64> = template
            .rows()
            .iter()
            .map(|row| row.ventricles_icv.unwrap().estimate)
            .collect();
        assert!(vents.iter().all(|&v| v == 0.02));
    }
}
