use super::{
    FieldRequirements, ForecastError, Latest, PredictionStrategy, StrategySettings,
    check_rows_belong_to,
};
use crate::template::ForecastTemplate;
use crate::types::{ContinuousTarget, IntervalEstimate, SubjectHistory};

/// Carries each target's most recent observation forward to every forecast month.
#[derive(Debug, Clone, Default)]
pub struct NaiveStrategy {
    settings: StrategySettings,
}

impl NaiveStrategy {
    pub fn new(settings: StrategySettings) -> Self {
        Self { settings }
    }

    fn adas13_interval(&self, history: &SubjectHistory) -> Result<IntervalEstimate, ForecastError> {
        let half_width = self.settings.intervals.adas13_half_width;
        Ok(
            match self.settings.latest_or_fallback(history, ContinuousTarget::Adas13)? {
                Latest::Observed(value) => IntervalEstimate {
                    estimate: value,
                    lower: (value - half_width).max(0.0),
                    upper: value + half_width,
                },
                Latest::Fallback(interval) => interval,
            },
        )
    }

    fn ventricles_interval(
        &self,
        history: &SubjectHistory,
    ) -> Result<IntervalEstimate, ForecastError> {
        Ok(
            match self
                .settings
                .latest_or_fallback(history, ContinuousTarget::VentriclesIcv)?
            {
                Latest::Observed(value) => self.settings.ventricles_interval(value),
                Latest::Fallback(interval) => interval,
            },
        )
    }
}

impl PredictionStrategy for NaiveStrategy {
    fn name(&self) -> &'static str {
        "naive"
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

        let probabilities = self.settings.status_probabilities(history)?;
        let adas13 = self.adas13_interval(history)?;
        let ventricles_icv = self.ventricles_interval(history)?;

        for row in template.rows_mut() {
            row.probabilities = Some(probabilities);
            row.adas13 = Some(adas13);
            row.ventricles_icv = Some(ventricles_icv);
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
    use crate::types::{ClassProbabilities, ClinicalStatus, HistoryField};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn template_for(rid: i64, months: u32) -> ForecastTemplate {
        TemplateBuilder::new(NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(), months)
            .unwrap()
            .build(&[rid])
    }

    #[test]
    fn repeats_latest_adas13_with_unit_interval() {
        let history = rising_history(7);
        let mut template = template_for(7, 2);
        NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();

        for row in template.rows() {
            let adas = row.adas13.unwrap();
            assert_eq!((adas.estimate, adas.lower, adas.upper), (22.0, 21.0, 23.0));
        }
    }

    #[test]
    fn every_month_carries_the_lookup_probabilities() {
        let history = rising_history(7);
        let mut template = template_for(7, 12);
        NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();

        assert!(template.rows().iter().all(|row| row.is_filled()));
        for row in template.rows() {
            assert_eq!(
                row.probabilities,
                Some(ClassProbabilities::new(0.15, 0.15, 0.70))
            );
        }
    }

    #[test]
    fn ventricles_interval_is_one_percent_and_clamped() {
        let history = rising_history(7);
        let mut template = template_for(7, 1);
        NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();

        let vent = template.rows()[0].ventricles_icv.unwrap();
        assert_abs_diff_eq!(vent.estimate, 0.021, epsilon = 1e-12);
        assert_abs_diff_eq!(vent.lower, 0.02079, epsilon = 1e-12);
        assert_abs_diff_eq!(vent.upper, 0.02121, epsilon = 1e-12);

        let mut saturated = visit(8, (2010, 1, 1), 70.0);
        saturated.ventricles_icv = Some(0.995);
        let history = SubjectHistory::new(8, vec![saturated]);
        let mut template = template_for(8, 1);
        NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();
        assert_eq!(template.rows()[0].ventricles_icv.unwrap().upper, 1.0);
    }

    #[test]
    fn adas13_lower_bound_is_floored_at_zero() {
        let mut only = visit(9, (2010, 1, 1), 70.0);
        only.adas13 = Some(0.5);
        let history = SubjectHistory::new(9, vec![only]);
        let mut template = template_for(9, 1);
        NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();
        assert_eq!(template.rows()[0].adas13.unwrap().lower, 0.0);
    }

    #[test]
    fn missing_adas13_history_is_an_error_without_fallback() {
        let mut only = visit(11, (2010, 1, 1), 70.0);
        only.adas13 = None;
        let history = SubjectHistory::new(11, vec![only]);
        let mut template = template_for(11, 3);

        let err = NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::MissingHistory {
                rid: 11,
                field: HistoryField::Adas13
            }
        );
        assert!(template.rows().iter().all(|row| row.adas13.is_none()));
    }

    #[test]
    fn missing_adas13_history_uses_configured_fallback() {
        let mut only = visit(11, (2010, 1, 1), 70.0);
        only.adas13 = None;
        let history = SubjectHistory::new(11, vec![only]);
        let mut template = template_for(11, 3);

        let settings = StrategySettings {
            fallbacks: FallbackConfig {
                adas13: Some(FallbackEstimate {
                    value: 12.0,
                    half_width: 10.0,
                }),
                ..FallbackConfig::default()
            },
            ..StrategySettings::default()
        };
        NaiveStrategy::new(settings)
            .fill_forecast(&history, &mut template)
            .unwrap();
        let adas = template.rows()[2].adas13.unwrap();
        assert_eq!((adas.estimate, adas.lower, adas.upper), (12.0, 2.0, 22.0));
    }

    #[test]
    fn unknown_status_uses_other_priors() {
        let mut only = visit(12, (2010, 1, 1), 70.0);
        only.clinical_status = Some(ClinicalStatus::Other("SMC".into()));
        let history = SubjectHistory::new(12, vec![only]);
        let mut template = template_for(12, 1);
        NaiveStrategy::default()
            .fill_forecast(&history, &mut template)
            .unwrap();
        assert_eq!(
            template.rows()[0].probabilities,
            Some(ClassProbabilities::new(0.33, 0.33, 0.34))
        );
    }

    #[test]
    fn rows_of_another_subject_are_rejected() {
        let history = rising_history(7);
        let mut template = template_for(8, 1);
        assert_eq!(
            NaiveStrategy::default()
                .fill_forecast(&history, &mut template)
                .unwrap_err(),
            ForecastError::SubjectMismatch { rid: 7, row_rid: 8 }
        );
    }
}
