//! # Submission Tables
//!
//! The filled forecast of a whole cohort, and its CSV form. Column names and the
//! `YYYY-MM` Forecast Date format follow the TADPOLE submission template, so a
//! table written here can be uploaded or fed back into [`crate::evaluate`].

use crate::template::{ForecastRow, ForecastTemplate};
use crate::types::{ClassProbabilities, IntervalEstimate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Forecast month {month} of subject {rid} was never filled by a strategy.")]
    UnfilledRow { rid: i64, month: u32 },
}

/// A fully populated forecast row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmissionRow {
    pub rid: i64,
    pub forecast_month: u32,
    pub forecast_date: NaiveDate,
    pub probabilities: ClassProbabilities,
    pub adas13: IntervalEstimate,
    pub ventricles_icv: IntervalEstimate,
}

impl TryFrom<ForecastRow> for SubmissionRow {
    type Error = SubmissionError;

    fn try_from(row: ForecastRow) -> Result<Self, Self::Error> {
        let unfilled = SubmissionError::UnfilledRow {
            rid: row.rid,
            month: row.forecast_month,
        };
        match (row.probabilities, row.adas13, row.ventricles_icv) {
            (Some(probabilities), Some(adas13), Some(ventricles_icv)) => Ok(Self {
                rid: row.rid,
                forecast_month: row.forecast_month,
                forecast_date: row.forecast_date,
                probabilities,
                adas13,
                ventricles_icv,
            }),
            _ => Err(unfilled),
        }
    }
}

/// Rows in subject-then-month order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionTable {
    rows: Vec<SubmissionRow>,
}

impl SubmissionTable {
    pub fn new(rows: Vec<SubmissionRow>) -> Self {
        Self { rows }
    }

    /// Concatenates filled templates in the order given. Any row still missing a
    /// value is rejected.
    pub fn from_templates<I>(templates: I) -> Result<Self, SubmissionError>
    where
        I: IntoIterator<Item = ForecastTemplate>,
    {
        let rows = templates
            .into_iter()
            .flat_map(ForecastTemplate::into_rows)
            .map(SubmissionRow::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[SubmissionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for(&self, rid: i64) -> impl Iterator<Item = &SubmissionRow> {
        self.rows.iter().filter(move |row| row.rid == rid)
    }

    /// Distinct subject IDs, sorted.
    pub fn subjects(&self) -> Vec<i64> {
        self.rows
            .iter()
            .map(|row| row.rid)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn write_csv(&self, path: &str) -> Result<(), SubmissionError> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))?;
        log::info!("Wrote {} forecast rows to '{}'", self.rows.len(), path);
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), SubmissionError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(SubmissionRecord::from(row))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &str) -> Result<Self, SubmissionError> {
        let file = std::fs::File::open(path)?;
        let table = Self::read_from(file)?;
        log::debug!("Read {} forecast rows from '{}'", table.rows.len(), path);
        Ok(table)
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self, SubmissionError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let rows = csv_reader
            .deserialize::<SubmissionRecord>()
            .map(|record| record.map(SubmissionRow::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }
}

/// The flat on-disk layout of one row.
#[derive(Debug, Serialize, Deserialize)]
struct SubmissionRecord {
    #[serde(rename = "RID")]
    rid: i64,
    #[serde(rename = "Forecast Month")]
    forecast_month: u32,
    #[serde(rename = "Forecast Date", with = "year_month")]
    forecast_date: NaiveDate,
    #[serde(rename = "CN relative probability")]
    cn: f64,
    #[serde(rename = "MCI relative probability")]
    mci: f64,
    #[serde(rename = "AD relative probability")]
    ad: f64,
    #[serde(rename = "ADAS13")]
    adas13: f64,
    #[serde(rename = "ADAS13 50% CI lower")]
    adas13_lower: f64,
    #[serde(rename = "ADAS13 50% CI upper")]
    adas13_upper: f64,
    #[serde(rename = "Ventricles_ICV")]
    ventricles_icv: f64,
    #[serde(rename = "Ventricles_ICV 50% CI lower")]
    ventricles_icv_lower: f64,
    #[serde(rename = "Ventricles_ICV 50% CI upper")]
    ventricles_icv_upper: f64,
}

impl From<&SubmissionRow> for SubmissionRecord {
    fn from(row: &SubmissionRow) -> Self {
        Self {
            rid: row.rid,
            forecast_month: row.forecast_month,
            forecast_date: row.forecast_date,
            cn: row.probabilities.cn,
            mci: row.probabilities.mci,
            ad: row.probabilities.ad,
            adas13: row.adas13.estimate,
            adas13_lower: row.adas13.lower,
            adas13_upper: row.adas13.upper,
            ventricles_icv: row.ventricles_icv.estimate,
            ventricles_icv_lower: row.ventricles_icv.lower,
            ventricles_icv_upper: row.ventricles_icv.upper,
        }
    }
}

impl From<SubmissionRecord> for SubmissionRow {
    fn from(record: SubmissionRecord) -> Self {
        Self {
            rid: record.rid,
            forecast_month: record.forecast_month,
            forecast_date: record.forecast_date,
            probabilities: ClassProbabilities::new(record.cn, record.mci, record.ad),
            adas13: IntervalEstimate {
                estimate: record.adas13,
                lower: record.adas13_lower,
                upper: record.adas13_upper,
            },
            ventricles_icv: IntervalEstimate {
                estimate: record.ventricles_icv,
                lower: record.ventricles_icv_lower,
                upper: record.ventricles_icv_upper,
            },
        }
    }
}

/// `YYYY-MM` on disk; the first of the month in memory.
mod year_month {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").map_err(|_| {
            serde::de::Error::custom(format!("'{text}' is not a YYYY-MM forecast date"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateBuilder;
    use tempfile::NamedTempFile;

    fn filled_template(rid: i64, months: u32, adas13: f64) -> ForecastTemplate {
        let builder =
            TemplateBuilder::new(NaiveDate::from_ymd_opt(2010, 11, 1).unwrap(), months).unwrap();
        let mut template = builder.build(&[rid]);
        for row in template.rows_mut() {
            row.probabilities = Some(ClassProbabilities::new(0.1, 0.2, 0.7));
            row.adas13 = Some(IntervalEstimate {
                estimate: adas13,
                lower: adas13 - 1.0,
                upper: adas13 + 1.0,
            });
            row.ventricles_icv = Some(IntervalEstimate {
                estimate: 0.0213,
                lower: 0.021087,
                upper: 0.021513,
            });
        }
        template
    }

    #[test]
    fn write_then_read_preserves_rows() {
        let table = SubmissionTable::from_templates(vec![
            filled_template(45, 3, 17.25),
            filled_template(23, 3, 31.0 / 3.0),
        ])
        .unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.rows()[0].rid, 45);
        assert_eq!(table.rows()[3].rid, 23);
        assert_eq!(table.subjects(), vec![23, 45]);

        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        table.write_csv(path).unwrap();
        let restored = SubmissionTable::read_csv(path).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn dates_are_written_as_year_and_month() {
        let table = SubmissionTable::from_templates(vec![filled_template(7, 3, 20.0)]).unwrap();
        let mut buffer = Vec::new();
        table.write_to(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "RID,Forecast Month,Forecast Date,CN relative probability,MCI relative probability,\
             AD relative probability,ADAS13,ADAS13 50% CI lower,ADAS13 50% CI upper,\
             Ventricles_ICV,Ventricles_ICV 50% CI lower,Ventricles_ICV 50% CI upper"
        );
        let dates: Vec<&str> = lines
            .map(|line| line.split(',').nth(2).unwrap())
            .collect();
        assert_eq!(dates, vec!["2010-11", "2010-12", "2011-01"]);
    }

    #[test]
    fn unfilled_rows_are_rejected() {
        let builder = TemplateBuilder::new(NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(), 2).unwrap();
        let mut template = builder.build(&[9]);
        template.rows_mut()[0].probabilities = Some(ClassProbabilities::new(1.0, 0.0, 0.0));

        match SubmissionTable::from_templates(vec![template]).unwrap_err() {
            SubmissionError::UnfilledRow { rid, month } => assert_eq!((rid, month), (9, 1)),
            other => panic!("Expected UnfilledRow, got {:?}", other),
        }
    }

    #[test]
    fn malformed_forecast_date_is_a_csv_error() {
        let text = "RID,Forecast Month,Forecast Date,CN relative probability,MCI relative probability,\
                    AD relative probability,ADAS13,ADAS13 50% CI lower,ADAS13 50% CI upper,\
                    Ventricles_ICV,Ventricles_ICV 50% CI lower,Ventricles_ICV 50% CI upper\n\
                    1,1,May 2010,0.3,0.3,0.4,10,9,11,0.02,0.0198,0.0202\n";
        assert!(matches!(
            SubmissionTable::read_from(text.as_bytes()).unwrap_err(),
            SubmissionError::Csv(_)
        ));
    }
}
