//! # Visit Records and Subject Histories
//!
//! The in-memory shape of a loaded TADPOLE table. Every numeric target is an
//! `Option`, because missingness in the challenge data is per field rather than
//! per visit: a subject can have an MRI scan without a cognitive assessment at
//! the same exam and vice versa.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Diagnostic category derived from the last token of a raw `DX` string.
///
/// Conversion labels such as `"MCI to Dementia"` collapse to their final state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClinicalStatus {
    Normal,
    Mci,
    Dementia,
    /// Any token the challenge vocabulary does not name, kept verbatim.
    Other(String),
}

impl ClinicalStatus {
    /// Parses a raw diagnosis string. Blank strings are treated as missing.
    pub fn from_diagnosis(dx: &str) -> Option<Self> {
        let token = dx.split_whitespace().last()?;
        Some(match token {
            "NL" => ClinicalStatus::Normal,
            "MCI" => ClinicalStatus::Mci,
            "Dementia" => ClinicalStatus::Dementia,
            other => ClinicalStatus::Other(other.to_string()),
        })
    }
}

impl fmt::Display for ClinicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClinicalStatus::Normal => write!(f, "NL"),
            ClinicalStatus::Mci => write!(f, "MCI"),
            ClinicalStatus::Dementia => write!(f, "Dementia"),
            ClinicalStatus::Other(token) => write!(f, "{token}"),
        }
    }
}

/// The three forecast targets, named as they appear in the source tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryField {
    ClinicalStatus,
    Adas13,
    VentriclesIcv,
}

impl fmt::Display for HistoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HistoryField::ClinicalStatus => "CLIN_STAT",
            HistoryField::Adas13 => "ADAS13",
            HistoryField::VentriclesIcv => "Ventricles_ICV",
        };
        f.write_str(name)
    }
}

/// The two continuous targets that carry interval forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContinuousTarget {
    Adas13,
    VentriclesIcv,
}

impl ContinuousTarget {
    pub fn field(self) -> HistoryField {
        match self {
            ContinuousTarget::Adas13 => HistoryField::Adas13,
            ContinuousTarget::VentriclesIcv => HistoryField::VentriclesIcv,
        }
    }

    fn value(self, visit: &VisitRecord) -> Option<f64> {
        match self {
            ContinuousTarget::Adas13 => visit.adas13,
            ContinuousTarget::VentriclesIcv => visit.ventricles_icv,
        }
    }
}

/// One exam of one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    pub rid: i64,
    pub exam_date: NaiveDate,
    /// Baseline age plus the years elapsed since the subject's first exam.
    pub age_at_exam: f64,
    pub clinical_status: Option<ClinicalStatus>,
    pub adas13: Option<f64>,
    /// Ventricle volume divided by baseline intracranial volume.
    pub ventricles_icv: Option<f64>,
    /// Membership of the cohort that must be forecast (e.g. `LB2 == 1`).
    pub in_cohort: bool,
}

/// Relative probabilities of the three diagnostic classes for one forecast month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub cn: f64,
    pub mci: f64,
    pub ad: f64,
}

impl ClassProbabilities {
    pub const fn new(cn: f64, mci: f64, ad: f64) -> Self {
        Self { cn, mci, ad }
    }

    /// Probabilities in class-label order (CN = 0, MCI = 1, AD = 2).
    pub fn as_array(&self) -> [f64; 3] {
        [self.cn, self.mci, self.ad]
    }

    /// Index of the most probable class. The first maximum wins on ties.
    pub fn most_likely_class(&self) -> usize {
        let values = self.as_array();
        let mut best = 0;
        for (idx, &p) in values.iter().enumerate().skip(1) {
            if p > values[best] {
                best = idx;
            }
        }
        best
    }

    pub fn total(&self) -> f64 {
        self.cn + self.mci + self.ad
    }
}

/// A point estimate with the bounds of its 50% confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalEstimate {
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

/// The visits of one subject, sorted by exam date.
#[derive(Debug, Clone)]
pub struct SubjectHistory {
    rid: i64,
    visits: Vec<VisitRecord>,
}

impl SubjectHistory {
    /// Sorts the visits by exam date. The sort is stable, so visits sharing a date
    /// keep their input order.
    pub fn new(rid: i64, mut visits: Vec<VisitRecord>) -> Self {
        visits.sort_by_key(|visit| visit.exam_date);
        Self { rid, visits }
    }

    pub fn rid(&self) -> i64 {
        self.rid
    }

    pub fn visits(&self) -> &[VisitRecord] {
        &self.visits
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Status of the latest visit that has one.
    pub fn most_recent_status(&self) -> Option<&ClinicalStatus> {
        self.visits
            .iter()
            .rev()
            .find_map(|visit| visit.clinical_status.as_ref())
    }

    /// Latest non-missing value of a continuous target. Each target is resolved
    /// on its own, so the values for different targets may come from different visits.
    pub fn most_recent_value(&self, target: ContinuousTarget) -> Option<f64> {
        self.visits
            .iter()
            .rev()
            .find_map(|visit| target.value(visit))
    }

    /// Age at the latest visit, regardless of which targets it measured.
    pub fn age_at_last_exam(&self) -> Option<f64> {
        self.visits.last().map(|visit| visit.age_at_exam)
    }

    /// `(age, value)` pairs usable for a trend fit: both strictly positive.
    pub fn trend_points(&self, target: ContinuousTarget) -> (Vec<f64>, Vec<f64>) {
        self.visits
            .iter()
            .filter_map(|visit| {
                let value = target.value(visit)?;
                (value > 0.0 && visit.age_at_exam > 0.0).then_some((visit.age_at_exam, value))
            })
            .unzip()
    }
}

/// All loaded visits, indexed by subject.
#[derive(Debug, Clone, Default)]
pub struct VisitTable {
    by_subject: BTreeMap<i64, Vec<VisitRecord>>,
}

impl VisitTable {
    pub fn from_records(records: Vec<VisitRecord>) -> Self {
        let mut by_subject: BTreeMap<i64, Vec<VisitRecord>> = BTreeMap::new();
        for record in records {
            by_subject.entry(record.rid).or_default().push(record);
        }
        Self { by_subject }
    }

    pub fn num_visits(&self) -> usize {
        self.by_subject.values().map(Vec::len).sum()
    }

    pub fn num_subjects(&self) -> usize {
        self.by_subject.len()
    }

    /// Sorted identifiers of subjects with at least one visit flagged as in-cohort.
    pub fn cohort_subjects(&self) -> Vec<i64> {
        self.by_subject
            .iter()
            .filter(|(_, visits)| visits.iter().any(|visit| visit.in_cohort))
            .map(|(&rid, _)| rid)
            .collect()
    }

    pub fn history(&self, rid: i64) -> Option<SubjectHistory> {
        self.by_subject
            .get(&rid)
            .map(|visits| SubjectHistory::new(rid, visits.clone()))
    }
}
