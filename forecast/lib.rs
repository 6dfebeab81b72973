#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Forecast generation and scoring for the TADPOLE challenge.
//!
//! A [`types::VisitTable`] loaded by [`data::load_visit_table`] is turned into a
//! [`submission::SubmissionTable`] by a [`pipeline::ForecastPipeline`], which
//! fills one [`template::ForecastTemplate`] per subject with a
//! [`strategy::PredictionStrategy`]. [`evaluate`] scores a submission against
//! ground truth with the functions in [`metrics`].

pub mod config;
pub mod data;
pub mod evaluate;
pub mod metrics;
pub mod pipeline;
pub mod strategy;
pub mod submission;
pub mod template;
pub mod trend;
pub mod types;
