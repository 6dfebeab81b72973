// ========================================================================================
//
//                 Scoring and forecasting throughput benchmark
//
// ========================================================================================
//
// Measures how the rank-based MAUC and the interval scores scale with the number of
// evaluated forecasts, and how long each strategy takes to fill a cohort of synthetic
// subjects over the full 84-month horizon.
//
// ========================================================================================

use chrono::{Days, NaiveDate};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tadpole::config::{ForecastConfig, StrategyKind};
use tadpole::metrics::{calculate_cpa, calculate_wes, mauc};
use tadpole::pipeline::ForecastPipeline;
use tadpole::types::{ClinicalStatus, VisitRecord, VisitTable};

// --- Benchmark Tuning Parameters ---

/// Number of scored forecasts per metric call.
const INSTANCE_COUNTS: [usize; 3] = [1_000, 10_000, 100_000];
/// Number of synthetic subjects forecast per pipeline run.
const NUM_SUBJECTS: usize = 500;
/// Visits per synthetic subject, six months apart.
const VISITS_PER_SUBJECT: usize = 6;

fn synthetic_probabilities(rng: &mut StdRng, n: usize) -> (Array1<usize>, Array2<f64>) {
    let labels = Array1::from_shape_fn(n, |i| if i < 3 { i } else { rng.gen_range(0..3) });
    let mut probabilities = Array2::from_shape_fn((n, 3), |_| rng.gen_range(0.01..1.0));
    for mut row in probabilities.rows_mut() {
        let total = row.sum();
        row.mapv_inplace(|p| p / total);
    }
    (labels, probabilities)
}

fn benchmark_metrics(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2017);
    let mut group = c.benchmark_group("Submission metrics");

    for &n in &INSTANCE_COUNTS {
        let (labels, probabilities) = synthetic_probabilities(&mut rng, n);
        let estimates = Array1::from_shape_fn(n, |_| rng.gen_range(0.0..70.0));
        let trues = Array1::from_shape_fn(n, |i| estimates[i] + rng.gen_range(-3.0..3.0));
        let lowers = &estimates - 1.0;
        let uppers = &estimates + 1.0;

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("MAUC", n), &n, |b, _| {
            b.iter(|| mauc(black_box(labels.view()), black_box(probabilities.view()), Some(3)))
        });
        group.bench_with_input(BenchmarkId::new("WES+CPA", n), &n, |b, _| {
            b.iter(|| {
                let wes = calculate_wes(
                    black_box(estimates.view()),
                    lowers.view(),
                    uppers.view(),
                    trues.view(),
                );
                let cpa = calculate_cpa(estimates.view(), lowers.view(), uppers.view(), trues.view());
                (wes, cpa)
            })
        });
    }
    group.finish();
}

fn synthetic_cohort(rng: &mut StdRng) -> VisitTable {
    let start = NaiveDate::from_ymd_opt(2005, 9, 1).unwrap();
    let mut records = Vec::with_capacity(NUM_SUBJECTS * VISITS_PER_SUBJECT);
    for rid in 0..NUM_SUBJECTS as i64 {
        let baseline_age = rng.gen_range(55.0..90.0);
        let baseline_score = rng.gen_range(5.0..40.0);
        let decline = rng.gen_range(0.0..4.0);
        for visit in 0..VISITS_PER_SUBJECT {
            let years = visit as f64 * 0.5;
            records.push(VisitRecord {
                rid,
                exam_date: start + Days::new((years * 365.25) as u64),
                age_at_exam: baseline_age + years,
                clinical_status: Some(ClinicalStatus::Mci),
                adas13: Some(baseline_score + decline * years),
                ventricles_icv: Some(0.02 + 0.0005 * years),
                in_cohort: true,
            });
        }
    }
    VisitTable::from_records(records)
}

fn benchmark_strategies(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(84);
    let table = synthetic_cohort(&mut rng);
    let mut group = c.benchmark_group("Cohort forecast");
    group.throughput(Throughput::Elements(NUM_SUBJECTS as u64));

    for strategy in [StrategyKind::Naive, StrategyKind::LinearTrend] {
        let config = ForecastConfig {
            strategy,
            ..ForecastConfig::default()
        };
        let pipeline = ForecastPipeline::from_config(&config).unwrap();
        group.bench_function(pipeline.strategy().name(), |b| {
            b.iter(|| pipeline.run_cohort(black_box(&table)))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_metrics, benchmark_strategies);
criterion_main!(benches);
