use ndarray::{Array1, Array2};
use ndarray_linalg::LeastSquaresSvd;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("Ages and values have different lengths ({ages} vs {values}).")]
    LengthMismatch { ages: usize, values: usize },
    #[error("A line needs at least 2 points, found {0}.")]
    TooFewPoints(usize),
    #[error("The points do not determine a line (every point has the same age).")]
    RankDeficient,
    #[error("Least-squares solve failed: {0}")]
    Solver(String),
}

/// A first-order polynomial in age, stored around the mean of the fitted ages
/// so the design matrix stays well conditioned for ages near 70.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineFit {
    pub slope: f64,
    /// Value of the line at `center`.
    pub level: f64,
    pub center: f64,
}

impl AffineFit {
    /// Ordinary least-squares line through `(ages[i], values[i])`.
    pub fn fit(ages: &[f64], values: &[f64]) -> Result<Self, FitError> {
        if ages.len() != values.len() {
            return Err(FitError::LengthMismatch {
                ages: ages.len(),
                values: values.len(),
            });
        }
        let n = ages.len();
        if n < 2 {
            return Err(FitError::TooFewPoints(n));
        }

        let center = ages.iter().sum::<f64>() / n as f64;
        let design = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 { ages[i] - center } else { 1.0 }
        });
        let rhs = Array1::from_vec(values.to_vec());

        let solved = design
            .least_squares(&rhs)
            .map_err(|e| FitError::Solver(e.to_string()))?;
        if solved.rank < 2 {
            return Err(FitError::RankDeficient);
        }

        let coefficients = solved.solution;
        Ok(Self {
            slope: coefficients[0],
            level: coefficients[1],
            center,
        })
    }

    pub fn evaluate(&self, age: f64) -> f64 {
        self.level + self.slope * (age - self.center)
    }
}
