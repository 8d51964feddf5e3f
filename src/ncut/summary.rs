//   Copyright 2025 normcut developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.

use std::fmt;

use average::{Max, Min, Variance};
use ndarray::{Array1, Array3};

use super::objective::objective;
use super::SolveError;
use crate::affinity::Affinity;

/// Statistics of the objective values of a batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectiveSummary {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    /// Sample standard deviation (zero for a single value)
    pub std: f64,
}

impl ObjectiveSummary {
    pub fn from_values(values: &Array1<f64>) -> ObjectiveSummary {
        let max: Max = values.iter().copied().collect();
        let min: Min = values.iter().copied().collect();
        let var: Variance = values.iter().copied().collect();

        let std = if values.len() > 1 {
            var.sample_variance().sqrt()
        } else {
            0.0
        };
        ObjectiveSummary {
            max: max.max(),
            min: min.min(),
            mean: var.mean(),
            std,
        }
    }

    /// Evaluates the objective of ``y`` and summarizes it over the batch.
    pub fn evaluate(affinity: &Affinity, y: &Array3<f64>) -> Result<ObjectiveSummary, SolveError> {
        Ok(Self::from_values(&objective(affinity, y)?))
    }
}

impl fmt::Display for ObjectiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "objective - max: {:.6}, min: {:.6}, mean: {:.6}, std: {:.6}",
            self.max, self.min, self.mean, self.std
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    pub fn test_summary() {
        let summary = ObjectiveSummary::from_values(&arr1(&[1.0, 2.0, 3.0, 4.0]));

        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.min, 1.0);
        assert_relative_eq!(summary.mean, 2.5);
        assert_relative_eq!(summary.std, (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    pub fn test_single_value() {
        let summary = ObjectiveSummary::from_values(&arr1(&[0.75]));

        assert_eq!(summary.max, 0.75);
        assert_eq!(summary.min, 0.75);
        assert_eq!(summary.std, 0.0);
        assert_eq!(
            summary.to_string(),
            "objective - max: 0.750000, min: 0.750000, mean: 0.750000, std: 0.000000"
        );
    }
}
