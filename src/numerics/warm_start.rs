use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Where the online solve starts. The per-problem default comes from
/// [`Problem::default_warm_start`](crate::physics::Problem::default_warm_start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmStart {
    /// Projection of the sample closest in plain Euclidean distance.
    Nearest,
    /// Same, with each parameter divided by the width of its design range.
    NearestScaled,
    /// Projection of the reference field of each query, when one is known
    /// (see [`PodGalerkin::solve_queries`](super::PodGalerkin::solve_queries)).
    /// Queries without a reference use the scaled nearest sample.
    Provided,
}

/// What to do when the first solve fails. Retrying is opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Report the failure as is.
    #[default]
    None,
    /// Restart from the projections of the next closest samples.
    NextNearest { attempts: usize },
    /// Walk from the closest sample to the query in equal parameter steps,
    /// each solve starting from the previous solution.
    Continuation { steps: usize },
}

/// Sample indices ordered by distance to `alpha`, closest first. Ties keep the
/// lower index first.
pub fn ranked_samples(
    parameters: &DMatrix<f64>,
    alpha: &DVector<f64>,
    scale: Option<&DVector<f64>>,
) -> Vec<usize> {
    let distances: Vec<f64> = (0..parameters.nrows())
        .map(|s| {
            (0..alpha.len())
                .map(|p| {
                    let d = alpha[p] - parameters[(s, p)];
                    let d = scale.map_or(d, |w| d / w[p]);
                    d * d
                })
                .sum::<f64>()
        })
        .collect();
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order
}

/// `steps` parameter vectors from `start` (excluded) to `end` (included).
pub fn continuation_path(start: &DVector<f64>, end: &DVector<f64>, steps: usize) -> Vec<DVector<f64>> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|s| {
            let t = s as f64 / steps as f64;
            start + (end - start) * t
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_changes_the_nearest_sample() {
        // Ra spans 1e4..1e5, θ spans 45..90: unscaled distance is all Ra
        let params = DMatrix::from_row_slice(2, 2, &[1.0e4, 90.0, 1.2e4, 45.0]);
        let alpha = DVector::from_vec(vec![1.1e4, 88.0]);
        let width = DVector::from_vec(vec![9.0e4, 45.0]);

        assert_eq!(ranked_samples(&params, &alpha, None)[0], 0);
        let alpha = DVector::from_vec(vec![1.15e4, 80.0]);
        assert_eq!(ranked_samples(&params, &alpha, None)[0], 1);
        assert_eq!(ranked_samples(&params, &alpha, Some(&width))[0], 0);
    }

    #[test]
    fn path_ends_at_query() {
        let start = DVector::from_vec(vec![0.0, 10.0]);
        let end = DVector::from_vec(vec![1.0, 20.0]);
        let path = continuation_path(&start, &end, 4);
        assert_eq!(path.len(), 4);
        assert_eq!(path[0].as_slice(), &[0.25, 12.5]);
        assert_eq!(path[3], end);
    }

    #[test]
    fn fallback_config_is_tagged() {
        let policy: FallbackPolicy = serde_json::from_str(r#"{"kind":"continuation","steps":5}"#).unwrap();
        assert_eq!(policy, FallbackPolicy::Continuation { steps: 5 });
        assert_eq!(FallbackPolicy::default(), FallbackPolicy::None);
    }
}
