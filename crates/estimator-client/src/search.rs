//! Least-cost replica distribution search
//!
//! Given per-cluster cumulative cost curves, finds every way of splitting a
//! replica count across clusters whose total cost is minimal.
//!
//! `costs[c][k]` is the cost of running `k + 1` replicas on cluster `c`; running
//! zero replicas on a cluster costs nothing. `f64::INFINITY` (and NaN) marks a
//! replica count the cluster cannot take.

use crate::error::SearchError;

/// Upper bound on the number of optimal patterns returned.
pub const MAX_PATTERNS: usize = 1024;

const RELATIVE_TOLERANCE: f64 = 1e-9;

/// Minimal total cost and the patterns achieving it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastCostPatterns {
    /// Minimal total cost
    pub min_cost: f64,
    /// Replica count per cluster, one inner vector per optimal pattern.
    ///
    /// Ordered descending lexicographically by cluster index: the first pattern
    /// places as many replicas as possible on the earliest clusters.
    pub patterns: Vec<Vec<usize>>,
}

fn cost_of(costs: &[Vec<f64>], cluster: usize, replicas: usize) -> f64 {
    if replicas == 0 {
        return 0.0;
    }
    let c = costs[cluster][replicas - 1];
    if c.is_nan() { f64::INFINITY } else { c }
}

fn approx_eq(a: f64, b: f64) -> bool {
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    (a - b).abs() <= RELATIVE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Computes the minimal-cost distributions of `total` replicas over
/// `num_clusters` clusters.
///
/// # Errors
///
/// Returns [`SearchError`] when the matrix shape is wrong or no distribution
/// has a finite cost.
pub fn compute_least_cost_patterns(
    num_clusters: usize,
    total: usize,
    costs: &[Vec<f64>],
) -> Result<LeastCostPatterns, SearchError> {
    if costs.len() != num_clusters {
        return Err(SearchError::ClusterCountMismatch {
            expected: num_clusters,
            actual: costs.len(),
        });
    }
    for (cluster, row) in costs.iter().enumerate() {
        if row.len() < total {
            return Err(SearchError::RowTooShort {
                cluster,
                expected: total,
                actual: row.len(),
            });
        }
    }

    // best[i][r]: minimal cost of placing r replicas on clusters i..n
    let mut best = vec![vec![f64::INFINITY; total + 1]; num_clusters + 1];
    best[num_clusters][0] = 0.0;
    for i in (0..num_clusters).rev() {
        for r in 0..=total {
            best[i][r] = (0..=r)
                .map(|k| cost_of(costs, i, k) + best[i + 1][r - k])
                .fold(f64::INFINITY, f64::min);
        }
    }

    let min_cost = best[0][total];
    if min_cost.is_infinite() {
        return Err(SearchError::NoFinitePattern(total));
    }

    let mut patterns = Vec::new();
    let mut current = Vec::with_capacity(num_clusters);
    collect_patterns(costs, &best, 0, total, &mut current, &mut patterns);

    Ok(LeastCostPatterns { min_cost, patterns })
}

fn collect_patterns(
    costs: &[Vec<f64>],
    best: &[Vec<f64>],
    cluster: usize,
    remaining: usize,
    current: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if out.len() >= MAX_PATTERNS {
        return;
    }
    if cluster == costs.len() {
        if remaining == 0 {
            out.push(current.clone());
        }
        return;
    }
    for k in (0..=remaining).rev() {
        let rest = best[cluster + 1][remaining - k];
        let here = cost_of(costs, cluster, k);
        if rest.is_infinite() || here.is_infinite() {
            continue;
        }
        if approx_eq(here + rest, best[cluster][remaining]) {
            current.push(k);
            collect_patterns(costs, best, cluster + 1, remaining - k, current, out);
            current.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_cheaper_cluster() {
        // cluster 0 doubles in cost per replica, cluster 1 is flat
        let costs = vec![vec![1.0, 4.0, 9.0], vec![2.0, 4.0, 6.0]];
        let result = compute_least_cost_patterns(2, 3, &costs).expect("Should find a pattern");
        assert!((result.min_cost - 5.0).abs() < 1e-9);
        assert_eq!(result.patterns, vec![vec![1, 2]]);
    }

    #[test]
    fn test_infinite_cluster_gets_nothing() {
        let costs = vec![vec![f64::INFINITY; 2], vec![1.0, 2.0]];
        let result = compute_least_cost_patterns(2, 2, &costs).expect("Should find a pattern");
        assert_eq!(result.patterns, vec![vec![0, 2]]);
    }

    #[test]
    fn test_ties_ordered_descending() {
        let costs = vec![vec![1.0, 2.0], vec![1.0, 2.0]];
        let result = compute_least_cost_patterns(2, 2, &costs).expect("Should find a pattern");
        assert_eq!(result.patterns, vec![vec![2, 0], vec![1, 1], vec![0, 2]]);
    }

    #[test]
    fn test_zero_replicas() {
        let costs = vec![vec![], vec![]];
        let result = compute_least_cost_patterns(2, 0, &costs).expect("Should succeed");
        assert_eq!(result.min_cost, 0.0);
        assert_eq!(result.patterns, vec![vec![0, 0]]);
    }

    #[test]
    fn test_all_infinite_is_error() {
        let costs = vec![vec![f64::INFINITY], vec![f64::NAN]];
        assert_eq!(
            compute_least_cost_patterns(2, 1, &costs),
            Err(SearchError::NoFinitePattern(1))
        );
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            compute_least_cost_patterns(2, 1, &[vec![1.0]]),
            Err(SearchError::ClusterCountMismatch { .. })
        ));
        assert!(matches!(
            compute_least_cost_patterns(1, 2, &[vec![1.0]]),
            Err(SearchError::RowTooShort { cluster: 0, .. })
        ));
    }

    #[test]
    fn test_pattern_cap() {
        // 4 free clusters and 20 replicas give far more than MAX_PATTERNS ties
        let costs = vec![vec![0.0; 20]; 4];
        let result = compute_least_cost_patterns(4, 20, &costs).expect("Should succeed");
        assert_eq!(result.patterns.len(), MAX_PATTERNS);
        assert_eq!(result.patterns[0], vec![20, 0, 0, 0]);
    }
}
