use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `features[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A CART regression tree, split on variance reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fits on the rows of `x`/`y` named by `sample`, which may repeat rows.
    pub fn fit(x: &[Vec<f64>], y: &[f64], sample: Vec<usize>, params: &TreeParams) -> Self {
        let mut tree = Self { nodes: vec![] };
        if sample.is_empty() {
            tree.nodes.push(Node::Leaf { value: 0.0 });
        } else {
            tree.build(x, y, sample, 0, params);
        }
        tree
    }

    fn build(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        mut rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        let min_leaf = params.min_samples_leaf.max(1);
        if depth >= params.max_depth || rows.len() < 2 * min_leaf {
            return id;
        }
        let Some((feature, threshold)) = best_split(x, y, &mut rows, min_leaf) else {
            return id;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| x[i][feature] <= threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }

        let left = self.build(x, y, left, depth + 1, params);
        let right = self.build(x, y, right, depth + 1, params);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if features[feature] <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], i: usize) -> usize {
            match nodes[i] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + depth_of(nodes, left).max(depth_of(nodes, right))
                }
            }
        }
        depth_of(&self.nodes, 0)
    }
}

/// The split minimizing the summed squared error of both sides, if any split improves on the
/// parent. Reorders `rows`.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    rows: &mut [usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total * total / n as f64;
    if parent_sse <= 1e-9 {
        return None;
    }

    let mut best: Option<(f64, usize, f64)> = None;
    for feature in 0..x[rows[0]].len() {
        rows.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let (mut sum, mut sum_sq) = (0.0, 0.0);
        for i in 1..n {
            let yi = y[rows[i - 1]];
            sum += yi;
            sum_sq += yi * yi;
            if i < min_leaf || n - i < min_leaf {
                continue;
            }
            let (lo, hi) = (x[rows[i - 1]][feature], x[rows[i]][feature]);
            if lo == hi {
                continue;
            }

            let (nl, nr) = (i as f64, (n - i) as f64);
            let sse = (sum_sq - sum * sum / nl)
                + ((total_sq - sum_sq) - (total - sum) * (total - sum) / nr);
            if best.map_or(true, |(b, _, _)| sse < b) {
                best = Some((sse, feature, lo + (hi - lo) / 2.0));
            }
        }
    }

    best.filter(|(sse, _, _)| *sse < parent_sse - 1e-9)
        .map(|(_, feature, threshold)| (feature, threshold))
}

/// Bagged regression trees; predicts the mean of its trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit<R: Rng>(
        x: &[Vec<f64>],
        y: &[f64],
        n_trees: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let n = x.len();
        let trees = (0..n_trees)
            .map(|_| {
                let sample = if n == 0 {
                    vec![]
                } else {
                    (0..n).map(|_| rng.random_range(0..n)).collect()
                };
                RegressionTree::fit(x, y, sample, params)
            })
            .collect();
        Self { trees }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    const PARAMS: TreeParams = TreeParams {
        max_depth: 8,
        min_samples_leaf: 1,
    };

    #[test]
    fn test_tree_learns_a_step() {
        let x = (0..10).map(|i| vec![i as f64]).collect::<Vec<_>>();
        let y = (0..10)
            .map(|i| if i < 5 { 10.0 } else { 20.0 })
            .collect::<Vec<_>>();
        let tree = RegressionTree::fit(&x, &y, (0..10).collect(), &PARAMS);

        assert_eq!(tree.predict(&[3.0]), 10.0);
        assert_eq!(tree.predict(&[7.0]), 20.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_tree_picks_the_informative_feature() {
        // Feature 0 is noise, feature 1 decides
        let x = (0..20)
            .map(|i| vec![(i * 7 % 5) as f64, (i % 2) as f64])
            .collect::<Vec<_>>();
        let y = x.iter().map(|r| 100.0 * r[1]).collect::<Vec<_>>();
        let tree = RegressionTree::fit(&x, &y, (0..20).collect(), &PARAMS);

        assert_eq!(tree.predict(&[3.0, 0.0]), 0.0);
        assert_eq!(tree.predict(&[3.0, 1.0]), 100.0);
    }

    #[test]
    fn test_constant_target_is_a_single_leaf() {
        let x = (0..5).map(|i| vec![i as f64]).collect::<Vec<_>>();
        let y = vec![42.0; 5];
        let tree = RegressionTree::fit(&x, &y, (0..5).collect(), &PARAMS);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(&[100.0]), 42.0);
    }

    #[test]
    fn test_min_samples_leaf_limits_splits() {
        let x = (0..4).map(|i| vec![i as f64]).collect::<Vec<_>>();
        let y = vec![1.0, 2.0, 3.0, 4.0];
        let params = TreeParams {
            max_depth: 8,
            min_samples_leaf: 3,
        };
        let tree = RegressionTree::fit(&x, &y, (0..4).collect(), &params);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(&[0.0]), 2.5);
    }

    #[test]
    fn test_forest_is_deterministic_for_a_seed() {
        let x = (0..50)
            .map(|i| vec![(i % 10) as f64, (i / 10) as f64])
            .collect::<Vec<_>>();
        let y = x.iter().map(|r| 3.0 * r[0] + r[1]).collect::<Vec<_>>();

        let a = RandomForest::fit(&x, &y, 10, &PARAMS, &mut StdRng::seed_from_u64(7));
        let b = RandomForest::fit(&x, &y, 10, &PARAMS, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.len(), 10);
        for row in &x {
            assert_eq!(a.predict(row), b.predict(row));
        }

        let error = x
            .iter()
            .zip(&y)
            .map(|(row, target)| (a.predict(row) - target).abs())
            .sum::<f64>()
            / x.len() as f64;
        assert!(error < 2.0, "{error}");
    }
}
