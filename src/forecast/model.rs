//! Tree ensemble regressors and evaluation metrics

use rand::{Rng, SeedableRng};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::error::ModelError;

/// A fitted model that maps one feature row to a prediction
pub trait Regressor: Send + Sync {
    fn predict_one(&self, row: &[f64]) -> f64;

    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_one(r)).collect()
    }
}

/// Growth limits for a single tree
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// CART regression tree with squared-error splits
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &TreeConfig, rng: &mut ChaCha8Rng) -> Self {
        let indices: Vec<usize> = (0..y.len()).collect();
        Self::fit_indices(x, y, &indices, config, rng)
    }

    /// Fit on a subset of rows; indices may repeat (bootstrap samples)
    pub fn fit_indices(
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        config: &TreeConfig,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.first().map_or(0, |r| r.len());
        let root = grow(x, y, indices.to_vec(), 0, n_features, config, rng);
        Self { root }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

impl Regressor for RegressionTree {
    fn predict_one(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

fn grow(
    x: &[Vec<f64>],
    y: &[f64],
    indices: Vec<usize>,
    depth: usize,
    n_features: usize,
    config: &TreeConfig,
    rng: &mut ChaCha8Rng,
) -> Node {
    let leaf_value = indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len().max(1) as f64;
    if depth >= config.max_depth || indices.len() < config.min_samples_split || n_features == 0 {
        return Node::Leaf(leaf_value);
    }

    let mut features: Vec<usize> = (0..n_features).collect();
    if let Some(k) = config.max_features
        && k < n_features
    {
        features.shuffle(rng);
        features.truncate(k.max(1));
    }

    let Some(best) = best_split(x, y, &indices, &features, config.min_samples_leaf) else {
        return Node::Leaf(leaf_value);
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .into_iter()
        .partition(|&i| x[i][best.feature] <= best.threshold);

    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(grow(x, y, left, depth + 1, n_features, config, rng)),
        right: Box::new(grow(x, y, right, depth + 1, n_features, config, rng)),
    }
}

/// Split maximizing `sum_l^2/n_l + sum_r^2/n_r`, which minimizes child SSE.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;
    let min_leaf = min_leaf.max(1);

    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();
    for &feature in features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for pos in 0..n.saturating_sub(1) {
            left_sum += y[order[pos]];
            let left_n = pos + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let here = x[order[pos]][feature];
            let next = x[order[pos + 1]][feature];
            if here == next {
                continue;
            }
            let right_sum = total - left_sum;
            let score =
                left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            if score > parent_score + 1e-12 && best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    score,
                });
            }
        }
    }
    best
}

/// Random forest settings
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub tree: TreeConfig,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            tree: TreeConfig {
                max_depth: 8,
                ..TreeConfig::default()
            },
            seed: 42,
        }
    }
}

/// Bagged regression trees averaged at prediction time
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForestConfig) -> Result<Self, ModelError> {
        check_training_set(x, y)?;
        let n = y.len();
        let n_features = x[0].len();
        let mut tree_config = config.tree.clone();
        if tree_config.max_features.is_none() {
            tree_config.max_features = Some((n_features / 3).max(1));
        }

        let trees = (0..config.n_trees)
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit_indices(x, y, &sample, &tree_config, &mut rng)
            })
            .collect();
        Ok(Self { trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForest {
    fn predict_one(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_one(row)).sum::<f64>() / self.trees.len() as f64
    }
}

/// Gradient boosting settings
#[derive(Debug, Clone)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub tree: TreeConfig,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            tree: TreeConfig {
                max_depth: 3,
                min_samples_split: 2,
                min_samples_leaf: 1,
                max_features: None,
            },
            seed: 42,
        }
    }
}

/// Shallow trees fitted stagewise to squared-error residuals
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &BoostingConfig) -> Result<Self, ModelError> {
        check_training_set(x, y)?;
        let init = y.iter().sum::<f64>() / y.len() as f64;
        let mut current = vec![init; y.len()];
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree = RegressionTree::fit(x, &residuals, &config.tree, &mut rng);
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += config.learning_rate * tree.predict_one(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            init,
            learning_rate: config.learning_rate,
            trees,
        })
    }
}

impl Regressor for GradientBoosting {
    fn predict_one(&self, row: &[f64]) -> f64 {
        self.init
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict_one(row))
                .sum::<f64>()
    }
}

/// Equal-weight average of several regressors
pub struct Ensemble {
    members: Vec<Box<dyn Regressor>>,
}

impl Ensemble {
    pub fn new(members: Vec<Box<dyn Regressor>>) -> Self {
        Self { members }
    }

    /// Random forest and gradient boosting fitted on the same rows
    pub fn fit_default(x: &[Vec<f64>], y: &[f64]) -> Result<Self, ModelError> {
        let forest = RandomForest::fit(x, y, &ForestConfig::default())?;
        let boosting = GradientBoosting::fit(x, y, &BoostingConfig::default())?;
        Ok(Self::new(vec![Box::new(forest), Box::new(boosting)]))
    }
}

impl Regressor for Ensemble {
    fn predict_one(&self, row: &[f64]) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|m| m.predict_one(row)).sum::<f64>() / self.members.len() as f64
    }
}

fn check_training_set(x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
    if x.is_empty() || y.is_empty() {
        return Err(ModelError::Training("empty training set".to_string()));
    }
    if x.len() != y.len() {
        return Err(ModelError::Training(format!(
            "{} feature rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    Ok(())
}

/// Mean absolute percentage error in percent; rows with a zero actual are skipped.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let (sum, n) = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .fold((0.0, 0usize), |(s, n), (a, p)| (s + ((a - p) / a).abs(), n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 * 100.0 }
}

/// Coefficient of determination
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 5.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_tree_learns_step() {
        let (x, y) = step_data();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let tree = RegressionTree::fit(&x, &y, &TreeConfig::default(), &mut rng);

        assert_eq!(tree.predict_one(&[3.0, 0.0]), 1.0);
        assert_eq!(tree.predict_one(&[33.0, 0.0]), 5.0);
        // Pure children stop growing after the first split
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_tree_respects_max_depth() {
        let x: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..64).map(|i| (i as f64).sin()).collect();
        let config = TreeConfig {
            max_depth: 2,
            ..TreeConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = RegressionTree::fit(&x, &y, &config, &mut rng);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y = vec![2.5; 10];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, &TreeConfig::default(), &mut rng);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict_one(&[100.0]), 2.5);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 10,
            ..ForestConfig::default()
        };
        let a = RandomForest::fit(&x, &y, &config).unwrap();
        let b = RandomForest::fit(&x, &y, &config).unwrap();

        assert_eq!(a.n_trees(), 10);
        assert_eq!(a.predict(&x), b.predict(&x));
        assert!(a.predict_one(&[2.0, 1.0]) < 3.0);
        assert!(a.predict_one(&[38.0, 1.0]) > 3.0);
    }

    #[test]
    fn test_boosting_reduces_error() {
        let x: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64 / 10.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * r[0]).collect();

        let few = GradientBoosting::fit(
            &x,
            &y,
            &BoostingConfig {
                n_estimators: 2,
                ..BoostingConfig::default()
            },
        )
        .unwrap();
        let many = GradientBoosting::fit(&x, &y, &BoostingConfig::default()).unwrap();

        let mse = |m: &GradientBoosting| {
            m.predict(&x)
                .iter()
                .zip(&y)
                .map(|(p, t)| (p - t).powi(2))
                .sum::<f64>()
        };
        assert!(mse(&many) < mse(&few));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], &ForestConfig::default()).is_err());
        let err = GradientBoosting::fit(&[vec![1.0]], &[1.0, 2.0], &BoostingConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("1 feature rows but 2 targets"));
    }

    #[test]
    fn test_ensemble_averages_members() {
        struct Constant(f64);
        impl Regressor for Constant {
            fn predict_one(&self, _row: &[f64]) -> f64 {
                self.0
            }
        }
        let ensemble = Ensemble::new(vec![Box::new(Constant(1.0)), Box::new(Constant(3.0))]);
        assert_eq!(ensemble.predict_one(&[0.0]), 2.0);
    }

    #[test]
    fn test_metrics() {
        assert!((mape(&[100.0, 200.0], &[110.0, 180.0]) - 10.0).abs() < 1e-9);
        assert_eq!(mape(&[0.0], &[1.0]), 0.0);

        assert_eq!(r2(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert!((r2(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0])).abs() < 1e-12);
        assert_eq!(r2(&[4.0, 4.0], &[4.0, 4.0]), 1.0);
    }
}
