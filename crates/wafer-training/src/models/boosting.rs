//! Gradient-boosted tree ensembles for binary classification.

use super::params::{as_f64, as_fraction, as_opt_usize, as_positive_f64, as_u64, as_usize, unknown};
use super::tree::{DecisionTree, TreeParams};
use super::{Estimator, ParamSet, check_fit_input, check_predict_input, single_class, sigmoid};
use crate::error::{TrainingError, TrainingResult};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const XGB: &str = "XGBClassifier";
const GBC: &str = "GradientBoostingClassifier";

/// Rows drawn without replacement when `fraction < 1`.
fn subsample_rows(n: usize, fraction: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64) * fraction).round().max(1.0) as usize;
    let mut rows = sample(rng, n, k.min(n)).into_vec();
    rows.sort_unstable();
    rows
}

fn margins(trees: &[DecisionTree], base: f64, scale: f64, x: ArrayView2<'_, f64>) -> Array1<f64> {
    Array1::from_iter(x.rows().into_iter().map(|row| {
        base + trees.iter().map(|t| scale * t.predict_row(row)).sum::<f64>()
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgbParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for XgbParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 0,
        }
    }
}

/// Second-order boosting on the logistic loss with a regularized leaf objective.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct XgbClassifier {
    params: XgbParams,
    n_features: Option<usize>,
    constant: Option<f64>,
    trees: Vec<DecisionTree>,
}

impl XgbClassifier {
    pub fn params(&self) -> &XgbParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for XgbClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()> {
        check_fit_input(XGB, x, y)?;
        let p = &self.params;
        self.n_features = Some(x.ncols());
        self.trees.clear();
        self.constant = single_class(y);
        if self.constant.is_some() {
            return Ok(());
        }

        let n = x.nrows();
        let mut rng = ChaCha8Rng::seed_from_u64(p.random_state);
        let tree_params = TreeParams {
            max_depth: Some(p.max_depth),
            min_samples_split: 2,
            min_child_weight: p.min_child_weight,
            lambda: p.reg_lambda,
            gamma: p.gamma,
            max_features: None,
        };
        let mut margin = Array1::<f64>::zeros(n);
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        for _ in 0..p.n_estimators {
            for i in 0..n {
                let prob = sigmoid(margin[i]);
                grad[i] = prob - y[i];
                hess[i] = (prob * (1.0 - prob)).max(1e-16);
            }
            let rows = subsample_rows(n, p.subsample, &mut rng);
            let features = subsample_rows(x.ncols(), p.colsample_bytree, &mut rng);
            let tree = DecisionTree::fit(x, &grad, &hess, &rows, &features, tree_params, &mut rng);
            for (i, row) in x.rows().into_iter().enumerate() {
                margin[i] += p.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array1<f64>> {
        check_predict_input(XGB, self.n_features, x)?;
        if let Some(class) = self.constant {
            return Ok(Array1::from_elem(x.nrows(), class));
        }
        let m = margins(&self.trees, 0.0, self.params.learning_rate, x);
        Ok(m.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }))
    }

    fn set_params(&mut self, params: &ParamSet) -> TrainingResult<()> {
        let mut next = self.params.clone();
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => next.n_estimators = as_usize(XGB, name, value)?,
                "learning_rate" | "eta" => next.learning_rate = as_positive_f64(XGB, name, value)?,
                "max_depth" => next.max_depth = as_usize(XGB, name, value)?,
                "min_child_weight" => next.min_child_weight = as_f64(XGB, name, value)?.max(0.0),
                "reg_lambda" | "lambda" => next.reg_lambda = as_f64(XGB, name, value)?.max(0.0),
                "gamma" => next.gamma = as_f64(XGB, name, value)?.max(0.0),
                "subsample" => next.subsample = as_fraction(XGB, name, value)?,
                "colsample_bytree" => next.colsample_bytree = as_fraction(XGB, name, value)?,
                "random_state" | "seed" => next.random_state = as_u64(XGB, name, value)?,
                other => return Err(unknown(XGB, other)),
            }
        }
        self.params = next;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: 0,
        }
    }
}

/// First-order boosting of regression trees on log-loss residuals,
/// with Newton-step leaf values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: GradientBoostingParams,
    n_features: Option<usize>,
    constant: Option<f64>,
    init_margin: f64,
    trees: Vec<DecisionTree>,
}

impl GradientBoostingClassifier {
    pub fn params(&self) -> &GradientBoostingParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for GradientBoostingClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()> {
        check_fit_input(GBC, x, y)?;
        let p = &self.params;
        self.n_features = Some(x.ncols());
        self.trees.clear();
        self.constant = single_class(y);
        if self.constant.is_some() {
            return Ok(());
        }

        let n = x.nrows();
        let positive = y.sum() / n as f64;
        self.init_margin = (positive / (1.0 - positive)).ln();

        let mut rng = ChaCha8Rng::seed_from_u64(p.random_state);
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_split: p.min_samples_split,
            min_child_weight: p.min_samples_leaf as f64,
            lambda: 0.0,
            gamma: 0.0,
            max_features: None,
        };
        let features: Vec<usize> = (0..x.ncols()).collect();
        let hess = vec![1.0; n];
        let mut margin = Array1::from_elem(n, self.init_margin);
        let mut grad = vec![0.0; n];

        for _ in 0..p.n_estimators {
            let prob: Vec<f64> = margin.iter().map(|m| sigmoid(*m)).collect();
            for i in 0..n {
                grad[i] = prob[i] - y[i];
            }
            let rows = subsample_rows(n, p.subsample, &mut rng);
            let mut tree = DecisionTree::fit(x, &grad, &hess, &rows, &features, tree_params, &mut rng);

            // Replace mean-residual leaves with one Newton step on the log-loss.
            let mut leaf_stats: std::collections::BTreeMap<usize, (f64, f64)> = std::collections::BTreeMap::new();
            for &r in &rows {
                let entry = leaf_stats.entry(tree.leaf_index(x.row(r))).or_insert((0.0, 0.0));
                entry.0 += y[r] - prob[r];
                entry.1 += prob[r] * (1.0 - prob[r]);
            }
            for (leaf, (num, den)) in leaf_stats {
                tree.set_leaf_value(leaf, if den.abs() < 1e-12 { 0.0 } else { num / den });
            }

            for (i, row) in x.rows().into_iter().enumerate() {
                margin[i] += p.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array1<f64>> {
        check_predict_input(GBC, self.n_features, x)?;
        if let Some(class) = self.constant {
            return Ok(Array1::from_elem(x.nrows(), class));
        }
        let m = margins(&self.trees, self.init_margin, self.params.learning_rate, x);
        Ok(m.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }))
    }

    fn set_params(&mut self, params: &ParamSet) -> TrainingResult<()> {
        let mut next = self.params.clone();
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => next.n_estimators = as_usize(GBC, name, value)?,
                "learning_rate" => next.learning_rate = as_positive_f64(GBC, name, value)?,
                "max_depth" => next.max_depth = as_opt_usize(GBC, name, value)?,
                "min_samples_split" => next.min_samples_split = as_usize(GBC, name, value)?.max(2),
                "min_samples_leaf" => next.min_samples_leaf = as_usize(GBC, name, value)?.max(1),
                "subsample" => next.subsample = as_fraction(GBC, name, value)?,
                "random_state" => next.random_state = as_u64(GBC, name, value)?,
                "loss" if matches!(value, super::ParamValue::Text(t) if t == "log_loss" || t == "deviance") => {}
                other => return Err(unknown(GBC, other)),
            }
        }
        if next.n_estimators == 0 {
            return Err(TrainingError::invalid_params(GBC, "`n_estimators` must be >= 1"));
        }
        self.params = next;
        Ok(())
    }
}
