use super::params::{as_opt_usize, as_text, as_u64, as_usize, unknown};
use super::tree::{DecisionTree, TreeParams};
use super::{Estimator, ParamSet, ParamValue, check_fit_input, check_predict_input, single_class};
use crate::error::{TrainingError, TrainingResult};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const RF: &str = "RandomForestClassifier";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            Self::Sqrt => (n_features as f64).sqrt() as usize,
            Self::Log2 => (n_features as f64).log2() as usize,
            Self::All => n_features,
            Self::Count(k) => k,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 0,
        }
    }
}

/// Bagged decision trees voting by mean leaf probability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: RandomForestParams,
    n_features: Option<usize>,
    constant: Option<f64>,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for RandomForestClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()> {
        check_fit_input(RF, x, y)?;
        self.n_features = Some(x.ncols());
        self.trees.clear();
        self.constant = single_class(y);
        if self.constant.is_some() {
            return Ok(());
        }

        let p = &self.params;
        let n = x.nrows();
        // Labels as negative gradients with unit hessians make leaves hold the class-1 fraction.
        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; n];
        let features: Vec<usize> = (0..x.ncols()).collect();
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_split: p.min_samples_split,
            min_child_weight: p.min_samples_leaf as f64,
            lambda: 0.0,
            gamma: 0.0,
            max_features: Some(p.max_features.resolve(x.ncols())),
        };

        let trees: Vec<DecisionTree> = (0..p.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(p.random_state.wrapping_add(t as u64));
                let rows: Vec<usize> =
                    if p.bootstrap { (0..n).map(|_| rng.gen_range(0..n)).collect() } else { (0..n).collect() };
                DecisionTree::fit(x, &grad, &hess, &rows, &features, tree_params, &mut rng)
            })
            .collect();
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array1<f64>> {
        check_predict_input(RF, self.n_features, x)?;
        if let Some(class) = self.constant {
            return Ok(Array1::from_elem(x.nrows(), class));
        }
        let n_trees = self.trees.len().max(1) as f64;
        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            let mean = self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees;
            if mean > 0.5 { 1.0 } else { 0.0 }
        })))
    }

    fn set_params(&mut self, params: &ParamSet) -> TrainingResult<()> {
        let mut next = self.params.clone();
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => next.n_estimators = as_usize(RF, name, value)?,
                "max_depth" => next.max_depth = as_opt_usize(RF, name, value)?,
                "min_samples_split" => next.min_samples_split = as_usize(RF, name, value)?.max(2),
                "min_samples_leaf" => next.min_samples_leaf = as_usize(RF, name, value)?.max(1),
                "max_features" => {
                    next.max_features = match value {
                        ParamValue::Int(_) => MaxFeatures::Count(as_usize(RF, name, value)?),
                        _ => match as_text(RF, name, value)? {
                            "sqrt" | "auto" => MaxFeatures::Sqrt,
                            "log2" => MaxFeatures::Log2,
                            "none" | "None" => MaxFeatures::All,
                            other => {
                                return Err(TrainingError::invalid_params(
                                    RF,
                                    format!("unsupported max_features `{other}`"),
                                ));
                            }
                        },
                    };
                }
                "criterion" => {
                    let criterion = as_text(RF, name, value)?;
                    if !matches!(criterion, "gini" | "entropy" | "squared_error") {
                        return Err(TrainingError::invalid_params(RF, format!("unsupported criterion `{criterion}`")));
                    }
                }
                "bootstrap" => {
                    next.bootstrap = match value {
                        ParamValue::Bool(b) => *b,
                        other => {
                            return Err(TrainingError::invalid_params(RF, format!("`{name}` expects a bool, got `{other}`")));
                        }
                    };
                }
                "random_state" => next.random_state = as_u64(RF, name, value)?,
                other => return Err(unknown(RF, other)),
            }
        }
        if next.n_estimators == 0 {
            return Err(TrainingError::invalid_params(RF, "`n_estimators` must be >= 1"));
        }
        self.params = next;
        Ok(())
    }
}
