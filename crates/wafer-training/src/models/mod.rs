//! Binary classifiers competing for the wafer model slot.
//!
//! Every candidate implements [`Estimator`] over a dense `f64` feature matrix
//! and labels in `{0, 1}`. [`Classifier`] is the closed set the trainer
//! evaluates and the serialized form written to `model.pkl`.

mod boosting;
mod forest;
mod params;
mod svc;
mod tree;

pub use boosting::{GradientBoostingClassifier, GradientBoostingParams, XgbClassifier, XgbParams};
pub use forest::{MaxFeatures, RandomForestClassifier, RandomForestParams};
pub use params::{ParamGrid, ParamSet, ParamValue};
pub use svc::{Gamma, Kernel, SvcClassifier, SvcParams};
pub use tree::DecisionTree;

use crate::error::{TrainingError, TrainingResult};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub trait Estimator: Send + Sync {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()>;

    /// Predicted classes, one per row.
    fn predict(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array1<f64>>;

    /// Apply a parameter assignment. On error the estimator is unchanged.
    fn set_params(&mut self, params: &ParamSet) -> TrainingResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    Xgb,
    GradientBoosting,
    Svc,
    RandomForest,
}

impl ModelKind {
    /// Candidates in evaluation order.
    pub const ALL: [Self; 4] = [Self::Xgb, Self::GradientBoosting, Self::Svc, Self::RandomForest];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Xgb => "XGBClassifier",
            Self::GradientBoosting => "GradientBoostingClassifier",
            Self::Svc => "SVC",
            Self::RandomForest => "RandomForestClassifier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    Xgb(XgbClassifier),
    GradientBoosting(GradientBoostingClassifier),
    Svc(SvcClassifier),
    RandomForest(RandomForestClassifier),
}

impl Classifier {
    /// Unfitted classifier with default parameters.
    pub fn new(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Xgb => Self::Xgb(XgbClassifier::default()),
            ModelKind::GradientBoosting => Self::GradientBoosting(GradientBoostingClassifier::default()),
            ModelKind::Svc => Self::Svc(SvcClassifier::default()),
            ModelKind::RandomForest => Self::RandomForest(RandomForestClassifier::default()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Xgb(_) => ModelKind::Xgb,
            Self::GradientBoosting(_) => ModelKind::GradientBoosting,
            Self::Svc(_) => ModelKind::Svc,
            Self::RandomForest(_) => ModelKind::RandomForest,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn inner(&self) -> &dyn Estimator {
        match self {
            Self::Xgb(m) => m,
            Self::GradientBoosting(m) => m,
            Self::Svc(m) => m,
            Self::RandomForest(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Estimator {
        match self {
            Self::Xgb(m) => m,
            Self::GradientBoosting(m) => m,
            Self::Svc(m) => m,
            Self::RandomForest(m) => m,
        }
    }
}

impl Estimator for Classifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array1<f64>> {
        self.inner().predict(x)
    }

    fn set_params(&mut self, params: &ParamSet) -> TrainingResult<()> {
        self.inner_mut().set_params(params)
    }
}

/// Fraction of positions where `predicted` equals `expected`.
pub fn accuracy(expected: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> TrainingResult<f64> {
    if expected.len() != predicted.len() {
        return Err(TrainingError::Dataset(format!(
            "cannot score {} predictions against {} labels",
            predicted.len(),
            expected.len()
        )));
    }
    if expected.is_empty() {
        return Err(TrainingError::Dataset("cannot score an empty label set".to_string()));
    }
    let hits = expected.iter().zip(predicted.iter()).filter(|(a, b)| (*a - *b).abs() < 0.5).count();
    let score = hits as f64 / expected.len() as f64;
    Ok(score)
}

pub(crate) fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// The label when every entry of `y` is the same class.
pub(crate) fn single_class(y: ArrayView1<'_, f64>) -> Option<f64> {
    let first = *y.first()?;
    y.iter().all(|v| *v == first).then_some(first)
}

pub(crate) fn check_fit_input(model: &str, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(TrainingError::Dataset(format!("{model}: cannot fit on an empty matrix")));
    }
    if x.nrows() != y.len() {
        return Err(TrainingError::Dataset(format!(
            "{model}: {} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if let Some(bad) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(TrainingError::Dataset(format!("{model}: labels must be 0 or 1, found {bad}")));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(TrainingError::Dataset(format!("{model}: features contain non-finite values")));
    }
    Ok(())
}

pub(crate) fn check_predict_input(model: &str, fitted: Option<usize>, x: ArrayView2<'_, f64>) -> TrainingResult<()> {
    let Some(n_features) = fitted else {
        return Err(TrainingError::invalid_params(model, "model has not been fitted"));
    };
    if x.ncols() != n_features {
        return Err(TrainingError::SchemaMismatch {
            expected: n_features,
            found: x.ncols(),
            context: format!("{model} was fitted on a different feature count"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kind_names_and_order() {
        let names: Vec<_> = ModelKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, ["XGBClassifier", "GradientBoostingClassifier", "SVC", "RandomForestClassifier"]);
        assert_eq!(ModelKind::from_name("SVC"), Some(ModelKind::Svc));
        assert_eq!(ModelKind::from_name("LogisticRegression"), None);
    }

    #[test]
    fn test_accuracy() {
        let acc = accuracy(array![1.0, 0.0, 1.0, 1.0].view(), array![1.0, 1.0, 1.0, 0.0].view()).unwrap();
        assert!((acc - 0.5).abs() < f64::EPSILON);
        assert!(accuracy(array![1.0].view(), array![1.0, 0.0].view()).is_err());
    }

    #[test]
    fn test_fit_rejects_non_binary_labels() {
        let mut model = Classifier::new(ModelKind::RandomForest);
        let err = model.fit(array![[1.0], [2.0]].view(), array![-1.0, 1.0].view()).unwrap_err();
        assert!(matches!(err, TrainingError::Dataset(_)));
    }

    #[test]
    fn test_predict_checks_feature_count() {
        let mut model = Classifier::new(ModelKind::GradientBoosting);
        model.fit(array![[0.0, 1.0], [1.0, 0.0]].view(), array![0.0, 1.0].view()).unwrap();
        let err = model.predict(array![[0.0]].view()).unwrap_err();
        assert!(matches!(err, TrainingError::SchemaMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_every_kind_fits_and_round_trips_through_bincode() {
        let x = array![[0.0, 0.0], [0.1, 0.2], [3.0, 3.0], [3.1, 2.9]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        for kind in ModelKind::ALL {
            let mut model = Classifier::new(kind);
            model.fit(x.view(), y.view()).unwrap();
            assert_eq!(model.kind(), kind);

            let bytes = bincode::serde::encode_to_vec(&model, bincode::config::standard()).unwrap();
            let (back, _): (Classifier, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
            assert_eq!(back.predict(x.view()).unwrap(), model.predict(x.view()).unwrap());
        }
    }
}
