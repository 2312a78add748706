//! C-support vector classifier backed by `linfa-svm`.

use super::params::{as_positive_f64, as_text, unknown};
use super::{Estimator, ParamSet, ParamValue, check_fit_input, check_predict_input, single_class};
use crate::error::{TrainingError, TrainingResult};
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

const SVC: &str = "SVC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Rbf,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamma {
    /// `1 / (n_features * X.var())`.
    Scale,
    /// `1 / n_features`.
    Auto,
    Value(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvcParams {
    pub c: f64,
    pub kernel: Kernel,
    pub gamma: Gamma,
    /// Stopping tolerance of the SMO solver.
    pub tol: f64,
    pub shrinking: bool,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self { c: 1.0, kernel: Kernel::Rbf, gamma: Gamma::Scale, tol: 1e-3, shrinking: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SvcClassifier {
    params: SvcParams,
    n_features: Option<usize>,
    constant: Option<f64>,
    /// Resolved RBF `gamma` of the last fit.
    gamma: Option<f64>,
    model: Option<Svm<f64, bool>>,
}

impl SvcClassifier {
    pub fn params(&self) -> &SvcParams {
        &self.params
    }

    pub fn fitted_gamma(&self) -> Option<f64> {
        self.gamma
    }

    pub fn n_support(&self) -> usize {
        self.model.as_ref().map_or(0, Svm::nsupport)
    }
}

fn resolve_gamma(gamma: Gamma, x: ArrayView2<'_, f64>) -> f64 {
    let n_features = x.ncols().max(1) as f64;
    match gamma {
        Gamma::Value(v) => v,
        Gamma::Auto => 1.0 / n_features,
        Gamma::Scale => {
            let var = x.var(0.0);
            if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 }
        }
    }
}

impl Estimator for SvcClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> TrainingResult<()> {
        check_fit_input(SVC, x, y)?;
        self.n_features = Some(x.ncols());
        self.model = None;
        self.gamma = None;
        self.constant = single_class(y);
        if self.constant.is_some() {
            return Ok(());
        }

        let targets: Array1<bool> = y.mapv(|v| v > 0.5);
        let dataset = Dataset::new(x.to_owned(), targets);
        let params = Svm::<f64, bool>::params()
            .pos_neg_weights(self.params.c, self.params.c)
            .eps(self.params.tol)
            .shrinking(self.params.shrinking);

        // linfa's gaussian kernel is exp(-|a - b|^2 / eps).
        let fitted = match self.params.kernel {
            Kernel::Linear => params.linear_kernel().fit(&dataset),
            Kernel::Rbf => {
                let gamma = resolve_gamma(self.params.gamma, x);
                self.gamma = Some(gamma);
                params.gaussian_kernel(1.0 / gamma).fit(&dataset)
            }
        };
        let svm = fitted.map_err(|e| TrainingError::invalid_params(SVC, format!("solver failed: {e}")))?;
        self.model = Some(svm);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array1<f64>> {
        check_predict_input(SVC, self.n_features, x)?;
        if let Some(class) = self.constant {
            return Ok(Array1::from_elem(x.nrows(), class));
        }
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| TrainingError::invalid_params(SVC, "model has not been fitted"))?;

        let positive: Array1<bool> = model.predict(&x);
        Ok(positive.mapv(|p| if p { 1.0 } else { 0.0 }))
    }

    fn set_params(&mut self, params: &ParamSet) -> TrainingResult<()> {
        let mut next = self.params.clone();
        for (name, value) in params {
            match name.as_str() {
                "C" | "c" => next.c = as_positive_f64(SVC, name, value)?,
                "kernel" => {
                    next.kernel = match as_text(SVC, name, value)? {
                        "rbf" => Kernel::Rbf,
                        "linear" => Kernel::Linear,
                        other => {
                            return Err(TrainingError::invalid_params(SVC, format!("unsupported kernel `{other}`")));
                        }
                    };
                }
                "gamma" => {
                    next.gamma = match value {
                        ParamValue::Text(t) if t == "scale" => Gamma::Scale,
                        ParamValue::Text(t) if t == "auto" => Gamma::Auto,
                        other => Gamma::Value(as_positive_f64(SVC, name, other)?),
                    };
                }
                "tol" => next.tol = as_positive_f64(SVC, name, value)?,
                "shrinking" => {
                    let ParamValue::Bool(flag) = value else {
                        return Err(TrainingError::invalid_params(SVC, format!("`{name}` expects a bool, got `{value}`")));
                    };
                    next.shrinking = *flag;
                }
                // Accepted for config compatibility; probabilities are never computed.
                "probability" => {
                    if !matches!(value, ParamValue::Bool(_)) {
                        return Err(TrainingError::invalid_params(SVC, format!("`{name}` expects a bool, got `{value}`")));
                    }
                }
                other => return Err(unknown(SVC, other)),
            }
        }
        self.params = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn text(name: &str, value: &str) -> (String, ParamValue) {
        (name.to_string(), ParamValue::Text(value.to_string()))
    }

    #[test]
    fn test_linear_kernel_separates_points() {
        let x = array![[-2.0, 0.0], [-1.5, 0.5], [-1.0, -0.5], [1.0, 0.5], [1.5, -0.5], [2.0, 0.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = SvcClassifier::default();
        model.set_params(&ParamSet::from([text("kernel", "linear")])).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), y);
        assert_eq!(model.predict(array![[-5.0, 0.0], [5.0, 0.0]].view()).unwrap(), array![0.0, 1.0]);
        assert!(model.fitted_gamma().is_none());
    }

    #[test]
    fn test_rbf_separates_clusters() {
        let x = array![[0.0, 0.0], [0.2, 0.1], [0.1, 0.3], [4.0, 4.0], [4.2, 3.9], [3.8, 4.1]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = SvcClassifier::default();
        model.set_params(&ParamSet::from([("C".to_string(), ParamValue::Int(10))])).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), y);
        assert!(model.n_support() > 0);
        assert!(model.fitted_gamma().is_some_and(|g| g > 0.0));
    }

    #[test]
    fn test_single_class_predicts_that_class() {
        let mut model = SvcClassifier::default();
        model.fit(array![[1.0], [2.0]].view(), array![1.0, 1.0].view()).unwrap();
        assert_eq!(model.predict(array![[-9.0]].view()).unwrap(), array![1.0]);
        assert_eq!(model.n_support(), 0);
    }

    #[test]
    fn test_gamma_scale_on_constant_input_is_one() {
        let x = array![[0.0, 0.0], [0.0, 0.0]];
        assert!((resolve_gamma(Gamma::Scale, x.view()) - 1.0).abs() < f64::EPSILON);
        assert!((resolve_gamma(Gamma::Auto, x.view()) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_unknown_kernel() {
        let mut model = SvcClassifier::default();
        let err = model.set_params(&ParamSet::from([text("kernel", "poly")])).unwrap_err();
        assert!(err.to_string().contains("poly"));
        assert_eq!(model.params(), &SvcParams::default());
    }
}
