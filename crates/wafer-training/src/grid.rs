//! Exhaustive hyperparameter search with stratified k-fold cross validation.

use crate::error::{TrainingError, TrainingResult};
use crate::models::{Classifier, Estimator, ParamGrid, ParamSet, accuracy};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::debug;

pub const DEFAULT_CV_FOLDS: usize = 5;

/// Expand a grid into every parameter assignment, in sorted-key order.
pub fn expand_grid(grid: &ParamGrid) -> Vec<ParamSet> {
    let mut out = vec![ParamSet::new()];
    for (name, values) in grid {
        if values.is_empty() {
            continue;
        }
        let mut next = Vec::with_capacity(out.len() * values.len());
        for partial in &out {
            for value in values {
                let mut set = partial.clone();
                set.insert(name.clone(), value.clone());
                next.push(set);
            }
        }
        out = next;
    }
    out
}

/// Validation row indices per fold. Each class is dealt round-robin over the
/// folds in row order, so class proportions are kept without shuffling.
pub fn stratified_folds(y: ArrayView1<'_, f64>, n_folds: usize) -> TrainingResult<Vec<Vec<usize>>> {
    if n_folds < 2 {
        return Err(TrainingError::Config(format!("cross validation needs at least 2 folds, got {n_folds}")));
    }
    if y.len() < n_folds {
        return Err(TrainingError::Dataset(format!(
            "cannot split {} rows into {n_folds} folds",
            y.len()
        )));
    }

    let mut folds = vec![Vec::new(); n_folds];
    let mut seen_negative = 0;
    let mut seen_positive = 0;
    for (idx, label) in y.iter().enumerate() {
        let counter = if *label > 0.5 { &mut seen_positive } else { &mut seen_negative };
        folds[*counter % n_folds].push(idx);
        *counter += 1;
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Mean validation accuracy of `params` over the folds.
fn cross_validate(
    base: &Classifier,
    params: &ParamSet,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    folds: &[Vec<usize>],
) -> TrainingResult<f64> {
    let mut candidate = base.clone();
    candidate.set_params(params)?;

    let mut total = 0.0;
    for (k, validation) in folds.iter().enumerate() {
        let train: Vec<usize> =
            folds.iter().enumerate().filter(|(j, _)| *j != k).flat_map(|(_, f)| f.iter().copied()).collect();
        let mut model = candidate.clone();
        model.fit(x.select(Axis(0), &train).view(), y.select(Axis(0), &train).view())?;
        let predicted = model.predict(x.select(Axis(0), validation).view())?;
        let expected: Array1<f64> = y.select(Axis(0), validation);
        total += accuracy(expected.view(), predicted.view())?;
    }
    Ok(total / folds.len() as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchResult {
    pub best_params: ParamSet,
    pub best_score: f64,
    /// Mean CV score of every candidate that evaluated, in candidate order.
    pub scores: Vec<(ParamSet, f64)>,
}

#[derive(Debug, Clone, Copy)]
pub struct GridSearch {
    n_folds: usize,
}

impl Default for GridSearch {
    fn default() -> Self {
        Self { n_folds: DEFAULT_CV_FOLDS }
    }
}

impl GridSearch {
    #[must_use]
    pub fn new(n_folds: usize) -> Self {
        Self { n_folds }
    }

    /// Score every candidate of `grid` on `base`. An empty grid keeps the
    /// estimator's current parameters and performs no cross validation.
    pub fn search(
        &self,
        base: &Classifier,
        grid: &ParamGrid,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> TrainingResult<GridSearchResult> {
        let candidates = expand_grid(grid);
        if candidates.len() == 1 && candidates[0].is_empty() {
            return Ok(GridSearchResult { best_params: ParamSet::new(), best_score: f64::NAN, scores: Vec::new() });
        }

        let folds = stratified_folds(y, self.n_folds)?;
        let outcomes: Vec<TrainingResult<f64>> =
            candidates.par_iter().map(|params| cross_validate(base, params, x, y, &folds)).collect();

        let mut scores = Vec::with_capacity(candidates.len());
        for (params, outcome) in candidates.into_iter().zip(outcomes) {
            match outcome {
                Ok(score) => scores.push((params, score)),
                Err(err) => debug!(model = base.name(), ?params, error = %err, "grid candidate dropped"),
            }
        }

        let mut best: Option<&(ParamSet, f64)> = None;
        for entry in &scores {
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        let (best_params, best_score) = best
            .cloned()
            .ok_or_else(|| TrainingError::GridSearchFailed { model: base.name().to_string() })?;
        Ok(GridSearchResult { best_params, best_score, scores })
    }
}
