//! Regression tree grown on per-row gradient statistics.
//!
//! Leaves hold `-G / (H + lambda)` for the rows that reach them. Feeding
//! `g = -y, h = 1, lambda = 0` grows a variance-reduction tree over the labels
//! (random forest); feeding logistic gradients grows a boosting stage.

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f64,
    pub lambda: f64,
    pub gamma: f64,
    /// Features drawn per split from the candidate pool; `None` uses the whole pool.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_child_weight: 1.0,
            lambda: 0.0,
            gamma: 0.0,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

/// Gradient statistics shared by every node of one fit.
struct GrowContext<'a> {
    x: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: TreeParams,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    /// Grow a tree over `rows` (duplicates allowed, as in a bootstrap sample),
    /// splitting only on `features`.
    pub(crate) fn fit(
        x: ArrayView2<'_, f64>,
        grad: &[f64],
        hess: &[f64],
        rows: &[usize],
        features: &[usize],
        params: TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let ctx = GrowContext { x: x.reborrow(), grad, hess, features, params };
        let mut tree = Self { nodes: Vec::new() };
        let mut rows = rows.to_vec();
        tree.grow(&ctx, &mut rows, 0, rng);
        tree
    }

    fn grow(&mut self, ctx: &GrowContext<'_>, rows: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let (g, h) = sums(ctx, rows);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: leaf_value(g, h, ctx.params.lambda) });

        let depth_ok = ctx.params.max_depth.is_none_or(|max| depth < max);
        if !depth_ok || rows.len() < ctx.params.min_samples_split.max(2) {
            return id;
        }
        let Some(best) = best_split(ctx, rows, g, h, rng) else {
            return id;
        };

        let mid = partition(rows, |r| ctx.x[[r, best.feature]] <= best.threshold);
        if mid == 0 || mid == rows.len() {
            return id;
        }
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(ctx, left_rows, depth + 1, rng);
        let right = self.grow(ctx, right_rows, depth + 1, rng);
        self.nodes[id] = Node::Split { feature: best.feature, threshold: best.threshold, left, right };
        id
    }

    /// Index of the leaf node `row` falls into.
    pub(crate) fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match &self.nodes[self.leaf_index(row)] {
            Node::Leaf { value } => *value,
            Node::Split { .. } => 0.0,
        }
    }

    /// Overwrite the value of a leaf returned by [`Self::leaf_index`].
    pub(crate) fn set_leaf_value(&mut self, idx: usize, value: f64) {
        if let Some(Node::Leaf { value: v }) = self.nodes.get_mut(idx) {
            *v = value;
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}

fn sums(ctx: &GrowContext<'_>, rows: &[usize]) -> (f64, f64) {
    rows.iter().fold((0.0, 0.0), |(g, h), &r| (g + ctx.grad[r], h + ctx.hess[r]))
}

fn leaf_value(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom.abs() < f64::EPSILON { 0.0 } else { -g / denom }
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom.abs() < f64::EPSILON { 0.0 } else { g * g / denom }
}

fn best_split(
    ctx: &GrowContext<'_>,
    rows: &[usize],
    g_total: f64,
    h_total: f64,
    rng: &mut ChaCha8Rng,
) -> Option<BestSplit> {
    // Constant columns do not count toward the per-split feature budget.
    let mut order = ctx.features.to_vec();
    let budget = ctx.params.max_features.map_or(order.len(), |k| k.clamp(1, order.len().max(1)));
    if budget < order.len() {
        order.shuffle(rng);
    }
    let mut visited = 0;

    let lambda = ctx.params.lambda;
    let parent = score(g_total, h_total, lambda);
    let mut best: Option<BestSplit> = None;
    let mut column: Vec<(f64, f64, f64)> = Vec::with_capacity(rows.len());

    for feature in order {
        if visited >= budget {
            break;
        }
        column.clear();
        column.extend(rows.iter().map(|&r| (ctx.x[[r, feature]], ctx.grad[r], ctx.hess[r])));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));
        if column.first().map(|c| c.0) == column.last().map(|c| c.0) {
            continue;
        }
        visited += 1;

        let (mut g_left, mut h_left) = (0.0, 0.0);
        for i in 0..column.len() - 1 {
            g_left += column[i].1;
            h_left += column[i].2;
            if column[i].0 == column[i + 1].0 {
                continue;
            }
            let (g_right, h_right) = (g_total - g_left, h_total - h_left);
            if h_left < ctx.params.min_child_weight || h_right < ctx.params.min_child_weight {
                continue;
            }
            let gain =
                0.5 * (score(g_left, h_left, lambda) + score(g_right, h_right, lambda) - parent) - ctx.params.gamma;
            if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(BestSplit { feature, threshold: 0.5 * (column[i].0 + column[i + 1].0), gain });
            }
        }
    }
    best
}

/// Reorder `rows` so that every element satisfying `pred` comes first; returns the split point.
fn partition<F: Fn(usize) -> bool>(rows: &mut [usize], pred: F) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
