// src/ml/tree.rs
//! Decision trees shared by the forest and boosting models

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<f64>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fitted binary tree; leaves hold a value vector
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Leaf values reached by `sample`
    pub fn leaf(&self, sample: ArrayView1<f64>) -> &[f64] {
        let mut node = 0;
        loop {
            match self.nodes.get(node) {
                Some(Node::Leaf(value)) => return value,
                Some(Node::Split { feature, threshold, left, right }) => {
                    node = if sample[*feature] <= *threshold { *left } else { *right };
                }
                None => return &[],
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], node: usize) -> usize {
            match nodes.get(node) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf(_))).count()
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// Growth limits
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` = all
    pub max_features: Option<usize>,
}

/// Best threshold of one feature
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Candidate features of one node, drawn without replacement when limited
fn candidate_features(n_features: usize, params: &TreeParams, rng: &mut StdRng) -> Vec<usize> {
    match params.max_features {
        Some(m) if m < n_features => sample(rng, n_features, m.max(1)).into_vec(),
        _ => (0..n_features).collect(),
    }
}

/// Indices sorted by the value of one feature
fn sorted_by_feature(x: ArrayView2<f64>, indices: &[usize], feature: usize) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
    sorted
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

/// Gini-impurity classification tree over `indices` (duplicates allowed)
pub fn grow_classification_tree(
    x: ArrayView2<f64>,
    labels: &[usize],
    n_classes: usize,
    indices: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Tree {
    let mut tree = Tree::default();
    grow_classification_node(&mut tree, x, labels, n_classes, indices, params, rng, 0);
    tree
}

#[allow(clippy::too_many_arguments)]
fn grow_classification_node(
    tree: &mut Tree,
    x: ArrayView2<f64>,
    labels: &[usize],
    n_classes: usize,
    indices: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
    depth: usize,
) -> usize {
    let mut counts = vec![0.0; n_classes];
    for &i in indices {
        counts[labels[i]] += 1.0;
    }
    let total = indices.len() as f64;
    let impurity = gini(&counts, total);

    let leaf = |counts: &[f64]| Node::Leaf(counts.iter().map(|c| c / total.max(1.0)).collect());

    if depth >= params.max_depth || indices.len() < params.min_samples_split || impurity <= 0.0 {
        return tree.push(leaf(&counts));
    }

    let mut best: Option<SplitCandidate> = None;
    for feature in candidate_features(x.ncols(), params, rng) {
        let sorted = sorted_by_feature(x, indices, feature);
        let mut left = vec![0.0; n_classes];
        for pos in 0..sorted.len() - 1 {
            left[labels[sorted[pos]]] += 1.0;
            let here = x[[sorted[pos], feature]];
            let next = x[[sorted[pos + 1], feature]];
            if next <= here {
                continue;
            }
            let n_left = (pos + 1) as f64;
            let n_right = total - n_left;
            let right: Vec<f64> = counts.iter().zip(&left).map(|(c, l)| c - l).collect();
            let weighted = (n_left * gini(&left, n_left) + n_right * gini(&right, n_right)) / total;

            if best.as_ref().map_or(true, |b| weighted < b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    score: weighted,
                });
            }
        }
    }

    match best {
        Some(split) if split.score < impurity - 1e-12 => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, split.feature]] <= split.threshold);
            let node = tree.push(Node::Leaf(Vec::new()));
            let left = grow_classification_node(tree, x, labels, n_classes, &left_idx, params, rng, depth + 1);
            let right = grow_classification_node(tree, x, labels, n_classes, &right_idx, params, rng, depth + 1);
            tree.nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            node
        }
        _ => tree.push(leaf(&counts)),
    }
}

/// Second-order boosting tree parameters
#[derive(Debug, Clone, Copy)]
pub struct BoostingTreeParams {
    pub max_depth: usize,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
}

/// Regression tree on gradient statistics; leaves hold `[-G / (H + lambda)]`
pub fn grow_boosting_tree(
    x: ArrayView2<f64>,
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
    params: &BoostingTreeParams,
) -> Tree {
    let mut tree = Tree::default();
    grow_boosting_node(&mut tree, x, gradients, hessians, indices, params, 0);
    tree
}

fn grow_boosting_node(
    tree: &mut Tree,
    x: ArrayView2<f64>,
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
    params: &BoostingTreeParams,
    depth: usize,
) -> usize {
    let g: f64 = indices.iter().map(|&i| gradients[i]).sum();
    let h: f64 = indices.iter().map(|&i| hessians[i]).sum();
    let leaf = Node::Leaf(vec![-g / (h + params.lambda)]);

    if depth >= params.max_depth || indices.len() < 2 {
        return tree.push(leaf);
    }

    let parent_score = g * g / (h + params.lambda);
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..x.ncols() {
        let sorted = sorted_by_feature(x, indices, feature);
        let (mut gl, mut hl) = (0.0, 0.0);
        for pos in 0..sorted.len() - 1 {
            gl += gradients[sorted[pos]];
            hl += hessians[sorted[pos]];
            let here = x[[sorted[pos], feature]];
            let next = x[[sorted[pos + 1], feature]];
            if next <= here {
                continue;
            }
            let (gr, hr) = (g - gl, h - hl);
            if hl < params.min_child_weight || hr < params.min_child_weight {
                continue;
            }
            let gain = 0.5 * (gl * gl / (hl + params.lambda) + gr * gr / (hr + params.lambda) - parent_score);
            if best.as_ref().map_or(true, |b| gain > b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    score: gain,
                });
            }
        }
    }

    match best {
        Some(split) if split.score > 0.0 => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, split.feature]] <= split.threshold);
            let node = tree.push(Node::Leaf(Vec::new()));
            let left = grow_boosting_node(tree, x, gradients, hessians, &left_idx, params, depth + 1);
            let right = grow_boosting_node(tree, x, gradients, hessians, &right_idx, params, depth + 1);
            tree.nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            node
        }
        _ => tree.push(leaf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_classification_tree_separates_threshold() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [10.0, 0.0], [11.0, 0.0]];
        let labels = [0, 0, 0, 1, 1];
        let params = TreeParams { max_depth: 5, min_samples_split: 2, max_features: None };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = grow_classification_tree(x.view(), &labels, 2, &[0, 1, 2, 3, 4], &params, &mut rng);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.leaf(array![2.5, 0.0].view()), &[1.0, 0.0]);
        assert_eq!(tree.leaf(array![9.0, 0.0].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_depth_limit() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let labels = [0, 1, 0, 1];
        let params = TreeParams { max_depth: 1, min_samples_split: 2, max_features: None };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = grow_classification_tree(x.view(), &labels, 2, &[0, 1, 2, 3], &params, &mut rng);
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn test_boosting_leaf_weights() {
        let x = array![[0.0], [0.0], [1.0], [1.0]];
        let gradients = [1.0, 1.0, -1.0, -1.0];
        let hessians = [1.0; 4];
        let params = BoostingTreeParams { max_depth: 2, lambda: 1.0, min_child_weight: 1.0 };
        let tree = grow_boosting_tree(x.view(), &gradients, &hessians, &[0, 1, 2, 3], &params);

        assert!((tree.leaf(array![0.0].view())[0] - (-2.0 / 3.0)).abs() < 1e-12);
        assert!((tree.leaf(array![1.0].view())[0] - (2.0 / 3.0)).abs() < 1e-12);
    }
}
