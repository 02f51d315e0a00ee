// model-lifecycle-rs/src/evaluation.rs
// Validation metrics and the deterministic train/validation split.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::model::{ModelMetrics, TrainingSample};

/// Shuffle with a fixed seed and split off `validation_fraction` of the
/// samples (rounded up, at least one when there are two or more samples).
pub fn train_validation_split(
    samples: &[TrainingSample],
    validation_fraction: f64,
    seed: u64,
) -> (Vec<TrainingSample>, Vec<TrainingSample>) {
    let mut shuffled = samples.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let fraction = validation_fraction.clamp(0.0, 1.0);
    // Guard against float noise such as 60 * 0.2 = 12.000000000000002.
    let mut n_val = (shuffled.len() as f64 * fraction - 1e-9).ceil().max(0.0) as usize;
    if shuffled.len() >= 2 {
        n_val = n_val.clamp(1, shuffled.len() - 1);
    }

    let validation = shuffled.split_off(shuffled.len() - n_val.min(shuffled.len()));
    (shuffled, validation)
}

/// Accuracy plus support-weighted precision, recall and F1.
///
/// Returns `None` when the slices differ in length or are empty.
pub fn evaluate(targets: &[String], predictions: &[String]) -> Option<ModelMetrics> {
    if targets.is_empty() || targets.len() != predictions.len() {
        return None;
    }

    let total = targets.len() as f64;
    let correct = targets
        .iter()
        .zip(predictions)
        .filter(|(t, p)| t == p)
        .count() as f64;

    let classes: BTreeSet<&str> = targets.iter().map(String::as_str).collect();
    let mut support: BTreeMap<&str, f64> = BTreeMap::new();
    for t in targets {
        *support.entry(t.as_str()).or_default() += 1.0;
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;

    for class in classes {
        let tp = targets
            .iter()
            .zip(predictions)
            .filter(|(t, p)| t.as_str() == class && p.as_str() == class)
            .count() as f64;
        let predicted = predictions.iter().filter(|p| p.as_str() == class).count() as f64;
        let actual = support[class];

        let p = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let r = if actual > 0.0 { tp / actual } else { 0.0 };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

        let w = actual / total;
        precision += w * p;
        recall += w * r;
        f1 += w * f;
    }

    Some(ModelMetrics {
        accuracy: correct / total,
        precision,
        recall,
        f1,
    })
}
