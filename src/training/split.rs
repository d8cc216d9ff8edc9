//! Stratified train/test split

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{IrisError, Result};

/// Row indices of each side of a split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Materialized train and test partitions
#[derive(Debug, Clone)]
pub struct SplitData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<usize>,
    pub y_test: Array1<usize>,
    pub indices: SplitIndices,
}

impl SplitData {
    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }
}

/// Compute stratified split indices.
///
/// The test side holds `ceil(test_size * n)` rows. Each class contributes in
/// proportion to its size, with leftover rows going to the classes with the
/// largest fractional share. Every class keeps at least one row on each
/// side without changing the test size. The same seed always yields the
/// same split.
pub fn stratified_split_indices(
    targets: &Array1<usize>,
    test_size: f64,
    seed: u64,
) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(IrisError::invalid_parameter(
            "test_size",
            test_size,
            "must be in (0, 1)",
        ));
    }

    let n = targets.len();
    let n_test = ((test_size * n as f64) - 1e-9).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(IrisError::ValidationError(format!(
            "test_size {} leaves an empty partition for {} samples",
            test_size, n
        )));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &class) in targets.iter().enumerate() {
        by_class.entry(class).or_default().push(idx);
    }
    if let Some((class, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(IrisError::ValidationError(format!(
            "class {} has {} member(s); stratification needs at least 2",
            class,
            members.len()
        )));
    }
    if n_test < by_class.len() || n - n_test < by_class.len() {
        return Err(IrisError::ValidationError(format!(
            "both partitions must hold at least one row of each of {} classes",
            by_class.len()
        )));
    }

    // Proportional allocation with largest remainders
    let mut allocation: Vec<(usize, usize, f64)> = by_class
        .iter()
        .map(|(&class, members)| {
            let exact = n_test as f64 * members.len() as f64 / n as f64;
            (class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = allocation.iter().map(|(_, k, _)| k).sum();
    let mut order: Vec<usize> = (0..allocation.len()).collect();
    order.sort_by(|&a, &b| allocation[b].2.total_cmp(&allocation[a].2));
    for &i in order.iter().take(n_test - assigned) {
        allocation[i].1 += 1;
    }
    let sizes: Vec<usize> = allocation.iter().map(|(class, _, _)| by_class[class].len()).collect();
    let mut counts: Vec<usize> = allocation.iter().map(|(_, k, _)| *k).collect();
    rebalance_to_bounds(&mut counts, &sizes);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);

    for ((class, _, _), k) in allocation.into_iter().zip(counts) {
        let mut members = by_class[&class].clone();
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test })
}

/// Move test rows between classes until each class has `1..=size - 1`
/// test rows. The total is unchanged. A class short of its floor takes a
/// row from the class holding the most test rows; a class over its cap
/// hands a row to the class with the most spare training rows.
///
/// Callers guarantee `classes <= total <= sum(sizes) - classes`.
fn rebalance_to_bounds(counts: &mut [usize], sizes: &[usize]) {
    while let Some(short) = counts.iter().position(|&k| k == 0) {
        let donor = (0..counts.len())
            .filter(|&i| counts[i] > 1)
            .max_by_key(|&i| (counts[i], sizes[i]));
        match donor {
            Some(donor) => {
                counts[donor] -= 1;
                counts[short] += 1;
            }
            None => break,
        }
    }
    while let Some(full) = (0..counts.len()).find(|&i| counts[i] >= sizes[i]) {
        let recipient = (0..counts.len())
            .filter(|&i| counts[i] + 1 < sizes[i])
            .max_by_key(|&i| sizes[i] - counts[i]);
        match recipient {
            Some(recipient) => {
                counts[full] -= 1;
                counts[recipient] += 1;
            }
            None => break,
        }
    }
}

/// Split a dataset into train and test partitions, stratified by label.
pub fn train_test_split(dataset: &Dataset, test_size: f64, seed: u64) -> Result<SplitData> {
    let indices = stratified_split_indices(&dataset.targets, test_size, seed)?;
    let train = dataset.select(&indices.train);
    let test = dataset.select(&indices.test);

    Ok(SplitData {
        x_train: train.features,
        x_test: test.features,
        y_train: train.targets,
        y_test: test.targets,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iris_split_sizes() {
        let ds = Dataset::iris();
        let split = train_test_split(&ds, 0.2, 42).unwrap();

        assert_eq!(split.n_train(), 120);
        assert_eq!(split.n_test(), 30);

        let mut counts = [0usize; 3];
        for &t in split.y_test.iter() {
            counts[t] += 1;
        }
        assert_eq!(counts, [10, 10, 10]);
    }

    #[test]
    fn test_split_is_partition() {
        let ds = Dataset::iris();
        let split = stratified_split_indices(&ds.targets, 0.2, 42).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..150).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let ds = Dataset::iris();
        let a = stratified_split_indices(&ds.targets, 0.2, 42).unwrap();
        let b = stratified_split_indices(&ds.targets, 0.2, 42).unwrap();
        let c = stratified_split_indices(&ds.targets, 0.2, 7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_uneven_classes() {
        let targets = Array1::from_vec(vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 2, 2]);
        let split = stratified_split_indices(&targets, 0.3, 1).unwrap();
        // ceil(0.3 * 11) = 4
        assert_eq!(split.test.len(), 4);
        for class in 0..3 {
            assert!(split.test.iter().any(|&i| targets[i] == class));
            assert!(split.train.iter().any(|&i| targets[i] == class));
        }
    }

    #[test]
    fn test_minority_class_keeps_test_size() {
        // 98/2 at 0.2 rounds the minority share to zero test rows
        let mut labels = vec![0; 98];
        labels.extend([1, 1]);
        let targets = Array1::from_vec(labels);
        let split = stratified_split_indices(&targets, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.test.iter().filter(|&&i| targets[i] == 1).count(), 1);
        assert_eq!(split.train.iter().filter(|&&i| targets[i] == 1).count(), 1);
    }

    #[test]
    fn test_small_class_keeps_a_training_row() {
        // 2/18 at 0.8 rounds the small class up to both of its rows
        let mut labels = vec![0, 0];
        labels.extend(vec![1; 18]);
        let targets = Array1::from_vec(labels);
        let split = stratified_split_indices(&targets, 0.8, 3).unwrap();

        assert_eq!(split.test.len(), 16);
        assert_eq!(split.train.len(), 4);
        for class in 0..2 {
            assert!(split.test.iter().any(|&i| targets[i] == class));
            assert!(split.train.iter().any(|&i| targets[i] == class));
        }
    }

    #[test]
    fn test_rejects_singleton_class() {
        let targets = Array1::from_vec(vec![0, 0, 0, 1]);
        assert!(stratified_split_indices(&targets, 0.5, 0).is_err());
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let targets = Array1::from_vec(vec![0, 0, 1, 1]);
        assert!(stratified_split_indices(&targets, 0.0, 0).is_err());
        assert!(stratified_split_indices(&targets, 1.0, 0).is_err());
    }
}
