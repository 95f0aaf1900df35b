//! Dataset layout: `<root>/{train,val,test}/<class>/<image>`.
//!
//! A class directory counts as `dog` when its name contains "dog", anything else is `cat`.
//! Missing `val` or `test` splits are carved out of the other splits with a seeded shuffle.

use std::path::{Path, PathBuf};

use rand::{SeedableRng, rngs::SmallRng, seq::SliceRandom};

use crate::prediction::Class;

pub const SPLITS: [&str; 3] = ["train", "val", "test"];
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const DEFAULT_SPLIT_SEED: u64 = 42;
/// Share of `train` moved to `val` (and to `test`) when `val` is missing.
pub const HOLDOUT_FRACTION: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("data directory not found: {0}")]
    NotFound(PathBuf),

    #[error("no training images found under {0}")]
    Empty(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub class: Class,
}

pub fn class_for_dir(name: &str) -> Class {
    if name.to_lowercase().contains("dog") {
        Class::Dog
    } else {
        Class::Cat
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn read_dir(path: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut entries = std::fs::read_dir(path)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}

/// Lists the labelled images of one split directory, sorted by path.
///
/// A split directory that does not exist yields no images.
pub fn scan_split(split_dir: &Path) -> Result<Vec<LabeledImage>, DatasetError> {
    if !split_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut images = Vec::new();
    for class_dir in read_dir(split_dir)?.into_iter().filter(|p| p.is_dir()) {
        let Some(name) = class_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let class = class_for_dir(name);
        images.extend(
            read_dir(&class_dir)?
                .into_iter()
                .filter(|p| p.is_file() && is_image(p))
                .map(|path| LabeledImage { path, class }),
        );
    }
    Ok(images)
}

/// Images of every split under `root`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    pub train: Vec<LabeledImage>,
    pub val: Vec<LabeledImage>,
    pub test: Vec<LabeledImage>,
}

impl Dataset {
    /// Scans `root`, splitting with [`DEFAULT_SPLIT_SEED`] where a split is missing.
    pub fn scan(root: &Path) -> Result<Self, DatasetError> {
        Self::scan_with_seed(root, DEFAULT_SPLIT_SEED)
    }

    /// Scans `root`. Fails when `train` has no images.
    ///
    /// Without `val` images, the last 10% of the shuffled `train` become `val` and, when
    /// `test` is also empty, the 10% after them become `test`. Without `test` images only,
    /// half of the shuffled `val` (at least one image) becomes `test`.
    pub fn scan_with_seed(root: &Path, seed: u64) -> Result<Self, DatasetError> {
        if !root.is_dir() {
            return Err(DatasetError::NotFound(root.to_path_buf()));
        }
        let [train, val, test] = SPLITS;
        let mut dataset = Self {
            train: scan_split(&root.join(train))?,
            val: scan_split(&root.join(val))?,
            test: scan_split(&root.join(test))?,
        };
        if dataset.train.is_empty() {
            return Err(DatasetError::Empty(root.to_path_buf()));
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        if dataset.val.is_empty() {
            let n = dataset.train.len();
            let holdout = (n as f64 * HOLDOUT_FRACTION) as usize;
            dataset.train.shuffle(&mut rng);
            if dataset.test.is_empty() {
                dataset.test = dataset.train.split_off(n - holdout);
            }
            dataset.val = dataset.train.split_off(dataset.train.len() - holdout);
            log::info!("No val split under {}, carved it from train", root.display());
        } else if dataset.test.is_empty() {
            let n_test = (dataset.val.len() / 2).max(1);
            dataset.val.shuffle(&mut rng);
            dataset.test = dataset.val.drain(..n_test).collect();
            log::info!("No test split under {}, carved it from val", root.display());
        }

        log::info!(
            "Train: {}, Val: {}, Test: {}",
            dataset.train.len(),
            dataset.val.len(),
            dataset.test.len()
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("train/cats/a.jpg"));
        touch(&root.join("train/cats/b.PNG"));
        touch(&root.join("train/cats/notes.txt"));
        touch(&root.join("train/Dogs/c.jpeg"));
        touch(&root.join("test/dog/d.jpg"));

        let dataset = Dataset::scan(root).unwrap();
        assert_eq!(dataset.train.len(), 3);
        assert!(dataset.val.is_empty());
        assert_eq!(
            dataset.test,
            vec![LabeledImage {
                path: root.join("test/dog/d.jpg"),
                class: Class::Dog
            }]
        );

        let dogs = dataset
            .train
            .iter()
            .filter(|img| img.class == Class::Dog)
            .count();
        assert_eq!(dogs, 1);
    }

    fn layout(root: &Path, split: &str, cats: usize, dogs: usize) {
        for i in 0..cats {
            touch(&root.join(format!("{split}/cats/cat.{i}.jpg")));
        }
        for i in 0..dogs {
            touch(&root.join(format!("{split}/dogs/dog.{i}.jpg")));
        }
    }

    fn sorted_paths(images: &[LabeledImage]) -> Vec<PathBuf> {
        let mut paths: Vec<_> = images.iter().map(|img| img.path.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_val_and_test_carved_from_train() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path(), "train", 10, 10);

        let dataset = Dataset::scan(dir.path()).unwrap();
        assert_eq!(dataset.train.len(), 16);
        assert_eq!(dataset.val.len(), 2);
        assert_eq!(dataset.test.len(), 2);

        let mut all = [dataset.train, dataset.val, dataset.test].concat();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all.dedup();
        assert_eq!(all.len(), 20);
        for img in &all {
            let dog = img.path.to_string_lossy().contains("/dogs/");
            assert_eq!(img.class == Class::Dog, dog);
        }
    }

    #[test]
    fn test_carved_splits_follow_seed() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path(), "train", 15, 15);

        let a = Dataset::scan_with_seed(dir.path(), 7).unwrap();
        let b = Dataset::scan_with_seed(dir.path(), 7).unwrap();
        assert_eq!(a, b);

        let c = Dataset::scan_with_seed(dir.path(), 8).unwrap();
        assert_eq!(
            sorted_paths(&[a.train, a.val.clone(), a.test.clone()].concat()),
            sorted_paths(&[c.train, c.val, c.test].concat())
        );
    }

    #[test]
    fn test_existing_test_split_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path(), "train", 5, 5);
        layout(dir.path(), "test", 1, 2);

        let dataset = Dataset::scan(dir.path()).unwrap();
        assert_eq!(dataset.train.len(), 9);
        assert_eq!(dataset.val.len(), 1);
        assert_eq!(dataset.test, scan_split(&dir.path().join("test")).unwrap());
    }

    #[test]
    fn test_test_carved_from_val() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path(), "train", 4, 4);
        layout(dir.path(), "val", 3, 2);

        let dataset = Dataset::scan(dir.path()).unwrap();
        assert_eq!(dataset.train.len(), 8);
        assert_eq!(dataset.val.len(), 3);
        assert_eq!(dataset.test.len(), 2);
        assert_eq!(
            sorted_paths(&[dataset.val, dataset.test].concat()),
            sorted_paths(&scan_split(&dir.path().join("val")).unwrap())
        );
    }

    #[test]
    fn test_single_val_image_moves_to_test() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path(), "train", 2, 2);
        layout(dir.path(), "val", 0, 1);

        let dataset = Dataset::scan(dir.path()).unwrap();
        assert!(dataset.val.is_empty());
        assert_eq!(dataset.test.len(), 1);
        assert_eq!(dataset.test[0].class, Class::Dog);
    }

    #[test]
    fn test_empty_train() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path(), "test", 1, 1);
        let err = Dataset::scan(dir.path()).unwrap_err();
        assert!(matches!(err, DatasetError::Empty(_)));
    }

    #[test]
    fn test_missing_root() {
        let err = Dataset::scan(Path::new("/nonexistent/data")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn test_class_for_dir() {
        assert_eq!(class_for_dir("hotdogs"), Class::Dog);
        assert_eq!(class_for_dir("DOG"), Class::Dog);
        assert_eq!(class_for_dir("cats"), Class::Cat);
        assert_eq!(class_for_dir("other"), Class::Cat);
    }
}
