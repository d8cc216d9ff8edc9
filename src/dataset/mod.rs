//! Iris dataset preparation and loading
//!
//! The built-in table is written to a flat CSV file with four feature
//! columns, a numeric label and the label name. Every other component reads
//! that file back through [`Dataset::load_csv`].

mod iris;

use crate::error::{IrisError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

/// Number of feature columns
pub const N_FEATURES: usize = 4;

/// Number of classes
pub const N_CLASSES: usize = 3;

/// Feature column names, in file order
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "sepal length (cm)",
    "sepal width (cm)",
    "petal length (cm)",
    "petal width (cm)",
];

/// Numeric label column
pub const TARGET_COLUMN: &str = "target";

/// Label name column
pub const TARGET_NAME_COLUMN: &str = "target_name";

/// Class names indexed by class id
pub const CLASS_NAMES: [&str; N_CLASSES] = ["setosa", "versicolor", "virginica"];

/// Default location of the prepared dataset
pub const DEFAULT_DATA_PATH: &str = "data/iris.csv";

/// Map a class id to its name.
pub fn class_name(id: i64) -> Result<&'static str> {
    usize::try_from(id)
        .ok()
        .and_then(|idx| CLASS_NAMES.get(idx).copied())
        .ok_or(IrisError::UnknownClass(id))
}

/// Map a class name back to its id.
pub fn class_id(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|c| *c == name)
}

/// One flower measurement with its label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: [f64; N_FEATURES],
    pub target: usize,
}

impl Sample {
    pub fn target_name(&self) -> Result<&'static str> {
        class_name(self.target as i64)
    }
}

/// Feature matrix plus label vector
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub targets: Array1<usize>,
}

impl Dataset {
    /// Build a dataset, checking that rows and labels line up.
    pub fn new(features: Array2<f64>, targets: Array1<usize>) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(IrisError::ShapeError {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", targets.len()),
            });
        }
        if features.ncols() != N_FEATURES {
            return Err(IrisError::ShapeError {
                expected: format!("{} feature columns", N_FEATURES),
                actual: format!("{} feature columns", features.ncols()),
            });
        }
        Ok(Self { features, targets })
    }

    /// The built-in Iris table in its native row order.
    pub fn iris() -> Self {
        let features = Array2::from_shape_fn((iris::N_SAMPLES, N_FEATURES), |(i, j)| {
            iris::MEASUREMENTS[i][j]
        });
        let targets = Array1::from_shape_fn(iris::N_SAMPLES, iris::target_of);
        Self { features, targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Sample at row `index`
    pub fn sample(&self, index: usize) -> Option<Sample> {
        if index >= self.len() {
            return None;
        }
        let row = self.features.row(index);
        Some(Sample {
            features: [row[0], row[1], row[2], row[3]],
            target: self.targets[index],
        })
    }

    /// Rows at the given indices, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
        }
    }

    /// Count of samples per class id
    pub fn class_counts(&self) -> [usize; N_CLASSES] {
        let mut counts = [0; N_CLASSES];
        for &t in self.targets.iter() {
            if t < N_CLASSES {
                counts[t] += 1;
            }
        }
        counts
    }

    /// Convert to a DataFrame with the on-disk column layout.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(j, name)| Column::new((*name).into(), self.features.column(j).to_vec()))
            .collect();

        let targets: Vec<i64> = self.targets.iter().map(|&t| t as i64).collect();
        let names: Vec<&str> = targets
            .iter()
            .map(|&t| class_name(t))
            .collect::<Result<_>>()?;

        columns.push(Column::new(TARGET_COLUMN.into(), targets));
        columns.push(Column::new(TARGET_NAME_COLUMN.into(), names));

        Ok(DataFrame::new(columns)?)
    }

    /// Extract features and labels from a DataFrame.
    ///
    /// `target_name` is carried in the file but not read back.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let n_rows = df.height();
        let mut features = Array2::zeros((n_rows, N_FEATURES));

        for (j, name) in FEATURE_NAMES.iter().enumerate() {
            let column = df
                .column(name)
                .map_err(|_| IrisError::FeatureNotFound(name.to_string()))?;
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            for (i, value) in series.f64()?.into_iter().enumerate() {
                features[[i, j]] = value.ok_or_else(|| {
                    IrisError::DataError(format!("missing value in '{}' at row {}", name, i))
                })?;
            }
        }

        let column = df
            .column(TARGET_COLUMN)
            .map_err(|_| IrisError::FeatureNotFound(TARGET_COLUMN.to_string()))?;
        let series = column.as_materialized_series().cast(&DataType::Int64)?;
        let targets = series
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Some(v) if v >= 0 => Ok(v as usize),
                Some(v) => Err(IrisError::DataError(format!(
                    "negative label {} at row {}",
                    v, i
                ))),
                None => Err(IrisError::DataError(format!("missing label at row {}", i))),
            })
            .collect::<Result<Vec<usize>>>()?;

        Self::new(features, Array1::from(targets))
    }

    /// Read a dataset previously written by [`Dataset::write_csv`].
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IrisError::DataError(format!(
                "dataset file not found: {}",
                path.display()
            )));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(200))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        let dataset = Self::from_dataframe(&df)?;
        debug!(path = %path.display(), rows = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Write the dataset as CSV, creating the parent directory if needed.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        Ok(())
    }
}

/// Write the built-in Iris table to `path`.
pub fn prepare(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let dataset = Dataset::iris();
    dataset.write_csv(path)?;
    info!(
        path = %path.display(),
        rows = dataset.len(),
        classes = ?CLASS_NAMES,
        "Iris dataset written"
    );
    Ok(dataset)
}
