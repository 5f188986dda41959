/// Startup-time model loading and the process-wide model registry.
///
/// The registry has a two-phase lifecycle: `load` populates it once from the
/// on-disk archives, and from then on it is read-only. There is no lock;
/// after the load phase completes the map is never mutated, so concurrent
/// request handlers can read it freely through a shared `Arc`.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use ndarray::{Array1, Array2};
use ndarray_npy::NpzReader;
use tracing::{info, warn};

use crate::classifier::Model;
use crate::error::{Error, Result};
use crate::features::Strategy;

/// Number of digit classes every model discriminates between.
pub const CLASS_COUNT: usize = 10;

pub struct ModelRegistry {
    models: HashMap<Strategy, Model>,
}

impl ModelRegistry {
    /// Load every strategy's archive from `models_dir`.
    ///
    /// A strategy whose archive is missing or malformed is logged and left
    /// unregistered; requests for it will fail with `ModelNotFound` rather
    /// than falling back to another strategy's weights. Only a registry with
    /// no models at all is a startup error.
    pub fn load(models_dir: &Path) -> Result<ModelRegistry> {
        let mut models = HashMap::new();
        for strategy in Strategy::ALL {
            let path = models_dir.join(archive_name(strategy));
            match load_model(&path, strategy) {
                Ok(model) => {
                    info!(
                        "loaded model '{}' from {} ({} x {})",
                        strategy.name(),
                        path.display(),
                        model.input_len(),
                        model.class_count()
                    );
                    models.insert(strategy, model);
                }
                Err(error) => {
                    warn!("model '{}' unavailable: {}", strategy.name(), error);
                }
            }
        }

        if models.is_empty() {
            return Err(Error::Unexpected(anyhow::anyhow!(
                "no model archives could be loaded from {}",
                models_dir.display()
            )));
        }

        Ok(ModelRegistry { models })
    }

    /// Look up the model for a strategy. Absent entries are an error, never
    /// a silent default.
    pub fn get(&self, strategy: Strategy) -> Result<&Model> {
        self.models
            .get(&strategy)
            .ok_or_else(|| Error::ModelNotFound(strategy.name().to_string()))
    }

    /// Wire names of the strategies that actually loaded, for the health
    /// endpoint and startup logging.
    pub fn loaded_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.models.keys().map(Strategy::name).collect();
        names.sort_unstable();
        names
    }
}

// Archive names fixed by the training pipeline that produced the weights.
fn archive_name(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Pixel => "model_function1.npz",
        Strategy::EdgeMagnitude => "model_function2.npz",
        Strategy::BlockAverage => "model_function3.npz",
    }
}

fn load_model(path: &Path, strategy: Strategy) -> Result<Model> {
    read_archive(path, strategy).map_err(|error| Error::ModelLoad {
        path: path.display().to_string(),
        reason: format!("{:#}", error),
    })
}

/// Read one `.npz` archive holding `W` (D x C) and `b` (C) as f64 arrays,
/// validate the shapes against the strategy, and convert to f32 for the
/// inference pipeline.
fn read_archive(path: &Path, strategy: Strategy) -> anyhow::Result<Model> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut npz = NpzReader::new(file)?;

    let weights: Array2<f64> = npz.by_name("W").context("archive is missing 'W'")?;
    let bias: Array1<f64> = npz.by_name("b").context("archive is missing 'b'")?;

    anyhow::ensure!(
        weights.nrows() == strategy.feature_len(),
        "W has {} rows but '{}' features have length {}",
        weights.nrows(),
        strategy.name(),
        strategy.feature_len()
    );
    anyhow::ensure!(
        weights.ncols() == bias.len(),
        "W has {} columns but b has length {}",
        weights.ncols(),
        bias.len()
    );
    anyhow::ensure!(
        bias.len() == CLASS_COUNT,
        "expected {} classes, archive has {}",
        CLASS_COUNT,
        bias.len()
    );

    Ok(Model::new(
        weights.mapv(|value| value as f32),
        bias.mapv(|value| value as f32),
    ))
}

#[cfg(test)]
mod tests {
    use ndarray_npy::NpzWriter;
    use tempfile::TempDir;

    use super::*;

    fn write_archive(dir: &Path, name: &str, rows: usize, favored_class: usize) {
        let mut npz = NpzWriter::new(File::create(dir.join(name)).unwrap());
        let weights = Array2::<f64>::zeros((rows, CLASS_COUNT));
        let mut bias = Array1::<f64>::zeros(CLASS_COUNT);
        bias[favored_class] = 10.0;
        npz.add_array("W", &weights).unwrap();
        npz.add_array("b", &bias).unwrap();
        npz.finish().unwrap();
    }

    #[test]
    fn loads_present_archives_and_reports_absent_ones() {
        let dir = TempDir::new().unwrap();
        write_archive(dir.path(), "model_function1.npz", 784, 1);

        let registry = ModelRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.loaded_names(), vec!["pixel"]);
        assert!(registry.get(Strategy::Pixel).is_ok());
        assert!(matches!(
            registry.get(Strategy::EdgeMagnitude),
            Err(Error::ModelNotFound(name)) if name == "sobel"
        ));
    }

    #[test]
    fn archive_with_wrong_row_count_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_archive(dir.path(), "model_function1.npz", 784, 0);
        // sobel models must have 1568 rows; 784 is a configuration mistake.
        write_archive(dir.path(), "model_function2.npz", 784, 0);

        let registry = ModelRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.loaded_names(), vec!["pixel"]);
    }

    #[test]
    fn empty_directory_fails_startup() {
        let dir = TempDir::new().unwrap();
        assert!(ModelRegistry::load(dir.path()).is_err());
    }

    #[test]
    fn loaded_weights_flow_through_prediction() {
        let dir = TempDir::new().unwrap();
        write_archive(dir.path(), "model_function3.npz", 196, 7);

        let registry = ModelRegistry::load(dir.path()).unwrap();
        let model = registry.get(Strategy::BlockAverage).unwrap();
        let prediction = model.predict(&Array1::zeros(196)).unwrap();
        assert_eq!(prediction.class_index, 7);
    }
}
