use edge_inference::{MaternGp, MaternGpConfig};
use edge_space::StateActionSpace;
use ndarray::{ArrayView1, ArrayView2};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::{SafetyError, SafetyMeasure, SafetyResult, SafetyStateDict};

/// Regressor artifact inside a saved model folder.
pub const GP_SAVE_NAME: &str = "gp_save.json";
/// State dict inside a saved model folder.
pub const SAVE_NAME: &str = "model.json";

/// Safety measure backed by the exact Matérn GP.
pub type MaternSafety = SafetyMeasure<MaternGp>;

impl SafetyMeasure<MaternGp> {
    /// Builds a Matérn safety measure seeded with `(x_seed, y_seed)`.
    pub fn matern(
        space: StateActionSpace,
        gamma_measure: f64,
        x_seed: ArrayView2<'_, f64>,
        y_seed: ArrayView1<'_, f64>,
        config: MaternGpConfig,
    ) -> SafetyResult<Self> {
        let gp = MaternGp::new(x_seed, y_seed, config)?;
        Self::new(space, gp, gamma_measure)
    }

    /// Writes `gp_save.json` and `model.json` into `folder`.
    #[instrument(skip(self), fields(folder = %folder.display()))]
    pub fn save(&self, folder: &Path) -> SafetyResult<()> {
        std::fs::create_dir_all(folder).map_err(|source| io_error(folder, source))?;
        self.gp().save(&folder.join(GP_SAVE_NAME))?;

        let path = folder.join(SAVE_NAME);
        let bytes = serde_json::to_vec_pretty(&self.state_dict()).map_err(|source| {
            SafetyError::InvalidStateDict {
                path: path.clone(),
                source,
            }
        })?;
        let temp_path = path.with_file_name(format!("{SAVE_NAME}.tmp.{}", std::process::id()));
        std::fs::write(&temp_path, bytes).map_err(|source| io_error(&temp_path, source))?;
        std::fs::rename(&temp_path, &path).map_err(|source| io_error(&path, source))?;
        info!(rows = self.gp().len(), "saved safety measure");
        Ok(())
    }

    /// Restores a measure saved with [`MaternSafety::save`].
    ///
    /// Without `seed` the persisted training rows are restored; with it only
    /// the GP hyperparameters are read and the seed supplies the data. Without
    /// `gamma_measure` the value stored in `model.json` is used.
    #[instrument(skip(space, seed), fields(folder = %folder.display()))]
    pub fn load(
        folder: &Path,
        space: StateActionSpace,
        gamma_measure: Option<f64>,
        seed: Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)>,
    ) -> SafetyResult<Self> {
        let gamma_measure = match gamma_measure {
            Some(gamma_measure) => gamma_measure,
            None => read_state_dict(&folder.join(SAVE_NAME))?.gamma_measure,
        };
        let load_data = seed.is_none();
        let gp = MaternGp::load(&folder.join(GP_SAVE_NAME), seed, load_data)?;
        Self::new(space, gp, gamma_measure)
    }
}

fn read_state_dict(path: &Path) -> SafetyResult<SafetyStateDict> {
    if !path.is_file() {
        return Err(SafetyError::MissingStateDict {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    serde_json::from_str(&raw).map_err(|source| SafetyError::InvalidStateDict {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path, source: std::io::Error) -> SafetyError {
    SafetyError::Io {
        path: PathBuf::from(path),
        source,
    }
}
