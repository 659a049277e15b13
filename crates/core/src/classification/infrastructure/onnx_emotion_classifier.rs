use std::path::{Path, PathBuf};

use ndarray::Array4;
use ort::execution_providers::ExecutionProviderDispatch;

use crate::classification::domain::emotion_classifier::{ClassificationError, EmotionClassifier};
use crate::detection::domain::face_region::FaceRegion;
use crate::shared::constants::{EMOTION_CLASS_COUNT, FACE_REGION_SIZE};

/// Emotion classifier backed by an ONNX Runtime session via `ort`.
///
/// Expects a model with one NHWC `[1, 48, 48, 1]` f32 input and a `[1, 7]`
/// output of raw class scores.
pub struct OnnxEmotionClassifier {
    model: LoadedModel<ort::session::Session>,
}

/// A session together with the file it was loaded from.
struct LoadedModel<S> {
    session: S,
    path: PathBuf,
}

impl<S> LoadedModel<S> {
    /// Installs the session `load` produces for `path`, unless `path` is
    /// already loaded. On failure the current session stays. Returns whether
    /// the session changed.
    fn switch_to(
        &mut self,
        path: &Path,
        load: impl FnOnce(&Path) -> Result<S, ClassificationError>,
    ) -> Result<bool, ClassificationError> {
        if path == self.path {
            return Ok(false);
        }
        self.session = load(path)?;
        self.path = path.to_path_buf();
        Ok(true)
    }
}

impl OnnxEmotionClassifier {
    /// Loads the model and runs one zero-input pass to prove it is usable.
    pub fn new(model_path: &Path) -> Result<Self, ClassificationError> {
        let session = load_verified(model_path)?;
        log::info!("Emotion model loaded: {}", model_path.display());
        Ok(Self {
            model: LoadedModel {
                session,
                path: model_path.to_path_buf(),
            },
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model.path
    }

    /// Replaces the active model. The current session stays in place unless
    /// the new one loads and verifies.
    pub fn switch_model(&mut self, model_path: &Path) -> Result<(), ClassificationError> {
        if self.model.switch_to(model_path, load_verified)? {
            log::info!("Emotion model switched to {}", model_path.display());
        }
        Ok(())
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn scores(&mut self, region: &FaceRegion) -> Result<Vec<f32>, ClassificationError> {
        run(&mut self.model.session, region.to_nhwc_tensor())
            .map_err(|e| ClassificationError::Inference(e.to_string()))
    }
}

fn load_verified(model_path: &Path) -> Result<ort::session::Session, ClassificationError> {
    let load_error = |reason: String| ClassificationError::ModelLoad {
        path: model_path.to_path_buf(),
        reason,
    };

    let mut session = open_session(model_path).map_err(|e| load_error(e.to_string()))?;

    let blank = Array4::<f32>::zeros((1, FACE_REGION_SIZE, FACE_REGION_SIZE, 1));
    let scores = run(&mut session, blank).map_err(|e| load_error(e.to_string()))?;
    if scores.len() != EMOTION_CLASS_COUNT {
        return Err(load_error(format!(
            "verification produced {} scores, expected {EMOTION_CLASS_COUNT}",
            scores.len()
        )));
    }
    Ok(session)
}

fn open_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Hardware providers to try, best first. ONNX Runtime falls back to its
/// CPU provider when none registers.
fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

fn run(
    session: &mut ort::session::Session,
    input: Array4<f32>,
) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let input_value = ort::value::Tensor::from_array(input)?;
    let outputs = session.run(ort::inputs![input_value])?;
    if outputs.len() == 0 {
        return Err("emotion model produced no outputs".into());
    }
    let tensor = outputs[0].try_extract_array::<f32>()?;
    Ok(tensor.iter().copied().collect())
}
