/// ONNX Runtime backend for the mood classifier
use anyhow::{anyhow, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

use super::mood_detection::MoodClassifier;
use crate::mood::Mood;

/// Vision-transformer classifier loaded from an exported `model.onnx`
pub struct OnnxMoodClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    labels: Vec<Mood>,
}

impl OnnxMoodClassifier {
    /// Load the ONNX graph and bind it to the given index -> mood mapping
    pub fn load(model_path: &Path, labels: Vec<Mood>) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {e}"))?
            .with_intra_threads(num_cpus::get().min(4))
            .map_err(|e| anyhow!("Failed to set intra-op threads: {e}"))?
            .commit_from_file(model_path)
            .map_err(|e| anyhow!("Failed to load ONNX model {:?}: {e}", model_path))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| anyhow!("ONNX model {:?} declares no inputs", model_path))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| anyhow!("ONNX model {:?} declares no outputs", model_path))?;

        log::info!(
            "Loaded ONNX model {:?} (input '{}', output '{}')",
            model_path,
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            labels,
        })
    }
}

impl MoodClassifier for OnnxMoodClassifier {
    fn logits(&self, pixel_values: Vec<f32>, shape: [usize; 4]) -> Result<Vec<f32>> {
        let input_value = Tensor::from_array((shape.to_vec(), pixel_values))
            .map_err(|e| anyhow!("Failed to create input tensor: {e}"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| anyhow!("ONNX inference failed: {e}"))?;

        let (_, logits) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract logits tensor: {e}"))?;

        Ok(logits.to_vec())
    }

    fn labels(&self) -> &[Mood] {
        &self.labels
    }
}
