//! Model loading.
//!
//! A model identifier is a local directory laid out like a Hugging Face
//! image-classification repo exported to ONNX. Loading is slow, so each
//! identifier is loaded once per process and the handle is shared.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use crate::image_processing::onnx_classifier::OnnxMoodClassifier;
use crate::image_processing::{MoodClassifier, Preprocessor};
use crate::mood::{Mood, MOOD_COUNT};

const PREPROCESSOR_CONFIG: &str = "preprocessor_config.json";
const MODEL_CONFIG: &str = "config.json";
const ONNX_CANDIDATES: [&str; 2] = ["model.onnx", "onnx/model.onnx"];

static LOADED_MODELS: OnceLock<Mutex<HashMap<PathBuf, Arc<LoadedModel>>>> = OnceLock::new();

/// Preprocessing transform plus classifier, shared read-only for the process lifetime
pub struct LoadedModel {
    pub preprocessor: Preprocessor,
    pub classifier: Box<dyn MoodClassifier>,
}

impl LoadedModel {
    pub fn new(preprocessor: Preprocessor, classifier: Box<dyn MoodClassifier>) -> Self {
        Self {
            preprocessor,
            classifier,
        }
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("preprocessor", &self.preprocessor)
            .field("labels", &self.classifier.labels())
            .finish()
    }
}

/// Load the model in `dir`, or return the handle loaded earlier for the same directory
pub fn load_model(dir: &Path) -> Result<Arc<LoadedModel>> {
    let key = dir
        .canonicalize()
        .with_context(|| format!("Model directory not found: {}", dir.display()))?;

    let cache = LOADED_MODELS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache
        .lock()
        .map_err(|_| anyhow!("Model cache lock poisoned"))?;

    if let Some(model) = cache.get(&key) {
        log::debug!("Reusing loaded model {}", key.display());
        return Ok(Arc::clone(model));
    }

    let model = Arc::new(load_model_uncached(&key)?);
    cache.insert(key, Arc::clone(&model));
    Ok(model)
}

fn load_model_uncached(dir: &Path) -> Result<LoadedModel> {
    if !dir.is_dir() {
        bail!("Model path is not a directory: {}", dir.display());
    }

    log::info!("Loading mood model from {}", dir.display());

    let preprocessor_path = dir.join(PREPROCESSOR_CONFIG);
    let preprocessor = if preprocessor_path.exists() {
        Preprocessor::from_file(&preprocessor_path)?
    } else {
        log::warn!(
            "{} not found in {}, using ViT defaults",
            PREPROCESSOR_CONFIG,
            dir.display()
        );
        Preprocessor::default()
    };

    let labels = read_label_map(dir)?;
    let onnx_path = find_onnx_file(dir)?;
    let classifier = OnnxMoodClassifier::load(&onnx_path, labels)?;

    Ok(LoadedModel::new(preprocessor, Box::new(classifier)))
}

fn find_onnx_file(dir: &Path) -> Result<PathBuf> {
    ONNX_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            anyhow!(
                "No ONNX model in {} (looked for {})",
                dir.display(),
                ONNX_CANDIDATES.join(", ")
            )
        })
}

#[derive(Debug, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// Index -> mood mapping from `config.json`, or the default order when the file is absent
pub fn read_label_map(dir: &Path) -> Result<Vec<Mood>> {
    let path = dir.join(MODEL_CONFIG);
    if !path.exists() {
        return Ok(Mood::default_order());
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read model config: {}", path.display()))?;
    let config: ModelConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse model config: {}", path.display()))?;

    if config.id2label.is_empty() {
        return Ok(Mood::default_order());
    }
    parse_label_map(&config.id2label)
}

fn parse_label_map(id2label: &HashMap<String, String>) -> Result<Vec<Mood>> {
    if id2label.len() != MOOD_COUNT {
        bail!(
            "id2label has {} entries, expected {}",
            id2label.len(),
            MOOD_COUNT
        );
    }

    let mut labels: Vec<Option<Mood>> = vec![None; MOOD_COUNT];
    for (index, label) in id2label {
        let index: usize = index
            .parse()
            .with_context(|| format!("Invalid id2label index '{}'", index))?;
        let mood = Mood::from_str(label.trim())
            .map_err(|_| anyhow!("Unknown mood label '{}' at index {}", label, index))?;

        let slot = labels
            .get_mut(index)
            .ok_or_else(|| anyhow!("id2label index {} out of range", index))?;
        *slot = Some(mood);
    }

    let labels: Vec<Mood> = labels.into_iter().flatten().collect();
    let mut seen = labels.clone();
    seen.sort_by_key(|mood| *mood as usize);
    seen.dedup();
    if labels.len() != MOOD_COUNT || seen.len() != MOOD_COUNT {
        bail!("id2label must name each of the {} moods exactly once", MOOD_COUNT);
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_model_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("moodvision-model-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_label_map_defaults_without_config() {
        let dir = temp_model_dir();
        assert_eq!(read_label_map(&dir).unwrap(), Mood::default_order());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_label_map_reads_custom_order() {
        let dir = temp_model_dir();
        fs::write(
            dir.join(MODEL_CONFIG),
            r#"{"id2label": {"0": "happy", "1": "sad", "2": "angry", "3": "neutral",
                             "4": "fear", "5": "surprise", "6": "disgust"}}"#,
        )
        .unwrap();

        let labels = read_label_map(&dir).unwrap();
        assert_eq!(labels[0], Mood::Happy);
        assert_eq!(labels[2], Mood::Angry);
        assert_eq!(labels[6], Mood::Disgust);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_label_map_rejects_unknown_or_duplicate_labels() {
        let mut map: HashMap<String, String> = Mood::default_order()
            .iter()
            .enumerate()
            .map(|(i, m)| (i.to_string(), m.to_string()))
            .collect();
        map.insert("6".to_string(), "contempt".to_string());
        assert!(parse_label_map(&map).is_err());

        map.insert("6".to_string(), "happy".to_string());
        assert!(parse_label_map(&map).is_err());

        map.remove("6");
        assert!(parse_label_map(&map).is_err());
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = std::env::temp_dir().join(format!("moodvision-absent-{}", uuid::Uuid::new_v4()));
        assert!(load_model(&dir).is_err());
    }

    #[test]
    fn test_load_directory_without_onnx_fails() {
        let dir = temp_model_dir();
        let err = load_model(&dir).unwrap_err();
        assert!(err.to_string().contains("No ONNX model"));
        fs::remove_dir_all(&dir).ok();
    }
}
