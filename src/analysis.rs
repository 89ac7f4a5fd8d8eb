//! Analyze, gate, store: the flow shared by uploads, live captures and the CLI.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::camera::Frame;
use crate::image_processing::mood_detection::{classify_tensor, detect_mood};
use crate::image_processing::{ChannelOrder, ImageInput};
use crate::model::LoadedModel;
use crate::mood::MoodPrediction;
use crate::session::capture_filename;
use crate::storage::MoodStore;
use crate::utils::{has_valid_extension, verbose_println};

/// Files preprocessed per parallel round in batch mode
const BATCH_CHUNK_PER_THREAD: usize = 4;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Predictions below this probability count as "no face"
    pub min_confidence: f32,
    pub extensions: Vec<String>,
    /// Worker threads for batch preprocessing (0 = CPU count)
    pub parallel_jobs: usize,
    pub verbose: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            extensions: crate::config_file::DEFAULT_EXTENSIONS
                .split(',')
                .map(str::to_string)
                .collect(),
            parallel_jobs: 0,
            verbose: false,
        }
    }
}

/// Result of analyzing one image
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// A mood was detected; `record_id` is `None` when nothing was stored (dry run)
    Detected {
        filename: String,
        prediction: MoodPrediction,
        record_id: Option<i64>,
    },
    /// No usable result; nothing stored
    NoFace { filename: String, confidence: f32 },
}

impl AnalysisOutcome {
    pub fn filename(&self) -> &str {
        match self {
            AnalysisOutcome::Detected { filename, .. } => filename,
            AnalysisOutcome::NoFace { filename, .. } => filename,
        }
    }
}

/// Totals for a batch run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub detected: usize,
    pub no_face: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, result: &Result<AnalysisOutcome>) {
        match result {
            Ok(AnalysisOutcome::Detected { .. }) => self.detected += 1,
            Ok(AnalysisOutcome::NoFace { .. }) => self.no_face += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.detected + self.no_face + self.failed
    }
}

pub struct AnalysisEngine {
    config: AnalysisConfig,
    model: Arc<LoadedModel>,
    pool: rayon::ThreadPool,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisConfig, model: Arc<LoadedModel>) -> Result<Self> {
        let threads = if config.parallel_jobs == 0 {
            num_cpus::get()
        } else {
            config.parallel_jobs
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("Failed to initialize thread pool")?;

        Ok(Self {
            config,
            model,
            pool,
        })
    }

    /// Discover all image files under the given files and directories
    pub fn discover_images(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for input in inputs {
            if input.is_file() {
                image_files.push(input.clone());
                continue;
            }

            verbose_println(
                self.config.verbose,
                &format!("Scanning directory: {}", input.display()),
            );

            let walker = WalkDir::new(input).follow_links(false).max_depth(10);
            for entry in walker {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                if path.is_file() && has_valid_extension(path, &self.config.extensions) {
                    image_files.push(path.to_path_buf());
                }
            }
        }

        // Sorted so record ids follow file order
        image_files.sort();

        verbose_println(
            self.config.verbose,
            &format!("Found {} image files", image_files.len()),
        );
        Ok(image_files)
    }

    fn classify(&self, image: &ImageInput<'_>) -> Result<MoodPrediction> {
        detect_mood(
            image,
            self.model.classifier.as_ref(),
            &self.model.preprocessor,
        )
    }

    fn passes_gate(&self, prediction: &MoodPrediction) -> bool {
        if prediction.confidence < self.config.min_confidence {
            log::info!(
                "Prediction {} below minimum confidence {:.2}",
                prediction,
                self.config.min_confidence
            );
            false
        } else {
            true
        }
    }

    /// Analyze an uploaded file and store its original bytes on success
    pub fn analyze_upload(
        &self,
        filename: &str,
        bytes: &[u8],
        store: &MoodStore,
    ) -> Result<AnalysisOutcome> {
        let prediction = self.classify(&ImageInput::Bytes(bytes))?;
        self.store_outcome(filename.to_string(), prediction, bytes, Some(store))
    }

    /// Analyze a captured webcam frame and store it as JPEG on success
    pub fn analyze_capture(&self, frame: &Frame, store: &MoodStore) -> Result<AnalysisOutcome> {
        let input = ImageInput::Pixels {
            data: &frame.data,
            width: frame.width,
            height: frame.height,
            order: ChannelOrder::Rgb,
        };
        let prediction = self.classify(&input)?;
        let jpeg = frame.encode_jpeg()?;
        self.store_outcome(capture_filename(), prediction, &jpeg, Some(store))
    }

    fn store_outcome(
        &self,
        filename: String,
        prediction: MoodPrediction,
        bytes: &[u8],
        store: Option<&MoodStore>,
    ) -> Result<AnalysisOutcome> {
        if !self.passes_gate(&prediction) {
            return Ok(AnalysisOutcome::NoFace {
                filename,
                confidence: prediction.confidence,
            });
        }

        let record_id = match store {
            Some(store) => Some(store.insert(
                &filename,
                prediction.mood,
                prediction.confidence,
                bytes,
            )?),
            None => None,
        };

        Ok(AnalysisOutcome::Detected {
            filename,
            prediction,
            record_id,
        })
    }

    /// Analyze a list of files. Decoding and preprocessing run in parallel;
    /// classification and inserts run in file order. With `store = None`
    /// nothing is written (dry run).
    ///
    /// `on_result` is called once per file, in order.
    pub fn analyze_batch<F>(
        &self,
        files: &[PathBuf],
        store: Option<&MoodStore>,
        mut on_result: F,
    ) -> BatchSummary
    where
        F: FnMut(usize, &Path, &Result<AnalysisOutcome>),
    {
        let mut summary = BatchSummary::default();
        let chunk_size = (self.pool.current_num_threads() * BATCH_CHUNK_PER_THREAD).max(1);
        let preprocessor = &self.model.preprocessor;

        for (chunk_index, chunk) in files.chunks(chunk_size).enumerate() {
            let prepared: Vec<Result<(Vec<u8>, Vec<f32>, [usize; 4])>> = self.pool.install(|| {
                chunk
                    .par_iter()
                    .map(|path| {
                        let bytes = fs::read(path)
                            .with_context(|| format!("Failed to read image: {}", path.display()))?;
                        let rgb = ImageInput::Bytes(&bytes)
                            .to_rgb()
                            .with_context(|| format!("Failed to decode image: {}", path.display()))?;
                        let (tensor, shape) = preprocessor.prepare(&rgb)?;
                        Ok((bytes, tensor, shape))
                    })
                    .collect()
            });

            for (offset, (path, prepared)) in chunk.iter().zip(prepared).enumerate() {
                let index = chunk_index * chunk_size + offset;
                let result = prepared.and_then(|(bytes, tensor, shape)| {
                    let prediction =
                        classify_tensor(tensor, shape, self.model.classifier.as_ref())?;
                    let filename = display_filename(path);
                    self.store_outcome(filename, prediction, &bytes, store)
                });

                if let Err(e) = &result {
                    log::warn!("Failed to analyze {}: {:#}", path.display(), e);
                }
                summary.record(&result);
                on_result(index, path, &result);
            }
        }

        summary
    }
}

/// File name component used as the stored filename
pub fn display_filename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processing::mood_detection::tests::ChannelMeanClassifier;
    use crate::image_processing::Preprocessor;
    use crate::mood::Mood;
    use image::{ImageBuffer, Rgb, RgbImage};

    fn engine(min_confidence: f32) -> AnalysisEngine {
        let preprocessor: Preprocessor =
            serde_json::from_str(r#"{"size": {"height": 8, "width": 8}}"#).unwrap();
        let model = Arc::new(LoadedModel::new(
            preprocessor,
            Box::new(ChannelMeanClassifier::new()),
        ));
        let config = AnalysisConfig {
            min_confidence,
            parallel_jobs: 2,
            ..AnalysisConfig::default()
        };
        AnalysisEngine::new(config, model).unwrap()
    }

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_pixel(12, 12, Rgb(color));
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("moodvision-analysis-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_upload_is_stored_with_original_bytes() {
        let engine = engine(0.0);
        let store = MoodStore::open_in_memory().unwrap();
        let bytes = png_bytes([250, 10, 10]);

        let outcome = engine.analyze_upload("red.png", &bytes, &store).unwrap();
        let AnalysisOutcome::Detected {
            prediction,
            record_id,
            ..
        } = outcome
        else {
            panic!("expected a detection");
        };
        assert_eq!(prediction.mood, Mood::Angry);

        let record = store.get(record_id.unwrap()).unwrap().unwrap();
        assert_eq!(record.filename, "red.png");
        assert_eq!(record.mood, Mood::Angry);
        assert_eq!(record.image, bytes);
        assert!((record.confidence - prediction.confidence).abs() < 1e-6);
    }

    #[test]
    fn test_gate_blocks_low_confidence() {
        let engine = engine(0.99);
        let store = MoodStore::open_in_memory().unwrap();

        let outcome = engine
            .analyze_upload("gray.png", &png_bytes([128, 128, 128]), &store)
            .unwrap();
        assert!(matches!(outcome, AnalysisOutcome::NoFace { .. }));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_undecodable_upload_is_error_and_not_stored() {
        let engine = engine(0.0);
        let store = MoodStore::open_in_memory().unwrap();
        assert!(engine.analyze_upload("bad.jpg", b"not an image", &store).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_capture_is_stored_as_jpeg() {
        let engine = engine(0.0);
        let store = MoodStore::open_in_memory().unwrap();
        let frame = Frame::new([30u8, 220, 40].repeat(16 * 16), 16, 16);

        let outcome = engine.analyze_capture(&frame, &store).unwrap();
        assert!(outcome.filename().starts_with("live_mood_capture"));

        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].image[..2], &[0xFF, 0xD8]);
        assert_eq!(records[0].filename, outcome.filename());
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = temp_dir();
        fs::write(dir.join("b.png"), png_bytes([1, 2, 3])).unwrap();
        fs::write(dir.join("a.JPG"), b"x").unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("c.webp"), b"x").unwrap();

        let files = engine(0.0).discover_images(&[dir.clone()]).unwrap();
        let names: Vec<String> = files.iter().map(|p| display_filename(p)).collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.webp"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_batch_stores_in_file_order() {
        let dir = temp_dir();
        let colors = [[250, 10, 10], [10, 250, 10], [128, 128, 255]];
        let mut files = Vec::new();
        for (i, color) in colors.iter().enumerate() {
            let path = dir.join(format!("{}.png", i));
            fs::write(&path, png_bytes(*color)).unwrap();
            files.push(path);
        }
        let broken = dir.join("3.png");
        fs::write(&broken, b"broken").unwrap();
        files.push(broken);

        let engine = engine(0.0);
        let store = MoodStore::open_in_memory().unwrap();
        let mut seen = Vec::new();
        let summary = engine.analyze_batch(&files, Some(&store), |index, _, result| {
            seen.push((index, result.is_ok()));
        });

        assert_eq!(summary, BatchSummary { detected: 3, no_face: 0, failed: 1 });
        assert_eq!(seen, vec![(0, true), (1, true), (2, true), (3, false)]);

        let mut records = store.list_all().unwrap();
        records.reverse();
        let names: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["0.png", "1.png", "2.png"]);
        assert_eq!(records[0].mood, Mood::Angry);
        assert_eq!(records[1].mood, Mood::Disgust);
        assert_eq!(records[2].mood, Mood::Fear);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dry_run_batch_stores_nothing() {
        let dir = temp_dir();
        let path = dir.join("only.png");
        fs::write(&path, png_bytes([10, 250, 10])).unwrap();

        let engine = engine(0.0);
        let summary = engine.analyze_batch(&[path], None, |_, _, result| {
            assert!(matches!(
                result,
                Ok(AnalysisOutcome::Detected { record_id: None, .. })
            ));
        });
        assert_eq!(summary.detected, 1);

        fs::remove_dir_all(&dir).ok();
    }
}
