// Library exports shared by the CLI and the GUI
pub mod analysis;
pub mod camera;
pub mod cli;
pub mod config_file;
pub mod image_processing;
pub mod json_output;
pub mod model;
pub mod mood;
pub mod report;
pub mod session;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use analysis::{AnalysisConfig, AnalysisEngine, AnalysisOutcome, BatchSummary};
pub use config_file::Settings;
pub use image_processing::{detect_mood, ChannelOrder, ImageInput, MoodClassifier};
pub use json_output::JsonMessage;
pub use model::{load_model, LoadedModel};
pub use mood::{Mood, MoodPrediction};
pub use session::{LiveSession, LiveState, LiveTick};
pub use storage::{MoodRecord, MoodStore};
