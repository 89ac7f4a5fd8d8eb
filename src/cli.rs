use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "moodvision",
    version,
    about = "Detect the mood of faces in images and keep a local history",
    long_about = "
MoodVision - Image Mood Analyzer

Classifies the facial expression in a photo into one of seven moods
(angry, disgust, fear, happy, sad, surprise, neutral) with a pretrained
vision-transformer model, and logs each result with its image to a local
SQLite database.

Example Usage:
  # Analyze every image in a folder and store the results
  moodvision analyze -i ~/Photos/faces

  # Analyze a single file without storing anything
  moodvision analyze -i ~/Photos/me.jpg --dry-run

  # Show the stored history, newest first
  moodvision history

  # Delete two records and export the image of another
  moodvision delete 3 4
  moodvision export 7 -o capture.jpg

  # Use a different model directory and machine-readable output
  moodvision --model ./models/my-export --json analyze -i ./faces"
)]
pub struct Args {
    /// JSON configuration file (defaults to <config dir>/moodvision/config.json)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Model directory containing model.onnx and preprocessor_config.json
    #[arg(long = "model", value_name = "DIR", global = true)]
    pub model_dir: Option<PathBuf>,

    /// SQLite database file for the mood history
    #[arg(long = "database", value_name = "FILE", global = true)]
    pub database_path: Option<PathBuf>,

    /// Predictions below this probability (0.0-1.0) are reported as "no face"
    #[arg(long = "min-confidence", value_name = "F", global = true)]
    pub min_confidence: Option<f32>,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Emit JSON lines on stdout instead of human-readable output
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Classify images and store each result
    Analyze {
        /// Input directories or single image files (can be specified multiple times)
        #[arg(short = 'i', long = "input", required = true, value_name = "DIR|FILE")]
        input_paths: Vec<PathBuf>,

        /// Comma-separated list of image extensions to process
        #[arg(long = "extensions", value_name = "LIST")]
        extensions: Option<String>,

        /// Number of parallel decoding jobs (0 = auto-detect CPU cores)
        #[arg(short = 'j', long = "jobs", default_value = "0", value_name = "N")]
        jobs: usize,

        /// Classify but do not store anything
        #[arg(long = "dry-run")]
        dry_run: bool,
    },

    /// List every stored record, newest first
    History,

    /// Delete records by id
    Delete {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<i64>,
    },

    /// Write the stored image of a record to a file
    Export {
        #[arg(value_name = "ID")]
        id: i64,

        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: PathBuf,
    },

    /// Capture one webcam frame, classify and store it
    #[cfg(feature = "camera")]
    Capture {
        /// Camera device index
        #[arg(long = "camera-index", value_name = "N")]
        camera_index: Option<u32>,
    },
}

/// Parse a comma-separated extension list
pub fn parse_extensions(extensions: &str) -> Vec<String> {
    extensions
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
