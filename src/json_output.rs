//! JSON output for scripting and GUI wrappers
//!
//! When --json is enabled, every status line is emitted as one JSON object
//! on stdout, tagged with its `type`, and all other output is suppressed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::mood::MoodPrediction;
use crate::storage::MoodRecord;

/// Last progress emission timestamp (milliseconds since epoch)
/// Used for throttling progress updates to ~25 FPS (40ms between updates)
static LAST_PROGRESS_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonMessage {
    /// A mood was detected (and stored unless `record_id` is absent)
    Prediction {
        input_path: String,
        mood: String,
        emoji: String,
        confidence: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        record_id: Option<i64>,
    },
    /// The image was classified but produced no usable result
    NoFace { input_path: String, confidence: f32 },
    /// Analysis of one file failed
    Failed { input_path: String, error: String },
    /// Progress update
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    /// One stored record (history listing)
    Record {
        record_id: i64,
        filename: String,
        mood: String,
        confidence: f32,
        created_at: String,
        size_bytes: usize,
    },
    /// Result of a delete request
    Deleted { record_id: i64, found: bool },
    /// A record's image was written to disk
    Exported { record_id: i64, output_path: String },
    /// Analysis summary
    Summary {
        total_files: usize,
        detected: usize,
        no_face: usize,
        failed: usize,
        duration_secs: f64,
    },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Create and emit progress message (throttled to ~25 FPS)
    ///
    /// The final progress (current == total) is always emitted.
    pub fn progress(current: usize, total: usize, message: impl Into<String>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let last_ms = LAST_PROGRESS_MS.load(Ordering::Relaxed);

        if now_ms.saturating_sub(last_ms) >= 40 || current == total {
            LAST_PROGRESS_MS.store(now_ms, Ordering::Relaxed);
            Self::Progress {
                current,
                total,
                message: message.into(),
            }
            .emit();
        }
    }

    pub fn prediction(input_path: &Path, prediction: &MoodPrediction, record_id: Option<i64>) -> Self {
        Self::Prediction {
            input_path: input_path.display().to_string(),
            mood: prediction.mood.to_string(),
            emoji: prediction.mood.emoji().to_string(),
            confidence: prediction.confidence,
            record_id,
        }
    }

    pub fn record(record: &MoodRecord) -> Self {
        Self::Record {
            record_id: record.record_id,
            filename: record.filename.clone(),
            mood: record.mood.to_string(),
            confidence: record.confidence,
            created_at: record.created_at.clone(),
            size_bytes: record.image.len(),
        }
    }

    /// Create and emit file failed message
    pub fn file_failed(input_path: &Path, error: impl Into<String>) {
        Self::Failed {
            input_path: input_path.display().to_string(),
            error: error.into(),
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::Mood;

    #[test]
    fn test_messages_carry_type_tag() {
        let json = serde_json::to_value(JsonMessage::Deleted {
            record_id: 4,
            found: false,
        })
        .unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["found"], false);

        let json = serde_json::to_value(JsonMessage::NoFace {
            input_path: "a.jpg".to_string(),
            confidence: 0.1,
        })
        .unwrap();
        assert_eq!(json["type"], "noface");
    }

    #[test]
    fn test_prediction_message() {
        let prediction = MoodPrediction {
            mood: Mood::Surprise,
            confidence: 0.5,
            scores: vec![],
        };
        let message = JsonMessage::prediction(Path::new("x/y.png"), &prediction, None);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "prediction");
        assert_eq!(json["mood"], "Surprise");
        assert_eq!(json["emoji"], "😲");
        assert!(json.get("record_id").is_none());

        let parsed: JsonMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, message);
    }
}
