use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Fixed output vocabulary of the classifier, in model index order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Mood {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

/// Number of mood classes produced by the classifier
pub const MOOD_COUNT: usize = 7;

impl Mood {
    /// Labels in default model order (Angry..Neutral)
    pub fn default_order() -> Vec<Mood> {
        Self::iter().collect()
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Mood::Angry => "😠",
            Mood::Disgust => "🤢",
            Mood::Fear => "😨",
            Mood::Happy => "😊",
            Mood::Sad => "😢",
            Mood::Surprise => "😲",
            Mood::Neutral => "😐",
        }
    }

    /// Label text as persisted in the `mood_logs` table
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Result of one classification: the winning mood and the full distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodPrediction {
    pub mood: Mood,
    /// Softmax probability of `mood` (0.0 to 1.0)
    pub confidence: f32,
    /// Softmax distribution in model output order
    pub scores: Vec<(Mood, f32)>,
}

impl MoodPrediction {
    /// Confidence as a percentage with two decimals, e.g. `87.00%`
    pub fn confidence_percent(&self) -> String {
        format_confidence(self.confidence)
    }
}

impl std::fmt::Display for MoodPrediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.mood,
            self.mood.emoji(),
            self.confidence_percent()
        )
    }
}

/// Format a [0,1] confidence as a percentage with two decimals
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}%", confidence * 100.0)
}

/// One-decimal variant used for live captures, e.g. `87.0%`
pub fn format_confidence_short(confidence: f32) -> String {
    format!("{:.1}%", confidence * 100.0)
}
