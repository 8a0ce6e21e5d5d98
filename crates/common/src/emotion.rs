//! Emotion labels and history records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentiment label assigned to a piece of user text, ordered by valence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EmotionLabel {
    #[serde(rename = "super negative")]
    SuperNegative,
    #[serde(rename = "negative")]
    Negative,
    #[serde(rename = "neutral")]
    Neutral,
    #[serde(rename = "positive")]
    Positive,
    #[serde(rename = "super positive")]
    SuperPositive,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 5] = [
        EmotionLabel::SuperNegative,
        EmotionLabel::Negative,
        EmotionLabel::Neutral,
        EmotionLabel::Positive,
        EmotionLabel::SuperPositive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::SuperNegative => "super negative",
            EmotionLabel::Negative => "negative",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Positive => "positive",
            EmotionLabel::SuperPositive => "super positive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|label| label.as_str() == needle)
    }

    /// Map a star-rating sentiment label ("1 star" .. "5 stars") to a label.
    ///
    /// Anything unrecognized is treated as neutral.
    pub fn from_star_rating(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("1 star") {
            EmotionLabel::SuperNegative
        } else if lower.contains("2 stars") {
            EmotionLabel::Negative
        } else if lower.contains("3 stars") {
            EmotionLabel::Neutral
        } else if lower.contains("4 stars") {
            EmotionLabel::Positive
        } else if lower.contains("5 stars") {
            EmotionLabel::SuperPositive
        } else {
            EmotionLabel::Neutral
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, EmotionLabel::SuperNegative | EmotionLabel::Negative)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a user's emotion history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub emotion: EmotionLabel,
    /// `%Y-%m-%d %H:%M:%S`, UTC
    pub timestamp: String,
}
