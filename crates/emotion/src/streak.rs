//! Detection of repeated negative emotions in a user's recent history.

use companion_common::{EmotionLabel, EmotionRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    /// How many of the newest records are inspected
    pub window: usize,
    /// Matching records needed to raise a warning
    pub threshold: usize,
    pub labels: Vec<EmotionLabel>,
    /// Prefix of the warning; the matching timestamps are appended
    pub message: String,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            window: 5,
            threshold: 2,
            labels: vec![EmotionLabel::SuperNegative],
            message: "You've seemed to be having a hard time lately. \
                      It's important to take a break and look after yourself."
                .into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportWarning {
    pub message: String,
    pub timestamps: Vec<String>,
}

pub struct StreakDetector {
    config: StreakConfig,
}

impl StreakDetector {
    pub fn new(config: StreakConfig) -> Self {
        Self { config }
    }

    /// Check `recent` (newest first) for a streak.
    pub fn detect(&self, recent: &[EmotionRecord]) -> Option<SupportWarning> {
        let timestamps: Vec<String> = recent
            .iter()
            .take(self.config.window)
            .filter(|r| self.config.labels.contains(&r.emotion))
            .map(|r| r.timestamp.clone())
            .collect();

        if self.config.threshold == 0 || timestamps.len() < self.config.threshold {
            return None;
        }

        Some(SupportWarning {
            message: format!("{} ({})", self.config.message, timestamps.join(", ")),
            timestamps,
        })
    }
}

impl Default for StreakDetector {
    fn default() -> Self {
        Self::new(StreakConfig::default())
    }
}
