use serde::{Deserialize, Serialize};

/// Readability numbers reported with a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub reading_time_minutes: u32,
    pub average_sentence_length: f64,
}

pub trait ContentAnalyzer: Send + Sync {
    fn analyze(&self, content: &str) -> ContentMetrics;
}

/// Word and sentence counts with a 200 words-per-minute reading speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentAnalyzer;

impl DefaultContentAnalyzer {
    pub const WORDS_PER_MINUTE: usize = 200;
}

impl ContentAnalyzer for DefaultContentAnalyzer {
    fn analyze(&self, content: &str) -> ContentMetrics {
        let word_count = content.split_whitespace().count();
        let sentence_count = content
            .split(['.', '!', '?'])
            .filter(|s| s.split_whitespace().next().is_some())
            .count();
        let reading_time_minutes = word_count.div_ceil(Self::WORDS_PER_MINUTE) as u32;
        let average_sentence_length = if sentence_count == 0 {
            0.0
        } else {
            (word_count as f64 / sentence_count as f64 * 10.0).round() / 10.0
        };
        ContentMetrics {
            word_count,
            sentence_count,
            reading_time_minutes,
            average_sentence_length,
        }
    }
}

pub trait WritingTips: Send + Sync {
    fn tips(&self, content_type: &str) -> Vec<String>;
}

/// Fixed tips keyed by content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticWritingTips;

impl WritingTips for StaticWritingTips {
    fn tips(&self, content_type: &str) -> Vec<String> {
        let tips: &[&str] = match content_type.trim().to_ascii_lowercase().as_str() {
            "blog" | "article" => &[
                "Open with a hook that states the reader's problem.",
                "Break long sections up with descriptive subheadings.",
                "End with a clear call to action.",
            ],
            "social" | "tweet" => &[
                "Lead with the most important point.",
                "Keep one idea per post.",
            ],
            "email" | "newsletter" => &[
                "Keep the subject line under 50 characters.",
                "Put the single ask near the top.",
            ],
            "code" => &[
                "Run the generated code against your own test cases.",
                "Review error handling before shipping.",
            ],
            "image" => &["Iterate on the prompt wording to refine composition."],
            _ => &[
                "Read the draft aloud to catch awkward phrasing.",
                "Cut any sentence that does not serve the reader.",
            ],
        };
        tips.iter().map(|t| t.to_string()).collect()
    }
}
