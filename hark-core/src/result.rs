//! Structured recognition output.
//!
//! All types serialise with `serde_json` to the shapes clients expect:
//!
//! ```json
//! {"partial": "hello wor"}
//! {"text": "hello world"}
//! {"text": "hello world", "words": [{"word": "hello", "start": 0.3, "end": 0.6, "conf": 0.98}, ...]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
}

impl RecognitionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    pub partial: String,
}

impl PartialResult {
    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordResult {
    pub word: String,
    /// Seconds from the start of the session.
    pub start: f64,
    pub end: f64,
    pub conf: f32,
}

/// Words, timings and diagnostics accumulated over a session's segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub text: String,
    pub words: Vec<WordResult>,
    /// Feature frame counts at which endpoints were detected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<usize>,
    /// Raw feature frames, only present after an explicit dump.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spk: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spk_frames: Option<usize>,
    /// Mean confidence of the lexical words so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Metadata {
    /// Append one segment's text and words.
    pub fn append(&mut self, text: &str, words: Vec<WordResult>) {
        if !text.is_empty() {
            if !self.text.is_empty() {
                self.text.push(' ');
            }
            self.text.push_str(text);
        }
        self.words.extend(words);
    }
}

/// What [`Recognizer::metadata`](crate::Recognizer::metadata) hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Text(RecognitionResult),
    Metadata(Metadata),
}

impl Output {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
