use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::errors::StoryError;

/// Raw image bytes plus their MIME type. Never modified after it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    name: String,
    data: Bytes,
    mime_type: String,
}

impl ImageAsset {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// File name or upload label, only used for logs and messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Description of one image; `index` is its 1-based position in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caption {
    pub index: usize,
    pub text: String,
}

impl Caption {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tone {
    WarmAndWholesome,
    Funny,
    Adventure,
    Fantasy,
    Custom(String),
}

impl Tone {
    /// Tones offered by the upload form.
    pub const PRESETS: [Tone; 4] = [
        Tone::WarmAndWholesome,
        Tone::Funny,
        Tone::Adventure,
        Tone::Fantasy,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Tone::WarmAndWholesome => "Warm & Wholesome",
            Tone::Funny => "Funny",
            Tone::Adventure => "Adventure",
            Tone::Fantasy => "Fantasy",
            Tone::Custom(value) => value,
        }
    }
}

impl FromStr for Tone {
    type Err = StoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(StoryError::validation("tone must not be empty"));
        }

        let tone = match trimmed.to_lowercase().as_str() {
            "warm & wholesome" | "warm and wholesome" | "warm-and-wholesome" | "warm" | "wholesome" => {
                Tone::WarmAndWholesome
            }
            "funny" => Tone::Funny,
            "adventure" => Tone::Adventure,
            "fantasy" => Tone::Fantasy,
            _ => Tone::Custom(trimmed.to_string()),
        };
        Ok(tone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Kids,
    Teens,
    Adults,
    General,
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Audience::Kids,
        Audience::Teens,
        Audience::Adults,
        Audience::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Kids => "Kids",
            Audience::Teens => "Teens",
            Audience::Adults => "Adults",
            Audience::General => "General",
        }
    }
}

impl FromStr for Audience {
    type Err = StoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "kids" | "children" => Ok(Audience::Kids),
            "teens" | "teenagers" => Ok(Audience::Teens),
            "adults" => Ok(Audience::Adults),
            "general" | "everyone" => Ok(Audience::General),
            other => Err(StoryError::validation(format!(
                "unknown audience `{other}` (expected Kids, Teens, Adults or General)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

impl LengthBucket {
    pub const ALL: [LengthBucket; 3] = [LengthBucket::Short, LengthBucket::Medium, LengthBucket::Long];

    /// Pair of (planner instruction, composer word target).
    pub fn resolve(&self) -> (&'static str, &'static str) {
        (self.planner_instruction(), self.target_words())
    }

    pub fn planner_instruction(&self) -> &'static str {
        match self {
            LengthBucket::Short => "short and focused",
            LengthBucket::Medium => "medium length",
            LengthBucket::Long => "detailed and long",
        }
    }

    pub fn target_words(&self) -> &'static str {
        match self {
            LengthBucket::Short => "300–500 words",
            LengthBucket::Medium => "500–800 words",
            LengthBucket::Long => "800–1200 words",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthBucket::Short => "Short",
            LengthBucket::Medium => "Medium",
            LengthBucket::Long => "Long",
        }
    }

    /// Form label, e.g. `Short (300–500 words)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.as_str(), self.target_words())
    }

    /// Lenient parse of a form label: anything mentioning "short" or "long"
    /// (any case) picks that bucket, everything else is Medium.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("short") {
            LengthBucket::Short
        } else if label.contains("long") {
            LengthBucket::Long
        } else {
            LengthBucket::Medium
        }
    }
}

impl FromStr for LengthBucket {
    type Err = StoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "short" => Ok(LengthBucket::Short),
            "medium" => Ok(LengthBucket::Medium),
            "long" => Ok(LengthBucket::Long),
            other => Err(StoryError::validation(format!(
                "unknown length `{other}` (expected short, medium or long)"
            ))),
        }
    }
}

macro_rules! display_and_serialize_as_str {
    ($($ty:ty),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(self.as_str())
                }
            }
        )+
    };
}

display_and_serialize_as_str!(Tone, Audience, LengthBucket);

/// Tone, audience and length for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryParameters {
    pub tone: Tone,
    pub audience: Audience,
    pub length: LengthBucket,
}

impl StoryParameters {
    pub fn new(tone: Tone, audience: Audience, length: LengthBucket) -> Self {
        Self {
            tone,
            audience,
            length,
        }
    }
}

impl Default for StoryParameters {
    fn default() -> Self {
        Self::new(Tone::WarmAndWholesome, Audience::Kids, LengthBucket::Short)
    }
}

/// Planner output. Kept as opaque text and handed verbatim to the composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Outline(String);

impl Outline {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Story(String);

impl Story {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Flat UTF-8 blob, ready to be saved as a `.txt` file.
    pub fn to_text_blob(&self) -> Vec<u8> {
        let mut blob = self.0.clone().into_bytes();
        if !self.0.ends_with('\n') {
            blob.push(b'\n');
        }
        blob
    }
}

impl fmt::Display for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct StoryRun {
    pub parameters: StoryParameters,
    pub captions: Vec<Caption>,
    pub outline: Outline,
    pub story: Story,
}

/// Artifacts finished before a run failed. Always reported as incomplete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartialRun {
    pub captions: Vec<Caption>,
    pub outline: Option<Outline>,
}

impl PartialRun {
    pub fn is_empty(&self) -> bool {
        self.captions.is_empty() && self.outline.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_buckets_resolve_exactly() {
        assert_eq!(
            LengthBucket::Short.resolve(),
            ("short and focused", "300–500 words")
        );
        assert_eq!(
            LengthBucket::Medium.resolve(),
            ("medium length", "500–800 words")
        );
        assert_eq!(
            LengthBucket::Long.resolve(),
            ("detailed and long", "800–1200 words")
        );
    }

    #[test]
    fn length_labels_round_through_lenient_parse() {
        for bucket in LengthBucket::ALL {
            assert_eq!(LengthBucket::from_label(&bucket.label()), bucket);
        }
        assert_eq!(LengthBucket::Short.label(), "Short (300–500 words)");
        assert_eq!(LengthBucket::from_label("whatever"), LengthBucket::Medium);
        assert_eq!(LengthBucket::from_label("short (300–500 words)"), LengthBucket::Short);
        assert_eq!(LengthBucket::from_label("LONG (800–1200 words)"), LengthBucket::Long);
        assert_eq!(LengthBucket::from_label(" medium "), LengthBucket::Medium);
        assert!("whatever".parse::<LengthBucket>().is_err());
    }

    #[test]
    fn tones_accept_presets_and_free_text() {
        assert_eq!("Warm & Wholesome".parse::<Tone>().unwrap(), Tone::WarmAndWholesome);
        assert_eq!("funny".parse::<Tone>().unwrap(), Tone::Funny);
        assert_eq!(
            "Spooky noir".parse::<Tone>().unwrap(),
            Tone::Custom("Spooky noir".to_string())
        );
        assert!("   ".parse::<Tone>().is_err());
        assert_eq!(Tone::WarmAndWholesome.to_string(), "Warm & Wholesome");
    }

    #[test]
    fn audience_is_a_closed_set() {
        assert_eq!("Kids".parse::<Audience>().unwrap(), Audience::Kids);
        assert_eq!(" general ".parse::<Audience>().unwrap(), Audience::General);
        assert!(matches!(
            "pets".parse::<Audience>(),
            Err(StoryError::Validation(_))
        ));
    }

    #[test]
    fn story_blob_is_newline_terminated_utf8() {
        let story = Story::new("Once upon a time – the end.");
        let blob = story.to_text_blob();
        assert_eq!(String::from_utf8(blob).unwrap(), "Once upon a time – the end.\n");

        let story = Story::new("Done.\n");
        assert_eq!(story.to_text_blob(), b"Done.\n".to_vec());
    }

    #[test]
    fn parameters_serialize_as_labels() {
        let value = serde_json::to_value(StoryParameters::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "tone": "Warm & Wholesome",
                "audience": "Kids",
                "length": "Short",
            })
        );
    }
}
