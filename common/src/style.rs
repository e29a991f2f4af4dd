use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// Appended to every prompt regardless of style.
pub const KEEP_SHORT: &str = " Keep the response to 30 words or less.";

/// Attitude the narrator takes towards the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Flattering,
    Neutral,
    Insulting,
}

/// How much levity goes into a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Humor {
    Funny,
    Neutral,
    Serious,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Flattering, Tone::Neutral, Tone::Insulting];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Flattering => "flattering",
            Tone::Neutral => "neutral",
            Tone::Insulting => "insulting",
        }
    }
}

impl Humor {
    pub const ALL: [Humor; 3] = [Humor::Funny, Humor::Neutral, Humor::Serious];

    pub fn as_str(self) -> &'static str {
        match self {
            Humor::Funny => "funny",
            Humor::Neutral => "neutral",
            Humor::Serious => "serious",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Humor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct StyleParseError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Tone {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tone::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StyleParseError {
                kind: "tone",
                value: s.to_string(),
            })
    }
}

impl FromStr for Humor {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Humor::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| StyleParseError {
                kind: "humor",
                value: s.to_string(),
            })
    }
}

/// Current narration style. `None` means the knob was never set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleConfig {
    pub tone: Option<Tone>,
    pub humor: Option<Humor>,
}

impl StyleConfig {
    /// Suffix appended to the base prompt for this style.
    pub fn prompt_suffix(&self) -> String {
        match (self.tone, self.humor) {
            (None, None) => KEEP_SHORT.to_string(),
            (Some(tone), Some(humor)) => {
                format!(" Be both {tone} and {humor} in your response.{KEEP_SHORT}")
            }
            (None, Some(humor)) => format!(" Be somewhat {humor} in your response.{KEEP_SHORT}"),
            (Some(tone), None) => format!(" Be somewhat {tone} in your response.{KEEP_SHORT}"),
        }
    }
}

/// Process-wide style knobs, written by the control surface and read once
/// per generation cycle.
#[derive(Debug, Default)]
pub struct StyleStore {
    inner: Mutex<StyleConfig>,
}

impl StyleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StyleConfig {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_tone(&self, tone: Tone) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).tone = Some(tone);
    }

    pub fn set_humor(&self, humor: Humor) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).humor = Some(humor);
    }
}
