//! Caption requests and vertical anchors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Vertical placement category for caption text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Upper part of the frame
    Top,
    /// Vertically centered
    #[default]
    Middle,
    /// Lower part of the frame
    Bottom,
}

impl Anchor {
    pub const ALL: &'static [Anchor] = &[Anchor::Top, Anchor::Middle, Anchor::Bottom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::Top => "top",
            Anchor::Middle => "middle",
            Anchor::Bottom => "bottom",
        }
    }

    /// Parse an anchor, falling back to [`Anchor::Middle`] for missing or
    /// unrecognised values.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Anchor {
    type Err = AnchorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "top" => Ok(Anchor::Top),
            "middle" | "center" => Ok(Anchor::Middle),
            "bottom" => Ok(Anchor::Bottom),
            _ => Err(AnchorParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown caption anchor: {0}")]
pub struct AnchorParseError(String);

/// Caption text to burn into the rendered clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionRequest {
    /// Raw caption text as supplied by the caller
    pub text: String,
    /// Vertical placement
    #[serde(default)]
    pub anchor: Anchor,
    /// Frame width the caption is laid out for
    pub frame_width: u32,
    /// Frame height the caption is laid out for
    pub frame_height: u32,
}

impl CaptionRequest {
    pub fn new(text: impl Into<String>, anchor: Anchor, frame_width: u32, frame_height: u32) -> Self {
        Self {
            text: text.into(),
            anchor,
            frame_width,
            frame_height,
        }
    }

    /// Whether there is any visible text to render.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
