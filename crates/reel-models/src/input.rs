//! Input declarations and composition requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::Anchor;

/// Fallback extension when a declared one is unusable.
const FALLBACK_EXTENSION: &str = "bin";

/// Maximum length of a declared extension.
const MAX_EXTENSION_LEN: usize = 8;

/// Kind of media an asset carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Video,
    Audio,
}

impl ContentKind {
    /// Extension assumed when the caller does not declare one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            ContentKind::Video => "mp4",
            ContentKind::Audio => "mp3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared input: uploaded bytes or a remote URL.
///
/// The declared extension is trusted (no content sniffing) but is reduced to
/// ASCII alphanumerics so it is safe inside a generated file name.
#[derive(Clone, PartialEq, Eq)]
pub enum InputSpec {
    InlineBytes { content: Vec<u8>, extension: String },
    RemoteUrl { uri: String, extension: String },
}

impl InputSpec {
    /// Declare uploaded bytes.
    pub fn inline(content: impl Into<Vec<u8>>, extension: &str) -> Self {
        Self::InlineBytes {
            content: content.into(),
            extension: sanitize_extension(extension),
        }
    }

    /// Declare a remote URL. Only `http` and `https` are accepted.
    pub fn remote(uri: &str, extension: &str) -> Result<Self, InputSpecError> {
        let parsed = Url::parse(uri.trim()).map_err(|e| InputSpecError::InvalidUrl {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InputSpecError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        Ok(Self::RemoteUrl {
            uri: parsed.to_string(),
            extension: sanitize_extension(extension),
        })
    }

    pub fn extension(&self) -> &str {
        match self {
            InputSpec::InlineBytes { extension, .. } | InputSpec::RemoteUrl { extension, .. } => extension,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, InputSpec::RemoteUrl { .. })
    }
}

impl fmt::Debug for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSpec::InlineBytes { content, extension } => f
                .debug_struct("InlineBytes")
                .field("len", &content.len())
                .field("extension", extension)
                .finish(),
            InputSpec::RemoteUrl { uri, extension } => f
                .debug_struct("RemoteUrl")
                .field("uri", uri)
                .field("extension", extension)
                .finish(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InputSpecError {
    #[error("Invalid URL {uri}: {reason}")]
    InvalidUrl { uri: String, reason: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

fn sanitize_extension(extension: &str) -> String {
    let cleaned: String = extension
        .trim()
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();

    if cleaned.is_empty() {
        FALLBACK_EXTENSION.to_string()
    } else {
        cleaned
    }
}

/// Everything the HTTP layer collected for one composition job.
#[derive(Debug, Clone, Default)]
pub struct CompositionRequest {
    /// Base clip; required
    pub primary: Option<InputSpec>,
    /// Background audio
    pub audio: Option<InputSpec>,
    /// Clip appended after the rendered primary
    pub secondary: Option<InputSpec>,
    /// Caption text burned into the primary clip
    pub caption_text: Option<String>,
    /// Caption placement
    pub anchor: Anchor,
}

impl CompositionRequest {
    pub fn with_primary(mut self, input: InputSpec) -> Self {
        self.primary = Some(input);
        self
    }

    pub fn with_audio(mut self, input: InputSpec) -> Self {
        self.audio = Some(input);
        self
    }

    pub fn with_secondary(mut self, input: InputSpec) -> Self {
        self.secondary = Some(input);
        self
    }

    pub fn with_caption(mut self, text: impl Into<String>, anchor: Anchor) -> Self {
        self.caption_text = Some(text.into());
        self.anchor = anchor;
        self
    }
}
