//! Caption layout: escaping, greedy word wrap and vertical anchoring.
//!
//! Every line carries two positions: an FFmpeg expression (evaluated by
//! drawtext against the real frame) and the same value computed for the
//! requested frame size, which is what the tests reason about.

use reel_models::{Anchor, CaptionRequest};
use serde::Serialize;

/// Maximum characters per wrapped line.
pub const LINE_CHAR_BUDGET: usize = 27;

/// Font size cap in pixels; narrower frames use `width / 20`.
const MAX_FONT_SIZE: f64 = 32.0;

/// Line height as a multiple of the font size.
const LINE_SPACING: f64 = 1.5;

/// Font size expression handed to drawtext (comma escaped for filter chains).
pub const FONT_SIZE_EXPR: &str = "min(32\\,w/20)";

const LINE_HEIGHT_EXPR: &str = "min(32\\,w/20)*1.5";

/// Horizontally centered text.
const CENTERED_X_EXPR: &str = "(w-text_w)/2";

/// One positioned caption line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLine {
    /// Escaped line text, ready to sit inside single quotes
    pub text: String,
    pub x_expr: String,
    pub y_expr: String,
    /// `y_expr` evaluated for the requested frame
    pub y: f64,
}

/// Wrapped, positioned caption ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct OverlayPlan {
    pub lines: Vec<OverlayLine>,
    pub font_size: f64,
    pub line_height: f64,
}

impl OverlayPlan {
    /// A plan that draws nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn block_height(&self) -> f64 {
        self.lines.len() as f64 * self.line_height
    }
}

/// Lay out caption text for the requested frame.
pub fn layout(request: &CaptionRequest) -> OverlayPlan {
    let width = request.frame_width as f64;
    let height = request.frame_height as f64;
    let font_size = MAX_FONT_SIZE.min(width / 20.0);
    let line_height = font_size * LINE_SPACING;

    let mut plan = OverlayPlan {
        lines: Vec::new(),
        font_size,
        line_height,
    };

    if request.is_blank() {
        return plan;
    }

    let escaped = escape_caption(request.text.trim());

    if escaped.chars().count() <= LINE_CHAR_BUDGET {
        let (y_expr, y) = match request.anchor {
            Anchor::Top => ("(h/10)", height / 10.0),
            Anchor::Middle => ("(h/2)", height / 2.0),
            Anchor::Bottom => ("(h*9/10)", height * 9.0 / 10.0),
        };
        plan.lines.push(OverlayLine {
            text: escaped,
            x_expr: CENTERED_X_EXPR.to_string(),
            y_expr: y_expr.to_string(),
            y,
        });
        return plan;
    }

    let wrapped = wrap_words(&escaped, LINE_CHAR_BUDGET);
    let count = wrapped.len();
    let block_height = count as f64 * line_height;

    let (start_expr, start) = match request.anchor {
        Anchor::Top => ("(h/8)".to_string(), height / 8.0),
        Anchor::Bottom => (
            format!("(h*7/8)-({}*{})", count, LINE_HEIGHT_EXPR),
            height * 7.0 / 8.0 - block_height,
        ),
        Anchor::Middle => (
            format!("(h-{}*{})/2", count, LINE_HEIGHT_EXPR),
            (height - block_height) / 2.0,
        ),
    };

    plan.lines = wrapped
        .into_iter()
        .enumerate()
        .map(|(index, text)| OverlayLine {
            text,
            x_expr: CENTERED_X_EXPR.to_string(),
            y_expr: format!("({}+{}*{})", start_expr, index, LINE_HEIGHT_EXPR),
            y: start + index as f64 * line_height,
        })
        .collect();

    plan
}

/// Escape single quotes so the text survives inside `text='...'`.
pub fn escape_caption(text: &str) -> String {
    text.replace('\'', "'\\''")
}

/// Greedy word wrap.
///
/// Words are added to the current line while `line + " " + word` fits the
/// budget. A single word longer than the budget gets a line of its own.
pub fn wrap_words(text: &str, budget: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= budget {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}
