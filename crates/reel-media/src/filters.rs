//! FFmpeg filter definitions for the render and concat stages.

use std::path::Path;

use crate::caption::{OverlayLine, OverlayPlan, FONT_SIZE_EXPR};

/// Fit into a `width`x`height` frame without cropping, letterboxing the rest.
pub fn scale_pad(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1:1",
        w = width,
        h = height
    )
}

/// Escape a path for use as a filter option value inside a filter chain.
///
/// The value is unescaped twice: once by the chain parser, then by the
/// filter's option parser.
pub fn escape_filter_path(path: &Path) -> String {
    escape_chain(&escape_option(&path.to_string_lossy()))
}

/// Option-level escaping (`key=value:key=value`).
fn escape_option(value: &str) -> String {
    escape_chars(value, &['\\', '\'', ':'])
}

/// Chain-level escaping (`filter,filter;[label]`).
fn escape_chain(value: &str) -> String {
    escape_chars(value, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One drawtext filter for a caption line.
pub fn drawtext(line: &OverlayLine, font_file: &Path) -> String {
    format!(
        "drawtext=fontfile={font}:text='{text}':fontcolor=white:fontsize={size}:borderw=2:bordercolor=black:box=0:x={x}:y={y}",
        font = escape_filter_path(font_file),
        text = line.text,
        size = FONT_SIZE_EXPR,
        x = line.x_expr,
        y = line.y_expr,
    )
}

/// Simple `-vf` chain for the render stage: fit the frame, then draw every caption line.
pub fn render_chain(width: u32, height: u32, overlay: &OverlayPlan, font_file: &Path) -> String {
    let mut chain = vec![scale_pad(width, height)];
    chain.extend(overlay.lines.iter().map(|line| drawtext(line, font_file)));
    chain.join(",")
}

/// Trim an audio input to `seconds` and reset its timestamps.
pub fn audio_trim(input: &str, seconds: f64, label: &str) -> String {
    format!(
        "[{input}]atrim=0:{secs},asetpts=PTS-STARTPTS[{label}]",
        input = input,
        secs = format_seconds(seconds),
        label = label
    )
}

/// Filter graph appending input 1 to input 0, both fitted to the target frame.
///
/// Produces `[outv]`; audio is handled separately.
pub fn concat_video(width: u32, height: u32, fps: u32) -> String {
    let fit = scale_pad(width, height);
    format!(
        "[0:v:0]{fit}[v0scaled];\
         [1:v:0]{fit},settb=AVTB,fps={fps}[v1scaled];\
         [v0scaled][v1scaled]concat=n=2:v=1:a=0,fps={fps},format=yuv420p[outv]",
        fit = fit,
        fps = fps
    )
}

/// Shortest decimal rendering of a duration (`12.5`, `8`).
pub fn format_seconds(seconds: f64) -> String {
    format!("{}", seconds)
}
