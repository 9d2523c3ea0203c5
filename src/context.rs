//! Structural context extraction around match lines.
//!
//! Three strategies, tried in order when the caller asked for structural
//! context (`max_context_lines == 0`): expand to the enclosing function or
//! type definition via the symbol table, fall back to the surrounding
//! indentation block, fall back to a fixed window. An explicit
//! `max_context_lines > 0` requests a plain window and skips the
//! structural strategies.

use crate::types::{ExtractedContext, FileInfo, HitLineRange, SearchOptions};

/// Cap on function-expansion windows; larger spans get a window of this
/// size centered on the match line, clipped to the function span.
pub const MAX_FUNCTION_LINES: u32 = 100;
/// Spans beyond this are treated as degenerate and get small fixed context.
pub const HUGE_FUNCTION_LINES: u32 = 500;
/// Window half-size around matches in huge functions.
const HUGE_SPAN_RADIUS: u32 = 5;
/// Window half-size when no structural context exists.
const FALLBACK_RADIUS: u32 = 2;

/// A context window before match-line bookkeeping: the line range plus the
/// block metadata when function expansion succeeded.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub range: HitLineRange,
    pub block_type: Option<&'static str>,
    pub block_name: Option<String>,
}

/// Compute the context window for a match at 1-based `line`.
/// The window always contains `line`.
pub fn extract_window(info: &FileInfo, line: u32, options: &SearchOptions) -> WindowSpec {
    let line_count = info.line_count();
    let line = line.clamp(1, line_count.max(1));

    if options.max_context_lines > 0 {
        return plain_window(line, line_count, options.max_context_lines, false);
    }

    if let Some(window) = function_expansion(info, line, line_count) {
        return window;
    }
    if let Some(window) = indent_block(info, line, line_count) {
        return window;
    }
    plain_window(line, line_count, FALLBACK_RADIUS, false)
}

fn plain_window(line: u32, line_count: u32, radius: u32, is_function: bool) -> WindowSpec {
    WindowSpec {
        range: HitLineRange {
            start: line.saturating_sub(radius).max(1),
            end: (line + radius).min(line_count.max(1)),
            primary_line: line,
            is_function,
            score: 0,
        },
        block_type: None,
        block_name: None,
    }
}

fn function_expansion(info: &FileInfo, line: u32, line_count: u32) -> Option<WindowSpec> {
    let cue_line = nearest_cue_line(info, line)?;
    let symbol = info
        .symbols
        .iter()
        .find(|s| s.line == cue_line && s.kind.is_definition() && s.end_line >= line)?;

    // A match at the declaration itself gets no expansion; the declaration
    // is its own context.
    if line == symbol.line {
        return None;
    }

    let span_len = symbol.end_line - symbol.line + 1;
    if span_len > HUGE_FUNCTION_LINES {
        return Some(plain_window(line, line_count, HUGE_SPAN_RADIUS, false));
    }

    let (start, end) = if span_len > MAX_FUNCTION_LINES {
        let mut start = line
            .saturating_sub(MAX_FUNCTION_LINES / 2)
            .max(symbol.line);
        let end = (start + MAX_FUNCTION_LINES - 1).min(symbol.end_line);
        start = start.max(end.saturating_sub(MAX_FUNCTION_LINES - 1));
        (start, end)
    } else {
        (symbol.line, symbol.end_line)
    };

    Some(WindowSpec {
        range: HitLineRange {
            start,
            end,
            primary_line: line,
            is_function: true,
            score: 0,
        },
        block_type: Some(symbol.kind.as_str()),
        block_name: Some(symbol.name.clone()),
    })
}

/// Nearest line at or before `line` whose trimmed prefix begins with a
/// function-definition cue.
fn nearest_cue_line(info: &FileInfo, line: u32) -> Option<u32> {
    let map = info.line_map();
    (1..=line).rev().find(|&candidate| {
        map.line(candidate)
            .is_some_and(|text| begins_with_definition_cue(text))
    })
}

const DEFINITION_CUES: [&[u8]; 6] = [
    b"func ",
    b"function ",
    b"def ",
    b"fn ",
    b"class ",
    b"method ",
];

fn begins_with_definition_cue(line: &[u8]) -> bool {
    let trimmed = trim_start(line);
    DEFINITION_CUES.iter().any(|cue| trimmed.starts_with(cue))
}

fn indent_block(info: &FileInfo, line: u32, line_count: u32) -> Option<WindowSpec> {
    let map = info.line_map();
    let current = map.line(line)?;
    if is_blank(current) {
        return None;
    }
    let base_indent = indent_width(current);
    // A zero-indent block is degenerate: it would swallow every top-level
    // line in the file.
    if base_indent == 0 {
        return None;
    }

    let mut start = line;
    while start > 1 {
        let prev = map.line(start - 1)?;
        if is_blank(prev) || indent_width(prev) >= base_indent {
            start -= 1;
        } else {
            break;
        }
    }
    let mut end = line;
    while end < line_count {
        let next = map.line(end + 1)?;
        if is_blank(next) || indent_width(next) >= base_indent {
            end += 1;
        } else {
            break;
        }
    }

    if start == line && end == line {
        return None;
    }
    Some(WindowSpec {
        range: HitLineRange {
            start,
            end,
            primary_line: line,
            is_function: false,
            score: 0,
        },
        block_type: None,
        block_name: None,
    })
}

/// Materialize the context for a (possibly merged) window. `match_lines`
/// are the 1-based record lines of the whole file, in ascending order.
pub fn build_context(
    info: &FileInfo,
    start: u32,
    end: u32,
    match_lines: &[u32],
    block_type: Option<&'static str>,
    block_name: Option<String>,
) -> ExtractedContext {
    let map = info.line_map();
    let end = end.min(map.line_count()).max(start);

    let lines: Vec<String> = (start..=end)
        .map(|n| {
            let text = map.line(n).unwrap_or(b"");
            String::from_utf8_lossy(text)
                .trim_end_matches('\r')
                .to_string()
        })
        .collect();

    let mut matched_lines: Vec<u32> = Vec::new();
    let mut match_count = 0usize;
    for &line in match_lines {
        if line < start || line > end {
            continue;
        }
        match_count += 1;
        if matched_lines.last() != Some(&line) {
            matched_lines.push(line);
        }
    }

    ExtractedContext {
        start_line: start,
        end_line: end,
        lines,
        matched_lines,
        match_count,
        block_type,
        block_name,
    }
}

/// Whether a line reads as a comment: `//`, `#`, `/*`, `*`, `<!--`
/// prefixes, or `*/`, `-->` suffixes after trimming.
pub fn is_comment_line(line: &[u8]) -> bool {
    let trimmed = trim_ascii(line);
    if trimmed.is_empty() {
        return false;
    }
    trimmed.starts_with(b"//")
        || trimmed.starts_with(b"#")
        || trimmed.starts_with(b"/*")
        || trimmed.starts_with(b"*")
        || trimmed.starts_with(b"<!--")
        || trimmed.ends_with(b"*/")
        || trimmed.ends_with(b"-->")
}

#[inline]
fn trim_start(line: &[u8]) -> &[u8] {
    let skip = line
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    &line[skip..]
}

#[inline]
fn trim_ascii(line: &[u8]) -> &[u8] {
    let trimmed = trim_start(line);
    let end = trimmed
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    &trimmed[..end]
}

#[inline]
fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

#[inline]
fn indent_width(line: &[u8]) -> usize {
    line.iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count()
}
