//! Pattern compilation for the hybrid execution model.
//!
//! A query compiles to one or more single patterns, each either a plain
//! literal or a regex. Regexes are analyzed once for required literal runs
//! (>= 3 bytes) so the candidate selector can prune files through the
//! trigram postings before any per-file execution happens. The analysis is
//! conservative: when it cannot prove a literal must appear, it extracts
//! nothing and the pattern scans every candidate.

use aho_corasick::AhoCorasick;
use regex_syntax::hir::literal::Extractor;

use crate::error::{Error, Result};
use crate::scanner::{self, CommentMask, ScanFlags};
use crate::types::{Match, SearchOptions};

/// Give up on prefiltering once a pattern expands into this many literal
/// alternatives; scanning all candidates is cheaper than a huge union.
const MAX_PREFILTER_ALTERNATIVES: usize = 16;

#[derive(Debug)]
enum PatternEngine {
    Literal(Vec<u8>),
    Regex(regex::bytes::Regex),
}

/// One compiled pattern plus the literal alternatives the trigram prefilter
/// may use. An empty `prefilter_literals` means "cannot prune".
#[derive(Debug)]
pub struct SinglePattern {
    pub source: String,
    engine: PatternEngine,
    pub prefilter_literals: Vec<Vec<u8>>,
}

/// A fully compiled query: the union of its single patterns.
#[derive(Debug)]
pub struct CompiledQuery {
    patterns: Vec<SinglePattern>,
    /// Aho-Corasick automaton when two or more literal patterns are
    /// unioned; single patterns and regexes bypass it.
    multi_literal: Option<AhoCorasick>,
    flags: ScanFlags,
}

impl CompiledQuery {
    /// Compile the positional pattern or, when non-empty, the multi-pattern
    /// union from `options.patterns` (which overrides the positional one).
    pub fn compile(pattern: &str, options: &SearchOptions) -> Result<CompiledQuery> {
        let sources: Vec<&str> = if options.patterns.is_empty() {
            vec![pattern]
        } else {
            options.patterns.iter().map(String::as_str).collect()
        };
        let sources: Vec<&str> = sources.into_iter().filter(|s| !s.is_empty()).collect();
        if sources.is_empty() {
            return Err(Error::BadPattern("empty pattern".to_string()));
        }

        let mut patterns = Vec::with_capacity(sources.len());
        for source in &sources {
            patterns.push(compile_single(source, options)?);
        }

        let all_literal = patterns
            .iter()
            .all(|p| matches!(p.engine, PatternEngine::Literal(_)));
        let multi_literal = if all_literal && patterns.len() > 1 {
            let needles: Vec<&[u8]> = patterns
                .iter()
                .map(|p| match &p.engine {
                    PatternEngine::Literal(bytes) => bytes.as_slice(),
                    PatternEngine::Regex(_) => unreachable!(),
                })
                .collect();
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(options.case_insensitive)
                    .build(&needles)
                    .map_err(|e| Error::BadPattern(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(CompiledQuery {
            patterns,
            multi_literal,
            flags: ScanFlags {
                case_insensitive: options.case_insensitive,
                word_boundary: options.word_boundary,
            },
        })
    }

    #[inline]
    pub fn patterns(&self) -> &[SinglePattern] {
        &self.patterns
    }

    /// The first pattern's source; what ranking compares hits against.
    #[inline]
    pub fn primary_source(&self) -> &str {
        &self.patterns[0].source
    }

    /// All matches in `content`, ordered by `(start, end)`, after the
    /// word-boundary and comment filters. Spans from different patterns
    /// that land on the same bytes are collapsed into one.
    pub fn find_all(&self, content: &[u8], mask: Option<&CommentMask>) -> Vec<Match> {
        if let Some(automaton) = &self.multi_literal {
            let mut matches: Vec<Match> = automaton
                .find_overlapping_iter(content)
                .map(|m| {
                    let needle = match &self.patterns[m.pattern().as_usize()].engine {
                        PatternEngine::Literal(bytes) => bytes.as_slice(),
                        PatternEngine::Regex(_) => unreachable!(),
                    };
                    Match {
                        start: m.start(),
                        end: m.end(),
                        exact: &content[m.start()..m.end()] == needle,
                    }
                })
                .collect();
            scanner::retain_filtered(content, &mut matches, self.flags, mask);
            dedup_spans(&mut matches);
            return matches;
        }

        if self.patterns.len() == 1 {
            return self.patterns[0].find_all(content, self.flags, mask);
        }

        let mut matches = Vec::new();
        for pattern in &self.patterns {
            matches.extend(pattern.find_all(content, self.flags, mask));
        }
        dedup_spans(&mut matches);
        matches
    }
}

impl SinglePattern {
    fn find_all(&self, content: &[u8], flags: ScanFlags, mask: Option<&CommentMask>) -> Vec<Match> {
        match &self.engine {
            PatternEngine::Literal(needle) => {
                scanner::find_all_masked(content, needle, flags, mask)
            }
            PatternEngine::Regex(regex) => {
                let mut matches: Vec<Match> = regex
                    .find_iter(content)
                    .map(|m| Match {
                        start: m.start(),
                        end: m.end(),
                        exact: !flags.case_insensitive,
                    })
                    .collect();
                scanner::retain_filtered(content, &mut matches, flags, mask);
                matches
            }
        }
    }
}

fn compile_single(source: &str, options: &SearchOptions) -> Result<SinglePattern> {
    if options.use_regex {
        let regex = regex::bytes::RegexBuilder::new(source)
            .case_insensitive(options.case_insensitive)
            .unicode(false)
            .build()
            .map_err(|e| Error::BadPattern(e.to_string()))?;
        Ok(SinglePattern {
            source: source.to_string(),
            engine: PatternEngine::Regex(regex),
            prefilter_literals: regex_prefilter_literals(source, options.case_insensitive),
        })
    } else {
        let needle = source.as_bytes().to_vec();
        // Trigram postings are built from raw bytes, so a case-insensitive
        // literal cannot prune through them.
        let prefilter_literals = if !options.case_insensitive && needle.len() >= 3 {
            vec![needle.clone()]
        } else {
            Vec::new()
        };
        Ok(SinglePattern {
            source: source.to_string(),
            engine: PatternEngine::Literal(needle),
            prefilter_literals,
        })
    }
}

/// Literal alternatives that must prefix any match of `pattern`, each at
/// least 3 bytes, or nothing when the analysis cannot prove it.
///
/// `limit_class(1)` stops expansion at the first multi-element class, so
/// `Function[0-9]+` yields `{Function}` rather than ten expanded variants.
fn regex_prefilter_literals(pattern: &str, case_insensitive: bool) -> Vec<Vec<u8>> {
    if case_insensitive {
        return Vec::new();
    }
    let Ok(hir) = regex_syntax::ParserBuilder::new()
        .utf8(false)
        .build()
        .parse(pattern)
    else {
        return Vec::new();
    };

    let mut extractor = Extractor::new();
    extractor.limit_class(1);
    let seq = extractor.extract(&hir);
    let Some(literals) = seq.literals() else {
        return Vec::new();
    };
    if literals.is_empty() || literals.len() > MAX_PREFILTER_ALTERNATIVES {
        return Vec::new();
    }

    let mut out: Vec<Vec<u8>> = Vec::with_capacity(literals.len());
    for literal in literals {
        if literal.as_bytes().len() < 3 {
            // One unprunable alternative defeats the whole union.
            return Vec::new();
        }
        let bytes = literal.as_bytes().to_vec();
        if !out.contains(&bytes) {
            out.push(bytes);
        }
    }
    out
}

/// The literal strings (>= 3 chars) the posting index can prune with, as
/// exposed at the indexer boundary.
pub fn required_literals(pattern: &str, use_regex: bool) -> Vec<String> {
    if use_regex {
        regex_prefilter_literals(pattern, false)
            .into_iter()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .collect()
    } else if pattern.len() >= 3 {
        vec![pattern.to_string()]
    } else {
        Vec::new()
    }
}

fn dedup_spans(matches: &mut Vec<Match>) {
    matches.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    matches.dedup_by(|next, kept| {
        if next.start == kept.start && next.end == kept.end {
            kept.exact |= next.exact;
            true
        } else {
            false
        }
    });
}
