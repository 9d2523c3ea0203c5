//! Per-file match assembly.
//!
//! Walks the selected candidates in caller order and turns raw byte spans
//! into line-attributed match records, honoring the full option matrix:
//! inversion, files-only and count-per-file modes, symbol filters, and the
//! per-file / global caps. Files are processed in parallel batches; every
//! file in a batch runs to completion before the batch is appended, so
//! early termination on `max_results` stays deterministic.

use rayon::prelude::*;
use tracing::debug;

use crate::control::QueryControl;
use crate::error::Result;
use crate::index::SourceIndex;
use crate::pattern::CompiledQuery;
use crate::scanner::CommentMask;
use crate::types::{FileId, SearchOptions, SymbolKind};

/// Files per parallel batch. Batches are appended in candidate order.
const BATCH_SIZE: usize = 128;

/// One line-attributed match. For file-level records (files-only and
/// count-per-file modes) `line` is 0 and the span is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRecord {
    pub line: u32,
    pub column: u32,
    pub start: usize,
    pub end: usize,
    pub exact: bool,
}

/// All records produced for one candidate file, plus the uncapped total.
#[derive(Debug, Clone)]
pub struct FileMatches {
    pub file: FileId,
    pub records: Vec<MatchRecord>,
    /// Match count before per-file caps; what count-per-file reports.
    pub total_matches: usize,
}

/// Assemble records for every candidate, stopping early once `max_results`
/// records exist across files. Unknown file ids are skipped.
pub fn assemble(
    index: &dyn SourceIndex,
    candidates: &[FileId],
    query: &CompiledQuery,
    options: &SearchOptions,
    control: &QueryControl,
) -> Result<Vec<FileMatches>> {
    let mut out: Vec<FileMatches> = Vec::new();
    let mut emitted = 0usize;
    let cap = options.max_results;

    'batches: for batch in candidates.chunks(BATCH_SIZE) {
        control.check()?;

        let batch_results: Vec<Option<FileMatches>> = batch
            .par_iter()
            .map(|&id| {
                if control.cancel.is_cancelled() {
                    return None;
                }
                match_file(index, id, query, options)
            })
            .collect();

        for file_matches in batch_results.into_iter().flatten() {
            let mut file_matches = file_matches;
            if cap > 0 {
                let remaining = cap - emitted;
                if file_matches.records.len() > remaining {
                    file_matches.records.truncate(remaining);
                }
            }
            emitted += file_matches.records.len();
            out.push(file_matches);
            if cap > 0 && emitted >= cap {
                break 'batches;
            }
        }
    }

    control.check()?;
    debug!(
        files = out.len(),
        records = emitted,
        "match assembly complete"
    );
    Ok(out)
}

fn match_file(
    index: &dyn SourceIndex,
    id: FileId,
    query: &CompiledQuery,
    options: &SearchOptions,
) -> Option<FileMatches> {
    let info = index.file_info(id)?;
    debug_assert!(info.id == id);

    let mask = options
        .exclude_comments
        .then(|| CommentMask::build(&info.content));
    let raw = query.find_all(&info.content, mask.as_ref());

    let map = info.line_map();
    let mut records: Vec<MatchRecord> = Vec::with_capacity(raw.len().min(64));
    for m in &raw {
        let line = map.line_number(m.start);
        if !passes_symbol_filters(index, id, line, options) {
            continue;
        }
        records.push(MatchRecord {
            line,
            column: map.column(m.start),
            start: m.start,
            end: m.end,
            exact: m.exact,
        });
    }
    let total_matches = records.len();

    if options.invert_match {
        if options.files_only {
            if !records.is_empty() {
                return None;
            }
            return Some(FileMatches {
                file: id,
                records: vec![file_level_record()],
                total_matches: 0,
            });
        }
        let inverted = invert_records(info.line_count(), &records)?;
        if options.count_per_file {
            return Some(FileMatches {
                file: id,
                total_matches: inverted.len(),
                records: vec![file_level_record()],
            });
        }
        return Some(FileMatches {
            file: id,
            total_matches: inverted.len(),
            records: inverted,
        });
    }

    // files-only beats count-per-file when both are set.
    if options.files_only {
        if records.is_empty() {
            return None;
        }
        return Some(FileMatches {
            file: id,
            records: vec![file_level_record()],
            total_matches,
        });
    }
    if options.count_per_file {
        if records.is_empty() {
            return None;
        }
        return Some(FileMatches {
            file: id,
            records: vec![file_level_record()],
            total_matches,
        });
    }

    if records.is_empty() {
        return None;
    }
    if options.max_count_per_file > 0 && records.len() > options.max_count_per_file {
        records.truncate(options.max_count_per_file);
    }
    Some(FileMatches {
        file: id,
        records,
        total_matches,
    })
}

/// Inverted output: one record per line with no match. The per-file cap is
/// deliberately ignored here; only the global cap applies.
fn invert_records(line_count: u32, records: &[MatchRecord]) -> Option<Vec<MatchRecord>> {
    let mut matched = vec![false; line_count as usize + 1];
    for record in records {
        if let Some(slot) = matched.get_mut(record.line as usize) {
            *slot = true;
        }
    }
    let inverted: Vec<MatchRecord> = (1..=line_count)
        .filter(|&line| !matched[line as usize])
        .map(|line| MatchRecord {
            line,
            column: 1,
            start: 0,
            end: 0,
            exact: false,
        })
        .collect();
    if inverted.is_empty() {
        None
    } else {
        Some(inverted)
    }
}

#[inline]
fn file_level_record() -> MatchRecord {
    MatchRecord {
        line: 0,
        column: 0,
        start: 0,
        end: 0,
        exact: false,
    }
}

fn passes_symbol_filters(
    index: &dyn SourceIndex,
    id: FileId,
    line: u32,
    options: &SearchOptions,
) -> bool {
    if options.declaration_only && index.symbol_at_line(id, line).is_none() {
        return false;
    }
    if options.usage_only && index.symbol_at_line(id, line).is_some() {
        return false;
    }
    if !options.symbol_types.is_empty() {
        let Some(kind) = enclosing_symbol_kind(index, id, line) else {
            return false;
        };
        if !options.symbol_types.contains(&kind) {
            return false;
        }
    }
    true
}

/// Kind of the innermost symbol whose span covers `line`.
pub(crate) fn enclosing_symbol_kind(
    index: &dyn SourceIndex,
    id: FileId,
    line: u32,
) -> Option<SymbolKind> {
    index
        .file_symbols(id)
        .iter()
        .filter(|s| s.line <= line && line <= s.end_line)
        .max_by_key(|s| s.line)
        .map(|s| s.kind)
}
