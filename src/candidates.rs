//! Candidate selection: prune the caller's file set through the trigram
//! postings before any per-file scanning.
//!
//! A file can contain a literal only if every trigram of that literal lists
//! the file in its posting. Per pattern the literal alternatives are
//! unioned; across patterns (multi-pattern mode) the surviving sets are
//! unioned again. Patterns without a provable literal admit every caller
//! candidate. Caller order is preserved throughout.

use ahash::AHashSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::index::SourceIndex;
use crate::pattern::CompiledQuery;
use crate::trigram::trigrams_of;
use crate::types::{FileId, SearchOptions};

/// Prune `candidates` for `query`, then apply include/exclude globs.
/// The result keeps the caller's order.
pub fn select_candidates(
    index: &dyn SourceIndex,
    candidates: &[FileId],
    query: &CompiledQuery,
    options: &SearchOptions,
) -> Vec<FileId> {
    let pruned = trigram_prune(index, candidates, query);
    let selected = apply_glob_filters(index, pruned, options);
    debug!(
        caller = candidates.len(),
        selected = selected.len(),
        "candidate selection"
    );
    selected
}

fn trigram_prune(
    index: &dyn SourceIndex,
    candidates: &[FileId],
    query: &CompiledQuery,
) -> Vec<FileId> {
    // A single pattern that cannot prefilter admits everything, so the
    // union across patterns is the full candidate set.
    if query
        .patterns()
        .iter()
        .any(|p| p.prefilter_literals.is_empty())
    {
        return candidates.to_vec();
    }

    let mut allowed: AHashSet<FileId> = AHashSet::new();
    for pattern in query.patterns() {
        for literal in &pattern.prefilter_literals {
            match files_containing_literal(index, literal) {
                Some(files) => allowed.extend(files),
                None => {}
            }
        }
    }

    candidates
        .iter()
        .copied()
        .filter(|id| allowed.contains(id))
        .collect()
}

/// Intersection of the posting lists for every trigram of `literal`.
/// `None` means some trigram has no posting at all, so no file qualifies.
fn files_containing_literal(index: &dyn SourceIndex, literal: &[u8]) -> Option<Vec<FileId>> {
    let trigrams = trigrams_of(literal);
    debug_assert!(!trigrams.is_empty(), "prefilter literals are >= 3 bytes");

    let mut postings: SmallVec<[&[FileId]; 8]> = SmallVec::new();
    for trigram in trigrams {
        postings.push(index.files_with_trigram(trigram)?);
    }
    // Start from the scarcest posting so the intersection stays small.
    postings.sort_by_key(|p| p.len());

    let (first, rest) = postings.split_first()?;
    let mut result: Vec<FileId> = first.to_vec();
    for posting in rest {
        if result.is_empty() {
            break;
        }
        result.retain(|id| posting.binary_search(id).is_ok());
    }
    Some(result)
}

fn apply_glob_filters(
    index: &dyn SourceIndex,
    candidates: Vec<FileId>,
    options: &SearchOptions,
) -> Vec<FileId> {
    if options.include_pattern.is_none() && options.exclude_pattern.is_none() {
        return candidates;
    }

    let include = options
        .include_pattern
        .as_deref()
        .map(compile_glob);
    let exclude = options
        .exclude_pattern
        .as_deref()
        .map(compile_glob);

    candidates
        .into_iter()
        .filter(|&id| {
            let Some(path) = index.file_path(id) else {
                return false;
            };
            // Exclude wins over include when both match.
            if let Some(Some(matcher)) = &exclude
                && matcher.is_match(path)
            {
                return false;
            }
            match &include {
                Some(Some(matcher)) => matcher.is_match(path),
                // An unparseable include matches nothing.
                Some(None) => false,
                None => true,
            }
        })
        .collect()
}

fn compile_glob(pattern: &str) -> Option<globset::GlobMatcher> {
    globset::Glob::new(pattern)
        .ok()
        .map(|g| g.compile_matcher())
}
