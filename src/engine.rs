//! Query execution: the read-only operations the coordinator and hosts
//! call. Each operation shares one inner pipeline (compile, select
//! candidates, assemble matches, extract context, merge, rank) and
//! differs only in how the resulting hit stream is shaped.

use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use tracing::debug;

use crate::candidates::select_candidates;
use crate::context::{self, WindowSpec};
use crate::control::QueryControl;
use crate::error::{Error, Result};
use crate::index::SourceIndex;
use crate::matcher::{self, FileMatches};
use crate::merge::merge_windows;
use crate::pattern::CompiledQuery;
use crate::score::{self, is_test_path};
use crate::types::{
    DetailedHit, ExtractedContext, FileId, RankingConfig, SearchHit, SearchOptions, SymbolCrumb,
    SymbolKind,
};

/// Aggregate numbers for one pattern across the candidate set.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub pattern: String,
    pub total_matches: usize,
    pub files_with_matches: usize,
    pub test_file_matches: usize,
    /// Enclosing-symbol kinds of match lines, most frequent first.
    pub symbol_kind_counts: Vec<(SymbolKind, usize)>,
    /// Per-file match counts, most matches first.
    pub file_distribution: Vec<(String, usize)>,
    /// Per-directory match counts, most matches first.
    pub dir_distribution: Vec<(String, usize)>,
    pub hot_spots: Vec<HotSpot>,
}

/// One of the most-matched files for a pattern.
#[derive(Debug, Clone)]
pub struct HotSpot {
    pub path: String,
    pub matches: usize,
    pub first_line: u32,
}

/// Combined stats for a multi-pattern run.
#[derive(Debug, Clone, Default)]
pub struct MultiSearchStats {
    pub per_pattern: Vec<SearchStats>,
    /// Paths containing at least two of the patterns, ascending.
    pub co_occurring_files: Vec<String>,
    /// Paths containing every pattern, ascending.
    pub common_files: Vec<String>,
    pub total_search_time_ms: u64,
}

const HOT_SPOT_LIMIT: usize = 10;

/// The query runner. All operations are read-only and re-entrant; the only
/// mutable state is the last-error slot, cleared at the start of every
/// public call.
pub struct QueryEngine {
    index: Arc<dyn SourceIndex>,
    ranking: RankingConfig,
    last_error: Mutex<Option<Error>>,
}

impl QueryEngine {
    pub fn new(index: Arc<dyn SourceIndex>) -> Self {
        Self::with_ranking(index, RankingConfig::default())
    }

    pub fn with_ranking(index: Arc<dyn SourceIndex>, ranking: RankingConfig) -> Self {
        Self {
            index,
            ranking,
            last_error: Mutex::new(None),
        }
    }

    #[inline]
    pub fn index(&self) -> &Arc<dyn SourceIndex> {
        &self.index
    }

    /// The error recorded by the previous public call, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.last_error.lock().clone()
    }

    pub fn search(
        &self,
        pattern: &str,
        candidates: &[FileId],
        max_context_lines: u32,
    ) -> Vec<SearchHit> {
        let options = SearchOptions {
            max_context_lines,
            ..Default::default()
        };
        self.search_with_options(pattern, candidates, &options)
    }

    pub fn search_with_options(
        &self,
        pattern: &str,
        candidates: &[FileId],
        options: &SearchOptions,
    ) -> Vec<SearchHit> {
        self.clear_error();
        match self.run(pattern, candidates, options, &QueryControl::unbounded()) {
            Ok(hits) => hits,
            Err(error) => {
                self.record_error(error);
                Vec::new()
            }
        }
    }

    /// Like [`search`], with the enclosing-scope chain attached to each hit.
    pub fn search_detailed(
        &self,
        pattern: &str,
        candidates: &[FileId],
        max_context_lines: u32,
    ) -> Vec<DetailedHit> {
        let hits = self.search(pattern, candidates, max_context_lines);
        hits.into_iter()
            .map(|hit| {
                let breadcrumbs = self.breadcrumbs_for(hit.file, hit.line);
                DetailedHit { hit, breadcrumbs }
            })
            .collect()
    }

    pub fn search_stats(
        &self,
        pattern: &str,
        candidates: &[FileId],
        options: &SearchOptions,
    ) -> SearchStats {
        self.clear_error();
        match self.collect_stats(pattern, candidates, options) {
            Ok(stats) => stats,
            Err(error) => {
                self.record_error(error);
                SearchStats {
                    pattern: pattern.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    pub fn multi_search_stats(
        &self,
        patterns: &[String],
        candidates: &[FileId],
        options: &SearchOptions,
    ) -> MultiSearchStats {
        self.clear_error();
        let started = Instant::now();

        let mut per_pattern = Vec::with_capacity(patterns.len());
        let mut file_sets: Vec<AHashSet<String>> = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let single = SearchOptions {
                patterns: Vec::new(),
                ..options.clone()
            };
            match self.collect_stats(pattern, candidates, &single) {
                Ok(stats) => {
                    file_sets.push(stats.file_distribution.iter().map(|(p, _)| p.clone()).collect());
                    per_pattern.push(stats);
                }
                Err(error) => {
                    self.record_error(error);
                    file_sets.push(AHashSet::new());
                    per_pattern.push(SearchStats {
                        pattern: pattern.clone(),
                        ..Default::default()
                    });
                }
            }
        }

        let mut seen_in: AHashMap<&str, usize> = AHashMap::new();
        for set in &file_sets {
            for path in set {
                *seen_in.entry(path.as_str()).or_default() += 1;
            }
        }
        let mut co_occurring_files: Vec<String> = seen_in
            .iter()
            .filter(|&(_, &count)| count >= 2)
            .map(|(&path, _)| path.to_string())
            .collect();
        co_occurring_files.sort();
        let mut common_files: Vec<String> = seen_in
            .iter()
            .filter(|&(_, &count)| count == patterns.len() && !patterns.is_empty())
            .map(|(&path, _)| path.to_string())
            .collect();
        common_files.sort();

        MultiSearchStats {
            per_pattern,
            co_occurring_files,
            common_files,
            total_search_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    // ── Inner pipeline ─────────────────────────────────────────────────

    /// Full pipeline with explicit runtime control; the coordinator calls
    /// this directly with its own deadline and cancellation token.
    pub(crate) fn run(
        &self,
        pattern: &str,
        candidates: &[FileId],
        options: &SearchOptions,
        control: &QueryControl,
    ) -> Result<Vec<SearchHit>> {
        let started = Instant::now();
        let query = CompiledQuery::compile(pattern, options)?;
        let selected = select_candidates(self.index.as_ref(), candidates, &query, options);
        let files = matcher::assemble(self.index.as_ref(), &selected, &query, options, control)?;

        let mut hits: Vec<SearchHit> = Vec::new();
        for file_matches in &files {
            control.check()?;
            self.emit_file_hits(&query, file_matches, options, control, &mut hits)?;
        }

        if self.ranking.enabled {
            score::sort_hits(&mut hits);
        }

        debug!(
            pattern,
            candidates = candidates.len(),
            hits = hits.len(),
            completed_in = ?started.elapsed(),
            "search complete",
        );
        Ok(hits)
    }

    fn emit_file_hits(
        &self,
        query: &CompiledQuery,
        file_matches: &FileMatches,
        options: &SearchOptions,
        control: &QueryControl,
        hits: &mut Vec<SearchHit>,
    ) -> Result<()> {
        let Some(info) = self.index.file_info(file_matches.file) else {
            return Ok(());
        };

        // File-level record: files-only or count-per-file mode.
        if file_matches.records.first().is_some_and(|r| r.line == 0) {
            hits.push(SearchHit {
                file: file_matches.file,
                path: info.path.clone(),
                line: 0,
                column: 0,
                matched: String::new(),
                context: ExtractedContext::default(),
                file_match_count: if options.count_per_file && !options.files_only {
                    file_matches.total_matches
                } else {
                    0
                },
                score: 0,
            });
            return Ok(());
        }

        let match_lines: Vec<u32> = file_matches.records.iter().map(|r| r.line).collect();

        let mut windows: Vec<WindowSpec> = Vec::with_capacity(file_matches.records.len());
        for record in &file_matches.records {
            control.check()?;
            windows.push(context::extract_window(info, record.line, options));
        }
        let windows = if options.merge_file_results {
            merge_windows(windows)
        } else {
            windows
        };

        for window in windows {
            let representative = file_matches
                .records
                .iter()
                .find(|r| r.line == window.range.primary_line)
                .unwrap_or(&file_matches.records[0]);

            let extracted = context::build_context(
                info,
                window.range.start,
                window.range.end,
                &match_lines,
                window.block_type,
                window.block_name.clone(),
            );
            let matched = String::from_utf8_lossy(
                &info.content[representative.start..representative.end.min(info.content.len())],
            )
            .into_owned();
            let score = if self.ranking.enabled && !options.invert_match {
                score::score_record(
                    self.index.as_ref(),
                    info,
                    representative,
                    query.primary_source(),
                    &self.ranking,
                )
                .total
            } else {
                0
            };

            hits.push(SearchHit {
                file: file_matches.file,
                path: info.path.clone(),
                line: window.range.primary_line,
                column: representative.column,
                matched,
                context: extracted,
                file_match_count: 0,
                score,
            });
        }
        Ok(())
    }

    fn collect_stats(
        &self,
        pattern: &str,
        candidates: &[FileId],
        options: &SearchOptions,
    ) -> Result<SearchStats> {
        // Stats always count individual matches; file-level shaping modes
        // would hide them.
        let options = SearchOptions {
            files_only: false,
            count_per_file: false,
            ..options.clone()
        };
        let query = CompiledQuery::compile(pattern, &options)?;
        let selected = select_candidates(self.index.as_ref(), candidates, &query, &options);
        let files = matcher::assemble(
            self.index.as_ref(),
            &selected,
            &query,
            &options,
            &QueryControl::unbounded(),
        )?;

        let mut total_matches = 0usize;
        let mut test_file_matches = 0usize;
        let mut kind_counts: AHashMap<SymbolKind, usize> = AHashMap::new();
        let mut file_distribution: Vec<(String, usize)> = Vec::with_capacity(files.len());
        let mut dir_counts: AHashMap<String, usize> = AHashMap::new();
        let mut hot_spots: Vec<HotSpot> = Vec::with_capacity(files.len());

        for file_matches in &files {
            let Some(info) = self.index.file_info(file_matches.file) else {
                continue;
            };
            let count = file_matches.records.len();
            total_matches += count;
            if is_test_path(&info.path) {
                test_file_matches += count;
            }
            for record in &file_matches.records {
                if let Some(kind) =
                    matcher::enclosing_symbol_kind(self.index.as_ref(), file_matches.file, record.line)
                {
                    *kind_counts.entry(kind).or_default() += 1;
                }
            }
            file_distribution.push((info.path.clone(), count));
            let dir = info
                .path
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_default();
            *dir_counts.entry(dir).or_default() += count;
            hot_spots.push(HotSpot {
                path: info.path.clone(),
                matches: count,
                first_line: file_matches.records.first().map_or(0, |r| r.line),
            });
        }

        let files_with_matches = file_distribution.len();
        file_distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut symbol_kind_counts: Vec<(SymbolKind, usize)> = kind_counts.into_iter().collect();
        symbol_kind_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut dir_distribution: Vec<(String, usize)> = dir_counts.into_iter().collect();
        dir_distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        hot_spots.sort_by(|a, b| b.matches.cmp(&a.matches).then_with(|| a.path.cmp(&b.path)));
        hot_spots.truncate(HOT_SPOT_LIMIT);

        Ok(SearchStats {
            pattern: pattern.to_string(),
            total_matches,
            files_with_matches,
            test_file_matches,
            symbol_kind_counts,
            file_distribution,
            dir_distribution,
            hot_spots,
        })
    }

    /// Enclosing symbols of `line`, outermost first.
    fn breadcrumbs_for(&self, file: FileId, line: u32) -> Vec<SymbolCrumb> {
        if line == 0 {
            return Vec::new();
        }
        let mut enclosing: Vec<&crate::types::EnhancedSymbol> = self
            .index
            .file_symbols(file)
            .iter()
            .filter(|s| s.line <= line && line <= s.end_line)
            .collect();
        enclosing.sort_by_key(|s| s.line);
        enclosing
            .into_iter()
            .map(|s| SymbolCrumb {
                name: s.name.clone(),
                kind: s.kind,
                line: s.line,
            })
            .collect()
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    fn record_error(&self, error: Error) {
        debug!(%error, "query failed");
        *self.last_error.lock() = Some(error);
    }
}
