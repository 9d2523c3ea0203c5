//! Deterministic additive ranking.
//!
//! Every signal is integral and order-independent, so equal queries against
//! the same generation always produce identical scores. The breakdown is
//! kept per hit for transparency; the total is what sorting uses.

use crate::index::SourceIndex;
use crate::matcher::MatchRecord;
use crate::scanner::is_word_bounded;
use crate::types::{FileInfo, RankingConfig, SearchHit};

const DECLARATION_BONUS: i32 = 500;
const SYMBOL_NAME_BONUS: i32 = 200;
const EXACT_BONUS: i32 = 100;
const WORD_BOUNDARY_BONUS: i32 = 50;
const LINE_START_BONUS: i32 = 25;
const IDENTICAL_BONUS: i32 = 20;
const REQUIRE_SYMBOL_PENALTY: i32 = -1000;

/// Per-signal score breakdown for one hit.
#[derive(Debug, Clone, Default)]
pub struct Score {
    pub total: i32,
    pub declaration_bonus: i32,
    pub symbol_name_bonus: i32,
    pub exact_bonus: i32,
    pub word_bonus: i32,
    pub line_start_bonus: i32,
    pub identical_bonus: i32,
    pub category_adjustment: i32,
    pub symbol_penalty: i32,
    pub match_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Code,
    Documentation,
    Config,
    Other,
}

pub fn categorize_path(path: &str) -> FileCategory {
    let extension = path.rsplit('/').next().and_then(|name| {
        name.rsplit_once('.').map(|(_, ext)| ext)
    });
    match extension {
        Some(
            "go" | "rs" | "py" | "js" | "jsx" | "ts" | "tsx" | "java" | "c" | "cc" | "cpp"
            | "cxx" | "h" | "hpp" | "cs" | "php" | "rb",
        ) => FileCategory::Code,
        Some("md" | "txt" | "rst" | "adoc") => FileCategory::Documentation,
        Some("json" | "yaml" | "yml" | "toml" | "kdl") => FileCategory::Config,
        _ => FileCategory::Other,
    }
}

pub fn is_test_path(path: &str) -> bool {
    path.contains("_test.")
        || path.contains(".test.")
        || path.contains(".spec.")
        || path.contains("test_")
        || path.contains("/test/")
        || path.contains("/tests/")
        || path.contains("/__tests__/")
        || path.contains("/spec/")
}

/// Score one match record. `pattern` is the primary pattern source the
/// identical-bytes signal compares against.
pub fn score_record(
    index: &dyn SourceIndex,
    info: &FileInfo,
    record: &MatchRecord,
    pattern: &str,
    config: &RankingConfig,
) -> Score {
    let matched = &info.content[record.start..record.end.min(info.content.len())];
    let word_bounded = is_word_bounded(&info.content, record.start, matched.len());
    let declaration = index.symbol_at_line(info.id, record.line);

    let declaration_bonus = match declaration {
        Some(symbol) if symbol.kind.is_definition() && symbol.name.as_bytes() == matched => {
            DECLARATION_BONUS
        }
        _ => 0,
    };

    let symbol_name_bonus = if word_bounded && record.exact {
        let matched_name = String::from_utf8_lossy(matched);
        let same_name = index
            .find_symbols_by_name(&matched_name)
            .iter()
            .any(|s| s.file == info.id && s.line == record.line);
        if same_name { SYMBOL_NAME_BONUS } else { 0 }
    } else {
        0
    };

    let exact_bonus = if record.exact { EXACT_BONUS } else { 0 };
    let word_bonus = if word_bounded { WORD_BOUNDARY_BONUS } else { 0 };

    let map = info.line_map();
    let line_start = map.line_start(record.start);
    let first_content = line_start
        + info.content[line_start..]
            .iter()
            .take_while(|b| **b == b' ' || **b == b'\t')
            .count();
    let line_start_bonus = if record.start == first_content {
        LINE_START_BONUS
    } else {
        0
    };

    let identical_bonus = if matched == pattern.as_bytes() {
        IDENTICAL_BONUS
    } else {
        0
    };

    let base_adjustment = match categorize_path(&info.path) {
        FileCategory::Code => config.code_file_boost,
        FileCategory::Documentation => config.doc_file_penalty,
        FileCategory::Config => config.config_file_boost,
        FileCategory::Other => 0,
    };
    let category_adjustment = if is_test_path(&info.path) {
        (base_adjustment as f32 * config.test_file_multiplier) as i32
    } else {
        base_adjustment
    };

    let symbol_penalty = if declaration.is_none() {
        if config.require_symbol {
            REQUIRE_SYMBOL_PENALTY
        } else {
            config.non_symbol_penalty
        }
    } else {
        0
    };

    let total = declaration_bonus
        .saturating_add(symbol_name_bonus)
        .saturating_add(exact_bonus)
        .saturating_add(word_bonus)
        .saturating_add(line_start_bonus)
        .saturating_add(identical_bonus)
        .saturating_add(category_adjustment)
        .saturating_add(symbol_penalty);

    Score {
        total,
        declaration_bonus,
        symbol_name_bonus,
        exact_bonus,
        word_bonus,
        line_start_bonus,
        identical_bonus,
        category_adjustment,
        symbol_penalty,
        match_type: if declaration_bonus > 0 {
            "declaration"
        } else if symbol_name_bonus > 0 {
            "symbol_name"
        } else if exact_bonus > 0 {
            "exact"
        } else {
            "plain"
        },
    }
}

/// Stable order: score descending, then path, line, column ascending.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.column.cmp(&b.column))
    });
}
