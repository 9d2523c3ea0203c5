use crate::line_map::LineMap;

/// Dense file identifier assigned by the index builder in insertion order.
/// Stable for the lifetime of one index generation; never reused across
/// generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FileId(pub u32);

impl FileId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Type,
    Variable,
    Constant,
    Import,
    Other,
}

impl SymbolKind {
    /// Kinds whose declaration line carries the strongest ranking signal and
    /// whose span drives function-aware context expansion.
    #[inline]
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            SymbolKind::Function
                | SymbolKind::Method
                | SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Type
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Type => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Import => "import",
            SymbolKind::Other => "other",
        }
    }
}

/// A symbol as produced by the indexer. Lines are 1-based and inclusive;
/// `end_line >= line` always holds for function-like kinds.
#[derive(Debug, Clone)]
pub struct EnhancedSymbol {
    pub id: u32,
    pub name: String,
    pub kind: SymbolKind,
    pub file: FileId,
    pub line: u32,
    pub end_line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Function,
    Class,
    Block,
}

/// A syntactic grouping detected by the indexer. Lines are 0-based here,
/// matching the indexer's internal representation.
#[derive(Debug, Clone)]
pub struct BlockBoundary {
    pub kind: BlockKind,
    pub name: String,
    pub start: u32,
    pub end: u32,
}

/// Everything the core knows about one indexed file. Owned by the index;
/// queries only ever borrow it for their duration.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub id: FileId,
    pub path: String,
    pub content: Vec<u8>,
    /// Ascending byte offsets of line starts; `line_offsets[0] == 0`.
    pub line_offsets: Vec<usize>,
    /// Ordered by declaration line.
    pub symbols: Vec<EnhancedSymbol>,
    pub blocks: Vec<BlockBoundary>,
}

impl FileInfo {
    #[inline]
    pub fn line_map(&self) -> LineMap<'_> {
        LineMap::new(&self.content, &self.line_offsets)
    }

    #[inline]
    pub fn line_count(&self) -> u32 {
        self.line_offsets.len() as u32
    }
}

/// A byte span within a file's content. `exact` records whether the bytes
/// matched the pattern case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub exact: bool,
}

impl Match {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A context window attributed to one primary match line. 1-based inclusive;
/// `start <= primary_line <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitLineRange {
    pub start: u32,
    pub end: u32,
    pub primary_line: u32,
    pub is_function: bool,
    pub score: i32,
}

/// The lines surrounding a hit, plus which of them contain matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContext {
    pub start_line: u32,
    pub end_line: u32,
    pub lines: Vec<String>,
    /// 1-based line numbers inside `[start_line, end_line]` with >= 1 match.
    pub matched_lines: Vec<u32>,
    pub match_count: usize,
    pub block_type: Option<&'static str>,
    pub block_name: Option<String>,
}

/// One ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub file: FileId,
    pub path: String,
    /// Primary line, 1-based. 0 for file-level records (files-only / count).
    pub line: u32,
    pub column: u32,
    pub matched: String,
    pub context: ExtractedContext,
    /// Total matches in the file; populated in count-per-file mode.
    pub file_match_count: usize,
    pub score: i32,
}

/// One entry of the enclosing-scope chain attached to a detailed hit.
#[derive(Debug, Clone)]
pub struct SymbolCrumb {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
}

/// A hit plus its breadcrumb chain (outermost enclosing scope first).
#[derive(Debug, Clone)]
pub struct DetailedHit {
    pub hit: SearchHit,
    pub breadcrumbs: Vec<SymbolCrumb>,
}

/// The full option matrix for one query. Plain value, no hidden state.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub case_insensitive: bool,
    pub use_regex: bool,
    pub word_boundary: bool,
    /// Context window half-size. 0 selects function/block expansion.
    pub max_context_lines: u32,
    /// Global cap on returned hits; 0 = unlimited.
    pub max_results: usize,
    /// Per-file cap; ignored when `invert_match` is set. 0 = unlimited.
    pub max_count_per_file: usize,
    pub invert_match: bool,
    pub files_only: bool,
    pub count_per_file: bool,
    /// Multi-pattern union; overrides the positional pattern when non-empty.
    pub patterns: Vec<String>,
    pub include_pattern: Option<String>,
    pub exclude_pattern: Option<String>,
    /// When non-empty, keep only hits whose enclosing symbol kind is listed.
    pub symbol_types: Vec<SymbolKind>,
    pub declaration_only: bool,
    pub usage_only: bool,
    pub exclude_comments: bool,
    pub merge_file_results: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            use_regex: false,
            word_boundary: false,
            max_context_lines: 0,
            max_results: 0,
            max_count_per_file: 0,
            invert_match: false,
            files_only: false,
            count_per_file: false,
            patterns: Vec::new(),
            include_pattern: None,
            exclude_pattern: None,
            symbol_types: Vec::new(),
            declaration_only: false,
            usage_only: false,
            exclude_comments: false,
            merge_file_results: true,
        }
    }
}

/// Ranking knobs. Defaults follow the documented scoring model.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingConfig {
    pub enabled: bool,
    pub code_file_boost: i32,
    pub doc_file_penalty: i32,
    pub config_file_boost: i32,
    /// Applied to the file-category adjustment on test paths.
    pub test_file_multiplier: f32,
    pub non_symbol_penalty: i32,
    /// When set, hits without a symbol on the match line score -1000.
    pub require_symbol: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_file_boost: 50,
            doc_file_penalty: -20,
            config_file_boost: 10,
            test_file_multiplier: 0.8,
            non_symbol_penalty: -30,
            require_symbol: false,
        }
    }
}
