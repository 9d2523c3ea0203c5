//! loupe-search - structured code search core
//!
//! A fast, in-memory query engine layered over a pre-built file index.
//! Given indexed file contents, line-offset tables, symbols, blocks, and
//! trigram postings, it answers literal / regex / multi-pattern / inverted /
//! files-only / count-only queries and returns ranked hits with structural
//! context, without ever touching the filesystem.
//!
//! # State management
//!
//! All state is instance-based. Hosts build an [`InMemoryIndex`] (or
//! implement [`SourceIndex`] over their own storage), hand an `Arc` of it to
//! a [`QueryEngine`] for direct embedding or to a [`SearchCoordinator`] when
//! queries must be serialized against background re-indexing. Multiple
//! independent instances can coexist in the same process.

pub mod candidates;
pub mod context;
pub mod control;
pub mod coordinator;
pub mod engine;
mod error;
pub mod index;
pub mod line_map;
pub mod matcher;
pub mod merge;
pub mod pattern;
pub mod scanner;
pub mod score;
pub mod trigram;
pub mod types;

pub use control::{CancelToken, QueryControl};
pub use coordinator::{
    ClientKind, CoordinatorConfig, Priority, QueueStats, SearchCoordinator, SearchRequest,
    SearchResult, SubIndex,
};
pub use engine::{HotSpot, MultiSearchStats, QueryEngine, SearchStats};
pub use error::{Error, Result};
pub use index::{InMemoryIndex, IndexBuilder, SourceIndex};
pub use line_map::LineMap;
pub use types::{
    BlockBoundary, BlockKind, DetailedHit, EnhancedSymbol, ExtractedContext, FileId, FileInfo,
    HitLineRange, Match, RankingConfig, SearchHit, SearchOptions, SymbolCrumb, SymbolKind,
};
