//! The read-only indexer interface the query core consumes, plus an
//! in-memory reference implementation.
//!
//! The real indexer (parsing, symbol extraction, posting construction) is an
//! external collaborator; the core only ever reads through [`SourceIndex`].
//! [`InMemoryIndex`] exists so hosts, tests, and benches can assemble one
//! generation from `(path, content, symbols, blocks)` tuples; it computes
//! line-offset tables and trigram postings mechanically and performs no
//! parsing of its own.

use ahash::{AHashMap, AHashSet};

use crate::line_map::compute_line_offsets;
use crate::pattern;
use crate::trigram::Trigram;
use crate::types::{BlockBoundary, BlockKind, EnhancedSymbol, FileId, FileInfo, SymbolKind};

/// Read-only view of one index generation. All large buffers stay owned by
/// the implementation; queries borrow them for their duration.
pub trait SourceIndex: Send + Sync {
    /// Dense ids of every indexed file, in id order.
    fn all_file_ids(&self) -> Vec<FileId>;

    fn file_info(&self, id: FileId) -> Option<&FileInfo>;

    fn file_content(&self, id: FileId) -> Option<&[u8]> {
        self.file_info(id).map(|f| f.content.as_slice())
    }

    fn file_path(&self, id: FileId) -> Option<&str> {
        self.file_info(id).map(|f| f.path.as_str())
    }

    fn file_line_offsets(&self, id: FileId) -> Option<&[usize]> {
        self.file_info(id).map(|f| f.line_offsets.as_slice())
    }

    /// One 1-based line, newline excluded.
    fn file_line(&self, id: FileId, line: u32) -> Option<&[u8]> {
        self.file_info(id).and_then(|f| f.line_map().line(line))
    }

    /// Lines `start..=end` (1-based, clamped), newline excluded.
    fn file_lines(&self, id: FileId, start: u32, end: u32) -> Vec<&[u8]> {
        let Some(info) = self.file_info(id) else {
            return Vec::new();
        };
        let map = info.line_map();
        let end = end.min(map.line_count());
        if start == 0 || start > end {
            return Vec::new();
        }
        (start..=end).filter_map(|n| map.line(n)).collect()
    }

    fn file_line_count(&self, id: FileId) -> u32 {
        self.file_info(id).map_or(0, |f| f.line_count())
    }

    fn file_symbols(&self, id: FileId) -> &[EnhancedSymbol] {
        self.file_info(id).map_or(&[], |f| f.symbols.as_slice())
    }

    /// The symbol declared at exactly `line`, if any.
    fn symbol_at_line(&self, id: FileId, line: u32) -> Option<&EnhancedSymbol> {
        self.file_symbols(id).iter().find(|s| s.line == line)
    }

    fn file_blocks(&self, id: FileId) -> &[BlockBoundary] {
        self.file_info(id).map_or(&[], |f| f.blocks.as_slice())
    }

    fn find_symbols_by_name(&self, name: &str) -> Vec<&EnhancedSymbol>;

    /// Sorted posting list for a trigram; `None` when no file contains it.
    fn files_with_trigram(&self, trigram: Trigram) -> Option<&[FileId]>;

    /// Literal strings (>= 3 chars) the posting index can prune with for
    /// this pattern. Hosts override only to cache.
    fn literals_for_pattern(&self, pattern: &str, use_regex: bool) -> Vec<String> {
        pattern::required_literals(pattern, use_regex)
    }
}

/// One immutable index generation held fully in memory.
pub struct InMemoryIndex {
    files: Vec<FileInfo>,
    postings: AHashMap<Trigram, Vec<FileId>>,
    symbols_by_name: AHashMap<String, Vec<(FileId, usize)>>,
}

impl InMemoryIndex {
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl SourceIndex for InMemoryIndex {
    fn all_file_ids(&self) -> Vec<FileId> {
        (0..self.files.len() as u32).map(FileId).collect()
    }

    #[inline]
    fn file_info(&self, id: FileId) -> Option<&FileInfo> {
        self.files.get(id.as_usize())
    }

    fn find_symbols_by_name(&self, name: &str) -> Vec<&EnhancedSymbol> {
        match self.symbols_by_name.get(name) {
            Some(entries) => entries
                .iter()
                .filter_map(|&(file, idx)| {
                    self.files.get(file.as_usize()).map(|f| &f.symbols[idx])
                })
                .collect(),
            None => Vec::new(),
        }
    }

    fn files_with_trigram(&self, trigram: Trigram) -> Option<&[FileId]> {
        self.postings.get(&trigram).map(Vec::as_slice)
    }
}

/// Assembles one [`InMemoryIndex`] generation. Files get dense ids in
/// insertion order; symbols and blocks are attached to already-added files.
#[derive(Default)]
pub struct IndexBuilder {
    files: Vec<FileInfo>,
    next_symbol_id: u32,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> FileId {
        let id = FileId(self.files.len() as u32);
        let content = content.into();
        let line_offsets = compute_line_offsets(&content);
        self.files.push(FileInfo {
            id,
            path: path.into(),
            content,
            line_offsets,
            symbols: Vec::new(),
            blocks: Vec::new(),
        });
        id
    }

    /// Attach a symbol produced by the (external) parser. Lines are 1-based
    /// inclusive.
    pub fn add_symbol(
        &mut self,
        file: FileId,
        name: impl Into<String>,
        kind: SymbolKind,
        line: u32,
        end_line: u32,
        column: u32,
    ) -> &mut Self {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        if let Some(info) = self.files.get_mut(file.as_usize()) {
            info.symbols.push(EnhancedSymbol {
                id,
                name: name.into(),
                kind,
                file,
                line,
                end_line: end_line.max(line),
                column,
            });
        }
        self
    }

    /// Attach a block boundary (0-based inclusive lines).
    pub fn add_block(
        &mut self,
        file: FileId,
        kind: BlockKind,
        name: impl Into<String>,
        start: u32,
        end: u32,
    ) -> &mut Self {
        if let Some(info) = self.files.get_mut(file.as_usize()) {
            info.blocks.push(BlockBoundary {
                kind,
                name: name.into(),
                start,
                end: end.max(start),
            });
        }
        self
    }

    pub fn build(mut self) -> InMemoryIndex {
        let mut postings: AHashMap<Trigram, Vec<FileId>> = AHashMap::new();
        for info in &mut self.files {
            info.symbols.sort_by_key(|s| (s.line, s.column));

            let mut seen: AHashSet<Trigram> = AHashSet::new();
            for window in info.content.windows(3) {
                let trigram = Trigram([window[0], window[1], window[2]]);
                if seen.insert(trigram) {
                    // Files are visited in id order, so lists stay sorted.
                    postings.entry(trigram).or_default().push(info.id);
                }
            }
        }

        let mut symbols_by_name: AHashMap<String, Vec<(FileId, usize)>> = AHashMap::new();
        for info in &self.files {
            for (idx, symbol) in info.symbols.iter().enumerate() {
                symbols_by_name
                    .entry(symbol.name.clone())
                    .or_default()
                    .push((info.id, idx));
            }
        }

        InMemoryIndex {
            files: self.files,
            postings,
            symbols_by_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_dense_ids() {
        let mut builder = InMemoryIndex::builder();
        let a = builder.add_file("a.go", "alpha\n");
        let b = builder.add_file("b.go", "beta\n");
        let index = builder.build();

        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
        assert_eq!(index.all_file_ids(), vec![FileId(0), FileId(1)]);
        assert_eq!(index.file_count(), 2);
        assert_eq!(index.file_path(a), Some("a.go"));
        assert_eq!(index.file_line_count(a), 2);
    }

    #[test]
    fn postings_are_sorted_and_deduplicated() {
        let mut builder = InMemoryIndex::builder();
        let a = builder.add_file("a.go", "test test test");
        let b = builder.add_file("b.go", "no match");
        let c = builder.add_file("c.go", "another test");
        let index = builder.build();

        let posting = index.files_with_trigram(Trigram(*b"tes")).unwrap();
        assert_eq!(posting, &[a, c]);
        assert!(index.files_with_trigram(Trigram(*b"zzz")).is_none());
        let _ = b;
    }

    #[test]
    fn symbol_lookup_by_line_and_name() {
        let mut builder = InMemoryIndex::builder();
        let f = builder.add_file("f.go", "func example() {\n\tbody\n}\n");
        builder.add_symbol(f, "example", SymbolKind::Function, 1, 3, 6);
        let index = builder.build();

        let symbol = index.symbol_at_line(f, 1).unwrap();
        assert_eq!(symbol.name, "example");
        assert_eq!(symbol.end_line, 3);
        assert!(index.symbol_at_line(f, 2).is_none());

        let found = index.find_symbols_by_name("example");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file, f);
    }

    #[test]
    fn block_boundaries_round_trip() {
        let mut builder = InMemoryIndex::builder();
        let f = builder.add_file("f.py", "class A:\n    def m(self):\n        pass\n");
        builder.add_block(f, BlockKind::Class, "A", 0, 2);
        builder.add_block(f, BlockKind::Function, "m", 1, 2);
        let index = builder.build();

        let blocks = index.file_blocks(f);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "A");
        assert_eq!(blocks[0].kind, BlockKind::Class);
        assert_eq!((blocks[1].start, blocks[1].end), (1, 2));
        assert!(index.file_blocks(FileId(9)).is_empty());
    }

    #[test]
    fn file_lines_clamps_range() {
        let mut builder = InMemoryIndex::builder();
        let f = builder.add_file("f.go", "one\ntwo\nthree");
        let index = builder.build();

        let lines = index.file_lines(f, 2, 99);
        assert_eq!(lines, vec![&b"two"[..], &b"three"[..]]);
        assert!(index.file_lines(f, 0, 2).is_empty());
        assert!(index.file_lines(f, 3, 2).is_empty());
    }

    #[test]
    fn literals_for_pattern_delegates_to_extraction() {
        let index = InMemoryIndex::builder().build();
        assert_eq!(index.literals_for_pattern("target", false), vec!["target"]);
        assert_eq!(
            index.literals_for_pattern("Function[0-9]+", true),
            vec!["Function"]
        );
        assert!(index.literals_for_pattern("ab", false).is_empty());
    }

    #[test]
    fn unknown_file_is_none() {
        let index = InMemoryIndex::builder().build();
        assert!(index.file_info(FileId(7)).is_none());
        assert_eq!(index.file_line_count(FileId(7)), 0);
        assert!(index.file_symbols(FileId(7)).is_empty());
    }
}
