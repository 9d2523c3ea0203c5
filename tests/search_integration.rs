use std::sync::Arc;

use loupe_search::{
    ClientKind, FileId, InMemoryIndex, Priority, QueryEngine, SearchCoordinator, SearchHit,
    SearchOptions, SearchRequest, SourceIndex, SubIndex, SymbolKind,
};

/// Build an engine over in-memory files; symbols are attached by the
/// caller through the builder when a fixture needs them.
fn engine_over(files: &[(&str, &str)]) -> QueryEngine {
    let mut builder = InMemoryIndex::builder();
    for (path, content) in files {
        builder.add_file(*path, *content);
    }
    QueryEngine::new(Arc::new(builder.build()))
}

fn all_ids(engine: &QueryEngine) -> Vec<FileId> {
    engine.index().all_file_ids()
}

fn result_keys(hits: &[SearchHit]) -> Vec<(String, u32)> {
    hits.iter().map(|h| (h.path.clone(), h.line)).collect()
}

// ── S1: single literal hit with flat context ──────────────────────────

#[test]
fn s1_single_literal_hit() {
    let engine = engine_over(&[("a.go", "line1\nline2 target match here\nline3")]);
    let ids = all_ids(&engine);

    let hits = engine.search("target match", &ids, 0);
    assert_eq!(hits.len(), 1);

    let hit = &hits[0];
    assert_eq!(hit.path, "a.go");
    assert_eq!(hit.line, 2);
    assert_eq!(hit.column, 7);
    assert_eq!(hit.matched, "target match");
    assert_eq!(
        hit.context.lines,
        vec!["line1", "line2 target match here", "line3"]
    );
    assert_eq!(hit.context.matched_lines, vec![2]);
}

// ── S2: function expansion merges body hits ───────────────────────────

#[test]
fn s2_function_expansion_merges() {
    let mut builder = InMemoryIndex::builder();
    let f = builder.add_file(
        "f.go",
        "func example() {\n\ttest := \"first\"\n\ttest = \"second\"\n\ttest = \"third\"\n}",
    );
    builder.add_symbol(f, "example", SymbolKind::Function, 1, 5, 6);
    let engine = QueryEngine::new(Arc::new(builder.build()));
    let ids = all_ids(&engine);

    let hits = engine.search("test", &ids, 0);
    assert_eq!(hits.len(), 1, "one merged result per function");

    let context = &hits[0].context;
    assert_eq!(context.start_line, 1);
    assert_eq!(context.end_line, 5);
    assert_eq!(context.matched_lines, vec![2, 3, 4]);
    assert_eq!(context.match_count, 3);
    assert_eq!(context.block_type, Some("function"));
    assert_eq!(context.block_name.as_deref(), Some("example"));
}

// ── S3: long functions get a centered, capped window ──────────────────

#[test]
fn s3_long_function_centered_cap() {
    let mut content = String::from("func generated() {\n");
    for i in 0..200 {
        if i == 99 {
            content.push_str("\tneedle here\n");
        } else {
            content.push_str(&format!("\tfiller{i}\n"));
        }
    }
    content.push_str("}\n");

    let mut builder = InMemoryIndex::builder();
    let f = builder.add_file("gen.go", content);
    builder.add_symbol(f, "generated", SymbolKind::Function, 1, 202, 6);
    let engine = QueryEngine::new(Arc::new(builder.build()));
    let ids = all_ids(&engine);

    let hits = engine.search("needle", &ids, 0);
    assert_eq!(hits.len(), 1);

    let hit = &hits[0];
    assert_eq!(hit.line, 101, "match at body line 100, absolute 101");
    let context = &hit.context;
    let size = context.end_line - context.start_line + 1;
    assert!(size <= 101, "window capped near max function lines");
    assert!(context.start_line <= hit.line && hit.line <= context.end_line);
    // Centered: meaningful context on both sides of the match.
    assert!(hit.line - context.start_line >= 40);
    assert!(context.end_line - hit.line >= 40);
}

// ── S4: files-only mode ───────────────────────────────────────────────

#[test]
fn s4_files_only() {
    let engine = engine_over(&[
        ("handlers.go", "func handle() {\n\ttest()\n}\n"),
        ("middleware.go", "wrap test chain\n"),
        ("utils.go", "only helper\n"),
    ]);
    let ids = all_ids(&engine);

    let options = SearchOptions {
        files_only: true,
        ..Default::default()
    };
    let hits = engine.search_with_options("test", &ids, &options);

    assert_eq!(
        result_keys(&hits),
        vec![
            ("handlers.go".to_string(), 0),
            ("middleware.go".to_string(), 0)
        ]
    );
    for hit in &hits {
        assert_eq!(hit.line, 0);
        assert!(hit.context.lines.is_empty());
        assert!(hit.matched.is_empty());
    }
}

// ── S5: word boundaries ───────────────────────────────────────────────

#[test]
fn s5_word_boundary() {
    let engine = engine_over(&[(
        "x.go",
        "func test() {}\nfunc testing() {}\nfunc test_helper() {}",
    )]);
    let ids = all_ids(&engine);

    let options = SearchOptions {
        word_boundary: true,
        merge_file_results: false,
        ..Default::default()
    };
    let hits = engine.search_with_options("test", &ids, &options);

    let mut lines: Vec<u32> = hits.iter().map(|h| h.line).collect();
    lines.sort_unstable();
    assert_eq!(lines, vec![1, 3], "testing is not a whole-word match");
}

// ── S6: regex with trigram prefilter across two files ─────────────────

fn function_catalog(file_tag: &str) -> String {
    let mut content = String::new();
    for i in 1..=9 {
        content.push_str(&format!("Function{i}() in {file_tag}\n"));
        for _ in 0..6 {
            content.push_str("padding line\n");
        }
    }
    content
}

#[test]
fn s6_regex_trigram_prefilter() {
    let engine = engine_over(&[
        ("one.go", &function_catalog("one")),
        ("two.go", &function_catalog("two")),
        ("other.go", "no matches at all\n"),
    ]);
    let ids = all_ids(&engine);

    let options = SearchOptions {
        use_regex: true,
        ..Default::default()
    };
    let hits = engine.search_with_options("Function[0-9]+", &ids, &options);

    assert_eq!(hits.len(), 18);
    let keys = result_keys(&hits);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "ascending by path then line");
    assert!(keys.iter().all(|(path, _)| path != "other.go"));
    assert!(hits.iter().all(|h| h.matched.starts_with("Function")));
}

// ── S7: coordinator degradation ───────────────────────────────────────

#[test]
fn s7_symbol_outage_degrades() {
    let mut builder = InMemoryIndex::builder();
    builder.add_file("a.go", "test\n");
    let coordinator = SearchCoordinator::new(Arc::new(builder.build()));
    coordinator.mark_unavailable(SubIndex::Symbol);

    let mut request = SearchRequest::new("test");
    request.options.max_context_lines = 2;
    request.priority = Priority::High;
    request.client = ClientKind::Rpc;
    let result = coordinator.search(request);

    assert!(result.is_ok());
    assert!(result.degraded_mode);
    assert!(result.partial_results);
    assert_eq!(result.unavailable_indexes, vec![SubIndex::Symbol]);
}

// ── Universal laws ────────────────────────────────────────────────────

fn law_corpus() -> QueryEngine {
    engine_over(&[
        ("src/alpha.go", "Test one\ntest two\nretest\n\ttest indent\n"),
        ("src/beta.rs", "fn test() {}\nfn testing() {}\n"),
        ("docs/notes.md", "test notes\nplain line\n"),
    ])
}

#[test]
fn law_positions_are_one_based_and_consistent() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let options = SearchOptions {
        merge_file_results: false,
        ..Default::default()
    };
    let hits = engine.search_with_options("test", &ids, &options);
    assert!(!hits.is_empty());

    for hit in &hits {
        assert!(hit.line >= 1);
        assert!(hit.column >= 1);
        // The matched slice equals the substring at (line, column).
        let line_text = &hit.context.lines[(hit.line - hit.context.start_line) as usize];
        let col = (hit.column - 1) as usize;
        assert_eq!(&line_text[col..col + hit.matched.len()], hit.matched);
    }
}

#[test]
fn law_determinism() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let runs: Vec<Vec<(String, u32, u32, String, i32)>> = (0..3)
        .map(|_| {
            engine
                .search("test", &ids, 0)
                .iter()
                .map(|h| {
                    (
                        h.path.clone(),
                        h.line,
                        h.column,
                        h.matched.clone(),
                        h.score,
                    )
                })
                .collect()
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn law_max_results_monotonic() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let mut last = 0usize;
    for cap in [1, 2, 3, 5, 8, 0] {
        let options = SearchOptions {
            max_results: cap,
            merge_file_results: false,
            ..Default::default()
        };
        let count = engine.search_with_options("test", &ids, &options).len();
        if cap != 0 {
            assert!(count >= last, "cap {cap} returned fewer than cap {last}");
        }
        last = count;
    }
}

#[test]
fn law_empty_pattern_empty_everywhere() {
    let engine = law_corpus();
    let ids = all_ids(&engine);

    for options in [
        SearchOptions::default(),
        SearchOptions {
            files_only: true,
            ..Default::default()
        },
        SearchOptions {
            count_per_file: true,
            ..Default::default()
        },
        SearchOptions {
            invert_match: true,
            ..Default::default()
        },
        SearchOptions {
            use_regex: true,
            ..Default::default()
        },
    ] {
        assert!(engine.search_with_options("", &ids, &options).is_empty());
    }
}

#[test]
fn law_case_insensitive_superset() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let options = SearchOptions {
        merge_file_results: false,
        ..Default::default()
    };
    let sensitive = engine.search_with_options("test", &ids, &options);
    let insensitive = engine.search_with_options(
        "test",
        &ids,
        &SearchOptions {
            case_insensitive: true,
            merge_file_results: false,
            ..Default::default()
        },
    );

    let keys = |hits: &[SearchHit]| -> Vec<(FileId, u32)> {
        let mut keys: Vec<(FileId, u32)> = hits.iter().map(|h| (h.file, h.line)).collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    };
    let sensitive_keys = keys(&sensitive);
    let insensitive_keys = keys(&insensitive);
    for key in &sensitive_keys {
        assert!(insensitive_keys.contains(key));
    }
    assert!(insensitive_keys.len() >= sensitive_keys.len());
}

#[test]
fn law_word_boundary_only_removes() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let plain = engine.search_with_options(
        "test",
        &ids,
        &SearchOptions {
            merge_file_results: false,
            ..Default::default()
        },
    );
    let bounded = engine.search_with_options(
        "test",
        &ids,
        &SearchOptions {
            word_boundary: true,
            merge_file_results: false,
            ..Default::default()
        },
    );

    assert!(bounded.len() <= plain.len());
    let plain_keys: Vec<(FileId, u32, u32)> =
        plain.iter().map(|h| (h.file, h.line, h.column)).collect();
    for hit in &bounded {
        assert!(plain_keys.contains(&(hit.file, hit.line, hit.column)));
    }
}

#[test]
fn law_invert_partitions_lines() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let options = SearchOptions {
        merge_file_results: false,
        ..Default::default()
    };
    let matched = engine.search_with_options("test", &ids, &options);
    let inverted = engine.search_with_options(
        "test",
        &ids,
        &SearchOptions {
            invert_match: true,
            merge_file_results: false,
            ..Default::default()
        },
    );

    let matched_lines: usize = {
        let mut keys: Vec<(FileId, u32)> = matched.iter().map(|h| (h.file, h.line)).collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    };
    let total_lines: u32 = ids
        .iter()
        .map(|&id| engine.index().file_line_count(id))
        .sum();
    assert_eq!(matched_lines + inverted.len(), total_lines as usize);
}

#[test]
fn law_merge_leaves_no_overlap() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let hits = engine.search("test", &ids, 0);

    for (a, b) in hits.iter().zip(hits.iter().skip(1)) {
        if a.file != b.file {
            continue;
        }
        let (first, second) = if a.context.start_line <= b.context.start_line {
            (a, b)
        } else {
            (b, a)
        };
        assert!(
            second.context.start_line > first.context.end_line + 1,
            "ranges in {} overlap or abut",
            a.path
        );
    }
}

#[test]
fn law_context_contains_primary_line() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    for max_context in [0, 1, 3] {
        for hit in engine.search("test", &ids, max_context) {
            assert!(hit.context.start_line <= hit.line && hit.line <= hit.context.end_line);
            assert!(!hit.context.matched_lines.is_empty());
            for &line in &hit.context.matched_lines {
                assert!(hit.context.start_line <= line && line <= hit.context.end_line);
            }
            assert_eq!(
                hit.context.lines.len() as u32,
                hit.context.end_line - hit.context.start_line + 1
            );
        }
    }
}

#[test]
fn law_files_only_one_record_per_path() {
    let engine = law_corpus();
    let ids = all_ids(&engine);
    let hits = engine.search_with_options(
        "test",
        &ids,
        &SearchOptions {
            files_only: true,
            ..Default::default()
        },
    );

    let mut paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
    let before = paths.len();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), before);
    for hit in &hits {
        assert_eq!(hit.line, 0);
        assert!(hit.context.lines.is_empty());
    }
}

// ── Ranking spot checks at the API level ──────────────────────────────

#[test]
fn declaration_outranks_plain_usage() {
    let mut builder = InMemoryIndex::builder();
    let decl = builder.add_file("decl.go", "func target() {\n\tbody()\n}\n");
    builder.add_symbol(decl, "target", SymbolKind::Function, 1, 3, 6);
    builder.add_file("usage.go", "x := target()\n");
    let engine = QueryEngine::new(Arc::new(builder.build()));
    let ids = all_ids(&engine);

    let hits = engine.search("target", &ids, 0);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].path, "decl.go", "declaration sorts first");
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn code_files_outrank_docs() {
    let engine = engine_over(&[
        ("notes.md", "target here\n"),
        ("impl.go", "target here\n"),
    ]);
    let ids = all_ids(&engine);

    let hits = engine.search("target", &ids, 0);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].path, "impl.go");
    assert!(hits[0].score > hits[1].score);
}

// ── Option precedence ─────────────────────────────────────────────────

#[test]
fn files_only_beats_count_per_file() {
    let engine = engine_over(&[("a.go", "test test\n")]);
    let ids = all_ids(&engine);

    let hits = engine.search_with_options(
        "test",
        &ids,
        &SearchOptions {
            files_only: true,
            count_per_file: true,
            ..Default::default()
        },
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].file_match_count, 0,
        "files-only shape wins over count"
    );
}

#[test]
fn patterns_override_positional_pattern() {
    let engine = engine_over(&[("a.go", "alpha\nbeta\n")]);
    let ids = all_ids(&engine);

    let hits = engine.search_with_options(
        "alpha",
        &ids,
        &SearchOptions {
            patterns: vec!["beta".to_string()],
            merge_file_results: false,
            ..Default::default()
        },
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].line, 2);
}
