//! Per-file merging of context windows.
//!
//! Overlapping or adjacent windows collapse into one; the representative
//! primary line is always the first contributing window's. Afterwards,
//! non-function windows fully contained in a function window that
//! represents a different primary line are dropped, since the function window
//! already shows that context.

use crate::context::WindowSpec;

/// Merge `windows` in place-order for one file. Input order is the match
/// order (ascending primary line); output is sorted by start line.
pub fn merge_windows(mut windows: Vec<WindowSpec>) -> Vec<WindowSpec> {
    if windows.len() <= 1 {
        return windows;
    }
    windows.sort_by(|a, b| {
        a.range
            .start
            .cmp(&b.range.start)
            .then(a.range.primary_line.cmp(&b.range.primary_line))
    });

    let mut merged: Vec<WindowSpec> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            // Adjacent counts as overlapping.
            Some(current) if window.range.start <= current.range.end + 1 => {
                current.range.end = current.range.end.max(window.range.end);
                if window.range.is_function && !current.range.is_function {
                    current.range.is_function = true;
                    current.block_type = window.block_type;
                    current.block_name = window.block_name;
                }
            }
            _ => merged.push(window),
        }
    }

    drop_contained(merged)
}

fn drop_contained(windows: Vec<WindowSpec>) -> Vec<WindowSpec> {
    let functions: Vec<(u32, u32, u32)> = windows
        .iter()
        .filter(|w| w.range.is_function)
        .map(|w| (w.range.start, w.range.end, w.range.primary_line))
        .collect();
    if functions.is_empty() {
        return windows;
    }

    windows
        .into_iter()
        .filter(|w| {
            if w.range.is_function {
                return true;
            }
            !functions.iter().any(|&(start, end, primary)| {
                start <= w.range.start && w.range.end <= end && primary != w.range.primary_line
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HitLineRange;

    fn window(start: u32, end: u32, primary: u32, is_function: bool) -> WindowSpec {
        WindowSpec {
            range: HitLineRange {
                start,
                end,
                primary_line: primary,
                is_function,
                score: 0,
            },
            block_type: is_function.then_some("function"),
            block_name: None,
        }
    }

    fn spans(windows: &[WindowSpec]) -> Vec<(u32, u32, u32)> {
        windows
            .iter()
            .map(|w| (w.range.start, w.range.end, w.range.primary_line))
            .collect()
    }

    #[test]
    fn overlapping_windows_merge() {
        let merged = merge_windows(vec![window(1, 5, 2, false), window(4, 8, 6, false)]);
        assert_eq!(spans(&merged), vec![(1, 8, 2)]);
    }

    #[test]
    fn adjacent_windows_merge() {
        let merged = merge_windows(vec![window(1, 3, 2, false), window(4, 6, 5, false)]);
        assert_eq!(spans(&merged), vec![(1, 6, 2)]);
    }

    #[test]
    fn gap_keeps_windows_apart() {
        let merged = merge_windows(vec![window(1, 3, 2, false), window(5, 7, 6, false)]);
        assert_eq!(spans(&merged), vec![(1, 3, 2), (5, 7, 6)]);

        // Merge law: no two ranges overlap or abut.
        for pair in merged.windows(2) {
            assert!(pair[1].range.start > pair[0].range.end + 1);
        }
    }

    #[test]
    fn identical_function_windows_collapse() {
        let merged = merge_windows(vec![
            window(1, 5, 2, true),
            window(1, 5, 3, true),
            window(1, 5, 4, true),
        ]);
        assert_eq!(spans(&merged), vec![(1, 5, 2)]);
        assert!(merged[0].range.is_function);
    }

    #[test]
    fn function_flag_propagates_on_merge() {
        let merged = merge_windows(vec![window(1, 4, 2, false), window(3, 9, 5, true)]);
        assert_eq!(spans(&merged), vec![(1, 9, 2)]);
        assert!(merged[0].range.is_function);
        assert_eq!(merged[0].block_type, Some("function"));
    }

    #[test]
    fn contained_non_function_with_other_primary_is_dropped() {
        let merged = merge_windows(vec![window(1, 20, 3, true), window(25, 30, 27, false)]);
        assert_eq!(merged.len(), 2);

        // A separate non-function window inside the function span with a
        // different primary line would be dropped; build one artificially.
        let dropped = drop_contained(vec![window(1, 20, 3, true), window(5, 8, 7, false)]);
        assert_eq!(spans(&dropped), vec![(1, 20, 3)]);
    }

    #[test]
    fn contained_window_with_same_primary_survives() {
        let kept = drop_contained(vec![window(1, 20, 7, true), window(5, 8, 7, false)]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn single_window_is_untouched() {
        let merged = merge_windows(vec![window(3, 9, 4, false)]);
        assert_eq!(spans(&merged), vec![(3, 9, 4)]);
    }
}
