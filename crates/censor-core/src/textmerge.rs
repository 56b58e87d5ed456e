//! Text merging
//!
//! Several short texts can be reviewed as one submission: they are joined
//! with a separator and the byte range of every part is recorded so a
//! violation found in the merged text can be traced back to its part.

use serde::{Deserialize, Serialize};

/// Default budget for a merged text, in bytes
pub const DEFAULT_MAX_LEN: usize = 1800;

/// Default separator between merged parts
pub const DEFAULT_SEPARATOR: &str = "\n---\n";

/// How parts are merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMergeStrategy {
    /// Maximum merged length in bytes
    #[serde(default = "default_max_len")]
    pub max_len: usize,

    /// Separator placed between parts
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_max_len() -> usize {
    DEFAULT_MAX_LEN
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

impl Default for TextMergeStrategy {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl TextMergeStrategy {
    pub fn new(max_len: usize, separator: impl Into<String>) -> Self {
        Self {
            max_len,
            separator: separator.into(),
        }
    }
}

/// Byte range `[start, end)` of a part inside the merged text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartIndex {
    pub start: usize,
    pub end: usize,
}

impl PartIndex {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end)` lies entirely within this part
    pub fn contains_span(&self, start: usize, end: usize) -> bool {
        start >= self.start && end <= self.end
    }

    /// Whether `[start, end)` overlaps this part
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && self.end > start
    }
}

/// Result of merging parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedText {
    pub merged: String,

    /// Parts actually included, in order
    pub parts: Vec<String>,

    /// One entry per included part
    pub index: Vec<PartIndex>,
}

impl MergedText {
    /// Number of parts included in the merge
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Merge `parts` under the strategy's budget.
///
/// Returns `None` for empty input. When the full concatenation exceeds
/// `max_len`, parts are taken greedily from the front; fewer than two
/// fitting parts also yields `None`.
pub fn merge_texts<S: AsRef<str>>(parts: &[S], strategy: &TextMergeStrategy) -> Option<MergedText> {
    match parts {
        [] => None,
        [only] => {
            let only = only.as_ref();
            Some(MergedText {
                merged: only.to_string(),
                parts: vec![only.to_string()],
                index: vec![PartIndex::new(0, only.len())],
            })
        }
        _ => {
            let sep_len = strategy.separator.len();
            let total: usize = parts.iter().map(|p| p.as_ref().len()).sum::<usize>()
                + sep_len * (parts.len() - 1);

            if total > strategy.max_len {
                return merge_partial(parts, strategy);
            }

            let mut merged = String::with_capacity(total);
            let mut index = Vec::with_capacity(parts.len());
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    merged.push_str(&strategy.separator);
                }
                let start = merged.len();
                merged.push_str(part.as_ref());
                index.push(PartIndex::new(start, merged.len()));
            }

            Some(MergedText {
                merged,
                parts: parts.iter().map(|p| p.as_ref().to_string()).collect(),
                index,
            })
        }
    }
}

fn merge_partial<S: AsRef<str>>(parts: &[S], strategy: &TextMergeStrategy) -> Option<MergedText> {
    let mut merged = String::new();
    let mut index = Vec::new();
    let mut included = Vec::new();

    for (i, part) in parts.iter().enumerate() {
        let part = part.as_ref();
        let add = if i > 0 {
            part.len() + strategy.separator.len()
        } else {
            part.len()
        };
        if merged.len() + add > strategy.max_len {
            break;
        }
        if i > 0 {
            merged.push_str(&strategy.separator);
        }
        let start = merged.len();
        merged.push_str(part);
        index.push(PartIndex::new(start, merged.len()));
        included.push(part.to_string());
    }

    if included.len() < 2 {
        return None;
    }

    Some(MergedText {
        merged,
        parts: included,
        index,
    })
}

/// Recover the parts of a merged text from its index
pub fn split_merged_text(merged: &MergedText) -> Vec<String> {
    merged
        .index
        .iter()
        .map(|idx| {
            merged
                .merged
                .get(idx.start..idx.end)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Indices of parts overlapping the violation span `[start, end)`
pub fn find_violating_parts(merged: &MergedText, start: usize, end: usize) -> Vec<usize> {
    merged
        .index
        .iter()
        .enumerate()
        .filter(|(_, idx)| idx.overlaps(start, end))
        .map(|(i, _)| i)
        .collect()
}

/// Truncate to at most `max_len` bytes on a char boundary, ending in "..."
/// when there is room for it.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    if max_len <= 3 {
        return text[..floor_char_boundary(text, max_len)].to_string();
    }
    let cut = floor_char_boundary(text, max_len - 3);
    format!("{}...", &text[..cut])
}

fn floor_char_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

/// Replace the chars at positions `[start, end)` with `mask`
pub fn mask_text(text: &str, start: usize, end: usize, mask: char) -> String {
    let end = end.min(text.chars().count());
    if start >= end {
        return text.to_string();
    }
    text.chars()
        .enumerate()
        .map(|(i, c)| if i >= start && i < end { mask } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_merge_danmaku() {
        let parts = ["弹幕1", "弹幕2", "弹幕3"];
        let merged = merge_texts(&parts, &TextMergeStrategy::default()).unwrap();

        assert_eq!(merged.merged, "弹幕1\n---\n弹幕2\n---\n弹幕3");
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.index[0], PartIndex::new(0, "弹幕1".len()));
        assert_eq!(split_merged_text(&merged), parts);
    }

    #[test]
    fn test_merge_empty_and_single() {
        let empty: [&str; 0] = [];
        assert!(merge_texts(&empty, &TextMergeStrategy::default()).is_none());

        let merged = merge_texts(&["only"], &TextMergeStrategy::new(2, "|")).unwrap();
        assert_eq!(merged.merged, "only");
        assert_eq!(merged.index, vec![PartIndex::new(0, 4)]);
    }

    #[test]
    fn test_merge_partial() {
        let strategy = TextMergeStrategy::new(9, "|");
        let merged = merge_texts(&["aaa", "bbb", "ccc"], &strategy).unwrap();
        assert_eq!(merged.merged, "aaa|bbb");
        assert_eq!(merged.parts, vec!["aaa", "bbb"]);

        let strategy = TextMergeStrategy::new(4, "|");
        assert!(merge_texts(&["aaa", "bbb", "ccc"], &strategy).is_none());
    }

    #[test]
    fn test_find_violating_parts() {
        let merged = merge_texts(&["hello", "bad word", "fine"], &TextMergeStrategy::new(100, "|"))
            .unwrap();
        // "hello|bad word|fine": "bad" spans 6..9
        assert_eq!(find_violating_parts(&merged, 6, 9), vec![1]);
        assert_eq!(find_violating_parts(&merged, 3, 8), vec![0, 1]);
        assert!(find_violating_parts(&merged, 5, 6).is_empty());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("hello world", 8), "hello...");
        assert_eq!(truncate_text("hello", 2), "he");
        assert_eq!(truncate_text("弹幕弹幕", 7), "弹...");
    }

    #[test]
    fn test_mask_text() {
        assert_eq!(mask_text("hello", 1, 3, '*'), "h**lo");
        assert_eq!(mask_text("违禁词语", 0, 2, '*'), "**词语");
        assert_eq!(mask_text("abc", 2, 99, '#'), "ab#");
        assert_eq!(mask_text("abc", 3, 1, '#'), "abc");
    }

    proptest! {
        #[test]
        fn prop_merge_round_trip(parts in prop::collection::vec(".{0,20}", 1..8)) {
            let strategy = TextMergeStrategy::new(usize::MAX, DEFAULT_SEPARATOR);
            let merged = merge_texts(&parts, &strategy).unwrap();
            prop_assert_eq!(split_merged_text(&merged), parts);
        }

        #[test]
        fn prop_partial_merge_within_budget(
            parts in prop::collection::vec("[a-z]{1,30}", 2..10),
            max_len in 10usize..120,
        ) {
            let strategy = TextMergeStrategy::new(max_len, "|");
            if let Some(merged) = merge_texts(&parts, &strategy) {
                prop_assert!(merged.merged.len() <= max_len);
                prop_assert!(merged.len() >= 2);
                prop_assert_eq!(split_merged_text(&merged), merged.parts.clone());
            }
        }
    }
}
