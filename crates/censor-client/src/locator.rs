//! Violation locator
//!
//! Attributes a violation found in a merged submission back to the parts
//! it came from. Provider position data is trusted first; keyword
//! containment is the fallback heuristic.

use censor_core::{PartIndex, Reason};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Confidence reported for a position match
pub const POSITION_CONFIDENCE: f64 = 0.95;

/// Scale applied to keyword match ratios
pub const KEYWORD_CONFIDENCE_SCALE: f64 = 0.85;

/// How an item's decision was attributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatedBy {
    /// Provider-reported span inside the item
    Position,
    /// Violation keyword found in the item
    Keyword,
    /// Every item inherits the merged decision
    Conservative,
    /// Item re-reviewed on its own
    Fallback,
    /// Individual re-review failed; merged decision inherited
    FallbackError,
}

impl LocatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Keyword => "keyword",
            Self::Conservative => "conservative",
            Self::Fallback => "fallback",
            Self::FallbackError => "fallback_error",
        }
    }
}

impl fmt::Display for LocatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a locate call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    /// Indices of the located items, ascending
    pub items: Vec<usize>,

    /// In [0, 1]; zero when nothing was located
    pub confidence: f64,

    /// `Position` or `Keyword` when something was located
    pub method: Option<LocatedBy>,
}

impl Location {
    pub fn is_found(&self) -> bool {
        !self.items.is_empty() && self.confidence > 0.0
    }

    pub fn contains(&self, item: usize) -> bool {
        self.items.contains(&item)
    }
}

/// Locate the items responsible for `reasons`.
///
/// `texts[i]` occupies `index[i]` in the merged text.
pub fn locate<S: AsRef<str>>(texts: &[S], index: &[PartIndex], reasons: &[Reason]) -> Location {
    if reasons.is_empty() {
        return Location::default();
    }

    let items = locate_by_position(index, reasons);
    if !items.is_empty() {
        return Location {
            items,
            confidence: POSITION_CONFIDENCE,
            method: Some(LocatedBy::Position),
        };
    }

    let (items, confidence) = locate_by_keyword(texts, reasons);
    if confidence > 0.0 {
        return Location {
            items,
            confidence,
            method: Some(LocatedBy::Keyword),
        };
    }

    Location::default()
}

/// Items whose range fully contains a reported violation span
pub fn locate_by_position(index: &[PartIndex], reasons: &[Reason]) -> Vec<usize> {
    let mut found = vec![false; index.len()];
    for (start, end) in reasons.iter().filter_map(extract_position) {
        for (i, part) in index.iter().enumerate() {
            if part.contains_span(start, end) {
                found[i] = true;
            }
        }
    }
    positions_of(&found)
}

/// Items containing a violation keyword, with a match-ratio confidence
pub fn locate_by_keyword<S: AsRef<str>>(texts: &[S], reasons: &[Reason]) -> (Vec<usize>, f64) {
    let lowered: Vec<String> = texts.iter().map(|t| t.as_ref().to_lowercase()).collect();
    let mut counts = vec![0usize; texts.len()];
    let mut total = 0usize;

    for keyword in reasons.iter().flat_map(extract_keywords) {
        if keyword.is_empty() {
            continue;
        }
        total += 1;
        let keyword = keyword.to_lowercase();
        for (i, text) in lowered.iter().enumerate() {
            if text.contains(&keyword) {
                counts[i] += 1;
            }
        }
    }

    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 || total == 0 {
        return (Vec::new(), 0.0);
    }

    let ratio = (max as f64 / total as f64).min(1.0);
    let matched: Vec<bool> = counts.iter().map(|c| *c > 0).collect();
    (positions_of(&matched), ratio * KEYWORD_CONFIDENCE_SCALE)
}

fn positions_of(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter_map(|(i, hit)| hit.then_some(i))
        .collect()
}

/// Violation span `[start, end)` reported by a provider, if any.
///
/// Recognizes `positions[0].{startPos,endPos}` and flat
/// `start_position`/`end_position`; the flat shape wins when both exist.
pub fn extract_position(reason: &Reason) -> Option<(usize, usize)> {
    let flat = span(
        reason.raw.get("start_position"),
        reason.raw.get("end_position"),
    );
    if flat.is_some() {
        return flat;
    }

    let first = reason.raw.get("positions")?.as_array()?.first()?;
    span(first.get("startPos"), first.get("endPos"))
}

fn span(start: Option<&Value>, end: Option<&Value>) -> Option<(usize, usize)> {
    Some((as_offset(start?)?, as_offset(end?)?))
}

fn as_offset(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as usize))
}

/// Keywords carried by a reason: hit tags plus known raw shapes
pub fn extract_keywords(reason: &Reason) -> Vec<String> {
    let mut keywords = reason.hit_tags.clone();

    for key in ["keywords", "keywordTexts", "Keywords"] {
        if let Some(list) = reason.raw.get(key).and_then(Value::as_array) {
            keywords.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }

    if let Some(segments) = reason.raw.get("segments").and_then(Value::as_array) {
        keywords.extend(
            segments
                .iter()
                .filter_map(|s| s.get("segment").and_then(Value::as_str))
                .map(str::to_string),
        );
    }

    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use censor_core::{textmerge::merge_texts, TextMergeStrategy};
    use proptest::prelude::*;
    use serde_json::json;

    fn merged(parts: &[&str]) -> Vec<PartIndex> {
        merge_texts(parts, &TextMergeStrategy::default())
            .map(|m| m.index)
            .unwrap_or_default()
    }

    #[test]
    fn test_position_beats_keyword() {
        let texts = ["hello", "bad word here", "bye"];
        let index = merged(&texts);
        let start = index[1].start;
        let reasons = vec![Reason::new("abuse", "")
            .with_hit_tags(["hello"])
            .with_raw("start_position", json!(start))
            .with_raw("end_position", json!(start + 3))];

        let loc = locate(&texts, &index, &reasons);
        assert_eq!(loc.method, Some(LocatedBy::Position));
        assert_eq!(loc.items, vec![1]);
        assert_eq!(loc.confidence, POSITION_CONFIDENCE);
    }

    #[test]
    fn test_positions_array_shape() {
        let texts = ["aaaa", "bbbb"];
        let index = merged(&texts);
        let reasons = vec![Reason::new("x", "").with_raw(
            "positions",
            json!([{ "startPos": 0.0, "endPos": 2.0 }]),
        )];
        assert_eq!(locate_by_position(&index, &reasons), vec![0]);
    }

    #[test]
    fn test_span_across_separator_matches_nothing() {
        let texts = ["aaaa", "bbbb"];
        let index = merged(&texts);
        let reasons = vec![Reason::new("x", "")
            .with_raw("start_position", json!(2))
            .with_raw("end_position", json!(index[1].start + 1))];
        assert!(locate_by_position(&index, &reasons).is_empty());
    }

    #[test]
    fn test_keyword_returns_every_matching_item() {
        let texts = ["Spam here", "nothing", "more SPAM", "scam"];
        let reasons = vec![Reason::new("ads", "").with_hit_tags(["spam", "scam"])];

        let (items, confidence) = locate_by_keyword(&texts, &reasons);
        assert_eq!(items, vec![0, 2, 3]);
        assert!((confidence - 0.5 * KEYWORD_CONFIDENCE_SCALE).abs() < 1e-9);
    }

    #[test]
    fn test_raw_keyword_shapes() {
        let reason = Reason::new("x", "")
            .with_hit_tags(["a"])
            .with_raw("keywords", json!(["b"]))
            .with_raw("keywordTexts", json!(["c", 1]))
            .with_raw("Keywords", json!(["d"]))
            .with_raw("segments", json!([{ "segment": "e" }, { "other": "f" }]));
        assert_eq!(extract_keywords(&reason), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_nothing_located() {
        let texts = ["one", "two"];
        let index = merged(&texts);
        assert!(!locate(&texts, &index, &[]).is_found());

        let reasons = vec![Reason::new("x", "").with_hit_tags(["three"])];
        let loc = locate(&texts, &index, &reasons);
        assert!(!loc.is_found());
        assert_eq!(loc.confidence, 0.0);
        assert_eq!(loc.method, None);
    }

    proptest! {
        #[test]
        fn prop_keyword_confidence_bounded(
            texts in prop::collection::vec("[a-c ]{0,12}", 1..6),
            tags in prop::collection::vec("[a-c]{1,3}", 0..4),
        ) {
            let reasons = vec![Reason::new("x", "").with_hit_tags(tags)];
            let (items, confidence) = locate_by_keyword(&texts, &reasons);
            prop_assert!((0.0..=KEYWORD_CONFIDENCE_SCALE).contains(&confidence));
            prop_assert!(items.iter().all(|i| *i < texts.len()));
            prop_assert_eq!(items.is_empty(), confidence == 0.0);
        }
    }
}
