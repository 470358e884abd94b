use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use pdfdesk_core::{DocumentText, Rect, TextItemId};

static MATCH_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("4f1c3a8e-2d5b-5e07-9c64-8b1f0d2a6e39").expect("valid namespace UUID")
});

/// Deterministic match identity: the same `(page, item, offset)` triple always
/// yields the same id, so re-running an identical search reproduces ids.
pub fn match_id(page_number: u32, item_id: &TextItemId, start: usize) -> Uuid {
    let name = format!("{page_number}:{item_id}:{start}");
    Uuid::new_v5(&MATCH_NAMESPACE, name.as_bytes())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub regex: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub id: Uuid,
    pub page_number: u32,
    pub item_id: TextItemId,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub bounds: Rect,
}

enum ScanStep {
    PastMatch,
    PastStart,
}

fn compile_query(query: &str, options: &SearchOptions) -> Option<(Regex, ScanStep)> {
    if options.regex {
        match RegexBuilder::new(query)
            .case_insensitive(!options.case_sensitive)
            .build()
        {
            Ok(re) => return Some((re, ScanStep::PastMatch)),
            Err(err) => {
                // Invalid patterns degrade to a literal scan instead of
                // surfacing an error to the caller.
                warn!(%err, "invalid search pattern, falling back to literal matching");
            }
        }
    }

    let escaped = regex::escape(query);
    let (pattern, step) = if options.whole_word {
        (format!(r"\b{escaped}\b"), ScanStep::PastMatch)
    } else {
        (escaped, ScanStep::PastStart)
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .ok()
        .map(|re| (re, step))
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    match text[at..].chars().next() {
        Some(c) => at + c.len_utf8(),
        None => text.len() + 1,
    }
}

/// Byte spans of every occurrence of `query` in `text`. Literal scans resume
/// one character past the previous match start, so overlapping occurrences are
/// all reported; regex and whole-word scans resume at the match end. A
/// zero-length match always advances by one character so the scan terminates.
pub fn find_match_positions(text: &str, query: &str, options: &SearchOptions) -> Vec<MatchSpan> {
    if query.is_empty() {
        return Vec::new();
    }
    let Some((re, step)) = compile_query(query, options) else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(m) = re.find_at(text, pos) else {
            break;
        };
        spans.push(MatchSpan {
            start: m.start(),
            end: m.end(),
        });
        pos = if m.start() == m.end() {
            next_char_boundary(text, m.end())
        } else {
            match step {
                ScanStep::PastMatch => m.end(),
                ScanStep::PastStart => next_char_boundary(text, m.start()),
            }
        };
    }
    spans
}

/// Scans every text item on every page and returns matches ordered by
/// `(page, y, x)`. The sort is stable, so items that share bounds keep the
/// order the collaborator supplied them in.
#[tracing::instrument(skip(text))]
pub fn search_document(text: &DocumentText, query: &str, options: &SearchOptions) -> Vec<SearchMatch> {
    let mut matches = Vec::new();
    for (page_number, items) in text.pages() {
        for item in items {
            for span in find_match_positions(&item.text, query, options) {
                let matched = item
                    .text
                    .get(span.start..span.end)
                    .unwrap_or_default()
                    .to_owned();
                matches.push(SearchMatch {
                    id: match_id(page_number, &item.id, span.start),
                    page_number,
                    item_id: item.id.clone(),
                    text: matched,
                    start: span.start,
                    end: span.end,
                    bounds: item.bounds,
                });
            }
        }
    }
    matches.sort_by(|a, b| {
        a.page_number
            .cmp(&b.page_number)
            .then(a.bounds.y.total_cmp(&b.bounds.y))
            .then(a.bounds.x.total_cmp(&b.bounds.x))
    });
    debug!(count = matches.len(), "search pass complete");
    matches
}

/// Host callbacks. The engine never touches document state itself; every
/// mutation and every scroll/highlight goes through these.
pub trait SearchHost {
    fn on_navigate(&mut self, target: &SearchMatch);
    fn on_replace(&mut self, target: &SearchMatch, replacement: &str);
    fn on_replace_all(&mut self, targets: &[SearchMatch], replacement: &str);
}

pub struct SearchController {
    text: Arc<DocumentText>,
    query: String,
    options: SearchOptions,
    replacement: Option<String>,
    matches: Vec<SearchMatch>,
    current: usize,
}

impl SearchController {
    pub fn new(text: Arc<DocumentText>) -> Self {
        Self {
            text,
            query: String::new(),
            options: SearchOptions::default(),
            replacement: None,
            matches: Vec::new(),
            current: 0,
        }
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.refresh();
    }

    pub fn set_options(&mut self, options: SearchOptions) {
        self.options = options;
        self.refresh();
    }

    pub fn set_text(&mut self, text: Arc<DocumentText>) {
        self.text = text;
        self.refresh();
    }

    /// `Some("")` deletes match text; `None` means no replacement is
    /// configured and replace operations are no-ops.
    pub fn set_replacement(&mut self, replacement: Option<String>) {
        self.replacement = replacement;
    }

    pub fn refresh(&mut self) {
        self.matches = if self.query.is_empty() {
            Vec::new()
        } else {
            search_document(&self.text, &self.query, &self.options)
        };
        self.current = 0;
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.matches.clear();
        self.current = 0;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.matches.get(self.current)
    }

    pub fn next_match(&mut self, host: &mut dyn SearchHost) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.matches.len();
        let target = &self.matches[self.current];
        host.on_navigate(target);
        Some(target)
    }

    pub fn previous_match(&mut self, host: &mut dyn SearchHost) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        self.current = (self.current + self.matches.len() - 1) % self.matches.len();
        let target = &self.matches[self.current];
        host.on_navigate(target);
        Some(target)
    }

    pub fn go_to_match(&mut self, index: usize, host: &mut dyn SearchHost) -> Option<&SearchMatch> {
        if index >= self.matches.len() {
            return None;
        }
        self.current = index;
        let target = &self.matches[self.current];
        host.on_navigate(target);
        Some(target)
    }

    /// Replaces the match under the cursor and drops it from the list. The
    /// cursor is clamped so it never points past the shrunken end.
    pub fn replace_current(&mut self, host: &mut dyn SearchHost) -> bool {
        let Some(replacement) = self.replacement.clone() else {
            return false;
        };
        if self.matches.is_empty() {
            return false;
        }
        let target = self.matches.remove(self.current);
        host.on_replace(&target, &replacement);
        if self.current >= self.matches.len() {
            self.current = self.matches.len().saturating_sub(1);
        }
        true
    }

    /// Hands the whole match list to the host, then clears it. Returns how
    /// many matches were replaced.
    pub fn replace_all(&mut self, host: &mut dyn SearchHost) -> usize {
        let Some(replacement) = self.replacement.clone() else {
            return 0;
        };
        if self.matches.is_empty() {
            return 0;
        }
        host.on_replace_all(&self.matches, &replacement);
        let count = self.matches.len();
        self.matches.clear();
        self.current = 0;
        count
    }
}

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Single-slot trigger debounce: each call replaces the previously scheduled
/// task, so only the last trigger inside the quiet window fires. The scan
/// itself stays synchronous; only the trigger is deferred. Requires a tokio
/// runtime.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }));
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pdfdesk_core::TextItem;

    #[derive(Default)]
    struct RecordingHost {
        navigated: Vec<Uuid>,
        replaced: Vec<(String, String)>,
        bulk: Vec<(usize, String)>,
    }

    impl SearchHost for RecordingHost {
        fn on_navigate(&mut self, target: &SearchMatch) {
            self.navigated.push(target.id);
        }

        fn on_replace(&mut self, target: &SearchMatch, replacement: &str) {
            self.replaced.push((target.text.clone(), replacement.to_owned()));
        }

        fn on_replace_all(&mut self, targets: &[SearchMatch], replacement: &str) {
            self.bulk.push((targets.len(), replacement.to_owned()));
        }
    }

    fn single_item_text(text: &str) -> DocumentText {
        let mut doc = DocumentText::new();
        doc.insert_page(
            1,
            vec![TextItem::new("p1_i0", 1, text, Rect::new(0.0, 0.0, 100.0, 12.0))],
        );
        doc
    }

    fn spans(text: &str, query: &str, options: &SearchOptions) -> Vec<(usize, usize)> {
        find_match_positions(text, query, options)
            .into_iter()
            .map(|s| (s.start, s.end))
            .collect()
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert!(spans("anything", "", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn literal_search_ignores_case_by_default() {
        let options = SearchOptions::default();
        assert_eq!(spans("abc ABC Abc", "ABC", &options), vec![(0, 3), (4, 7), (8, 11)]);
        assert_eq!(
            spans("abc ABC Abc", "ABC", &options),
            spans("abc ABC Abc", "abc", &options)
        );
    }

    #[test]
    fn literal_search_honors_case_sensitivity() {
        let options = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        assert_eq!(spans("abc ABC Abc", "abc", &options), vec![(0, 3)]);
    }

    #[test]
    fn literal_search_reports_overlapping_occurrences() {
        // indexOf-from-previous-start-plus-one semantics.
        assert_eq!(spans("aaaa", "aa", &SearchOptions::default()), vec![(0, 2), (1, 3), (2, 4)]);
    }

    #[test]
    fn whole_word_matches_standalone_tokens_only() {
        let options = SearchOptions {
            whole_word: true,
            ..SearchOptions::default()
        };
        assert_eq!(spans("concatenate cats cat.", "cat", &options), vec![(17, 20)]);
    }

    #[test]
    fn whole_word_example_scenario() {
        let options = SearchOptions {
            whole_word: true,
            ..SearchOptions::default()
        };
        assert_eq!(
            spans("The theory of the theorem", "the", &options),
            vec![(0, 3), (14, 17)]
        );
    }

    #[test]
    fn regex_mode_collects_non_overlapping_matches() {
        let options = SearchOptions {
            regex: true,
            ..SearchOptions::default()
        };
        assert_eq!(spans("a1 b22 c333", r"\d+", &options), vec![(1, 2), (4, 6), (8, 11)]);
    }

    #[test]
    fn zero_length_regex_matches_terminate() {
        let options = SearchOptions {
            regex: true,
            ..SearchOptions::default()
        };
        let positions = spans("abc", "x*", &options);
        assert_eq!(positions, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn invalid_regex_degrades_to_literal() {
        let options = SearchOptions {
            regex: true,
            ..SearchOptions::default()
        };
        let literal = SearchOptions::default();
        assert_eq!(spans("f(x) = (", "(", &options), spans("f(x) = (", "(", &literal));
        assert!(!spans("f(x) = (", "(", &options).is_empty());
    }

    #[test]
    fn match_scan_is_utf8_safe() {
        let positions = spans("héllo héllo", "héllo", &SearchOptions::default());
        assert_eq!(positions.len(), 2);
        let text = "héllo héllo";
        for (start, end) in positions {
            assert_eq!(&text[start..end], "héllo");
        }
    }

    #[test]
    fn document_search_orders_by_page_then_position() {
        let mut doc = DocumentText::new();
        doc.insert_page(
            2,
            vec![TextItem::new("p2_i0", 2, "term", Rect::new(5.0, 5.0, 40.0, 12.0))],
        );
        doc.insert_page(
            1,
            vec![
                TextItem::new("p1_lower", 1, "term", Rect::new(10.0, 80.0, 40.0, 12.0)),
                TextItem::new("p1_upper_right", 1, "term", Rect::new(60.0, 10.0, 40.0, 12.0)),
                TextItem::new("p1_upper_left", 1, "term", Rect::new(10.0, 10.0, 40.0, 12.0)),
            ],
        );

        let matches = search_document(&doc, "term", &SearchOptions::default());
        let order: Vec<&str> = matches.iter().map(|m| m.item_id.as_str()).collect();
        assert_eq!(order, vec!["p1_upper_left", "p1_upper_right", "p1_lower", "p2_i0"]);
    }

    #[test]
    fn repeated_searches_are_deterministic() {
        let doc = single_item_text("the theory of the theorem");
        let options = SearchOptions::default();
        let first = search_document(&doc, "the", &options);
        let second = search_document(&doc, "the", &options);
        assert_eq!(first, second);
        assert!(first.iter().zip(&second).all(|(a, b)| a.id == b.id));
    }

    #[test]
    fn navigation_wraps_both_directions() {
        let doc = single_item_text("one two one two one");
        let mut controller = SearchController::new(Arc::new(doc));
        let mut host = RecordingHost::default();
        controller.set_query("one");
        assert_eq!(controller.matches().len(), 3);
        assert_eq!(controller.current_index(), 0);

        controller.next_match(&mut host);
        controller.next_match(&mut host);
        assert_eq!(controller.current_index(), 2);
        controller.next_match(&mut host);
        assert_eq!(controller.current_index(), 0);

        controller.previous_match(&mut host);
        assert_eq!(controller.current_index(), 2);
        assert_eq!(host.navigated.len(), 4);
    }

    #[test]
    fn go_to_match_out_of_bounds_is_a_no_op() {
        let doc = single_item_text("one two one");
        let mut controller = SearchController::new(Arc::new(doc));
        let mut host = RecordingHost::default();
        controller.set_query("one");

        assert!(controller.go_to_match(5, &mut host).is_none());
        assert_eq!(controller.current_index(), 0);
        assert!(host.navigated.is_empty());

        assert!(controller.go_to_match(1, &mut host).is_some());
        assert_eq!(controller.current_index(), 1);
    }

    #[test]
    fn replace_current_shrinks_list_and_clamps_cursor() {
        let doc = single_item_text("one two one two one");
        let mut controller = SearchController::new(Arc::new(doc));
        let mut host = RecordingHost::default();
        controller.set_query("one");
        controller.set_replacement(Some("uno".into()));

        controller.go_to_match(2, &mut host);
        assert!(controller.replace_current(&mut host));
        assert_eq!(controller.matches().len(), 2);
        assert_eq!(controller.current_index(), 1);
        assert_eq!(host.replaced, vec![("one".to_owned(), "uno".to_owned())]);
    }

    #[test]
    fn replace_requires_configured_replacement() {
        let doc = single_item_text("one two one");
        let mut controller = SearchController::new(Arc::new(doc));
        let mut host = RecordingHost::default();
        controller.set_query("one");

        assert!(!controller.replace_current(&mut host));
        assert_eq!(controller.matches().len(), 2);

        // Empty string is a real replacement (deletion), distinct from none.
        controller.set_replacement(Some(String::new()));
        assert!(controller.replace_current(&mut host));
        assert_eq!(host.replaced[0].1, "");
    }

    #[test]
    fn replace_all_clears_matches_and_resets_cursor() {
        let doc = single_item_text("one two one two one");
        let mut controller = SearchController::new(Arc::new(doc));
        let mut host = RecordingHost::default();
        controller.set_query("one");
        controller.set_replacement(Some("uno".into()));
        controller.go_to_match(2, &mut host);

        assert_eq!(controller.replace_all(&mut host), 3);
        assert!(controller.matches().is_empty());
        assert_eq!(controller.current_index(), 0);
        assert_eq!(host.bulk, vec![(3, "uno".to_owned())]);

        assert_eq!(controller.replace_all(&mut host), 0);
    }

    #[test]
    fn host_can_feed_replacements_back_through_the_text_map() {
        let mut text = single_item_text("the theory of the theorem");
        let mut controller = SearchController::new(Arc::new(text.clone()));
        let mut host = RecordingHost::default();
        controller.set_query("theory");
        let target = controller.current_match().cloned().unwrap();
        controller.set_replacement(Some("practice".into()));
        assert!(controller.replace_current(&mut host));

        text.replace_item_text(target.page_number, &target.item_id, target.start..target.end, "practice")
            .unwrap();
        controller.set_text(Arc::new(text));
        controller.set_query("practice");
        assert_eq!(controller.matches().len(), 1);
    }

    #[tokio::test]
    async fn debouncer_coalesces_rapid_triggers() {
        let debouncer = Debouncer::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let fired = Arc::clone(&fired);
            debouncer.call(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn debouncer_cancel_discards_pending_trigger() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            debouncer.call(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
