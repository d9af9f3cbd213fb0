//! Deduplicating, paginated article fetch.
//!
//! [`fetch_articles`] walks a [`SearchSource`] page by page until it has
//! `desired_count` articles or has scanned `max_pages` pages, whichever comes
//! first. Items are dropped when an [`ExclusionRule`] matches or when their
//! `(title, url)` pair was already accepted earlier in the same call.
//!
//! A failing page ends the scan and the articles gathered so far are returned.
//! There is no retry.

use crate::models::Article;
use crate::sources::{SearchRequest, SearchSource};
use crate::utils::truncate_for_log;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// Which part of a search item a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    Identifier,
    Title,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Stored lowercased; compared case-insensitively.
    Substring(String),
    Pattern(Regex),
}

/// A category exclusion, e.g. "identifier contains `live`".
///
/// Parsed from `<target>:<substring>` or `<target>~<regex>`, where target is
/// `identifier` (alias `id`) or `title`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct ExclusionRule {
    target: RuleTarget,
    matcher: Matcher,
}

#[derive(Debug, thiserror::Error)]
pub enum RuleParseError {
    #[error("exclusion rule {0:?} must look like `identifier:live` or `title~regex`")]
    Syntax(String),
    #[error("unknown exclusion target {0:?} (expected identifier or title)")]
    Target(String),
    #[error("exclusion rule has an empty pattern")]
    Empty,
    #[error("invalid exclusion pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl ExclusionRule {
    pub fn substring(target: RuleTarget, needle: &str) -> Self {
        Self {
            target,
            matcher: Matcher::Substring(needle.to_lowercase()),
        }
    }

    pub fn pattern(target: RuleTarget, pattern: &str) -> Result<Self, RuleParseError> {
        Ok(Self {
            target,
            matcher: Matcher::Pattern(Regex::new(pattern)?),
        })
    }

    pub fn matches(&self, identifier: &str, title: &str) -> bool {
        let haystack = match self.target {
            RuleTarget::Identifier => identifier,
            RuleTarget::Title => title,
        };
        match &self.matcher {
            Matcher::Substring(needle) => haystack.to_lowercase().contains(needle.as_str()),
            Matcher::Pattern(re) => re.is_match(haystack),
        }
    }
}

impl FromStr for ExclusionRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .char_indices()
            .find(|(_, c)| *c == ':' || *c == '~')
            .ok_or_else(|| RuleParseError::Syntax(s.to_string()))?;
        let (idx, sep) = split;
        let target = match s[..idx].trim().to_lowercase().as_str() {
            "identifier" | "id" => RuleTarget::Identifier,
            "title" => RuleTarget::Title,
            other => return Err(RuleParseError::Target(other.to_string())),
        };
        let rest = &s[idx + sep.len_utf8()..];
        if rest.is_empty() {
            return Err(RuleParseError::Empty);
        }
        if sep == '~' {
            Self::pattern(target, rest)
        } else {
            Ok(Self::substring(target, rest))
        }
    }
}

impl TryFrom<String> for ExclusionRule {
    type Error = RuleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            RuleTarget::Identifier => "identifier",
            RuleTarget::Title => "title",
        };
        match &self.matcher {
            Matcher::Substring(needle) => write!(f, "{target}:{needle}"),
            Matcher::Pattern(re) => write!(f, "{target}~{}", re.as_str()),
        }
    }
}

/// Live blogs, quizzes and obituaries.
pub fn default_exclusions() -> Vec<ExclusionRule> {
    vec![
        ExclusionRule::substring(RuleTarget::Identifier, "live"),
        ExclusionRule::substring(RuleTarget::Identifier, "quiz"),
        ExclusionRule::substring(RuleTarget::Title, "obituary"),
    ]
}

pub fn default_fields() -> Vec<String> {
    ["headline", "bodyText", "trailText"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Target number of accepted articles; also the requested page size.
    pub desired_count: usize,
    pub fields: Vec<String>,
    /// Hard ceiling on page requests.
    pub max_pages: u32,
    pub debug: bool,
    pub exclusions: Vec<ExclusionRule>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            desired_count: 3,
            fields: default_fields(),
            max_pages: 5,
            debug: false,
            exclusions: default_exclusions(),
        }
    }
}

/// Fetch up to `options.desired_count` articles for `query`.
///
/// Returns fewer when `max_pages` runs out or a page request fails. Order is
/// source order across pages; the first occurrence of a `(title, url)` pair
/// wins.
#[instrument(level = "info", skip_all, fields(%query, desired = options.desired_count, max_pages = options.max_pages))]
pub async fn fetch_articles<S: SearchSource>(
    source: &S,
    query: &str,
    options: &FetchOptions,
) -> Vec<Article> {
    let desired = options.desired_count;
    let mut articles: Vec<Article> = Vec::with_capacity(desired);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut page: u32 = 1;

    while articles.len() < desired && page <= options.max_pages {
        let request = SearchRequest {
            query,
            page_size: desired,
            fields: &options.fields,
            page,
        };

        let result = match source.search(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(page, error = %e, accepted = articles.len(), "Search page failed; returning partial result");
                break;
            }
        };
        debug!(page, items = result.items.len(), "Scanning page");

        for item in result.items {
            if articles.len() >= desired {
                break;
            }

            if item.title.trim().is_empty() {
                debug!(id = %item.identifier, url = %item.url, "No title; skipping");
                continue;
            }

            if let Some(rule) = options
                .exclusions
                .iter()
                .find(|r| r.matches(&item.identifier, &item.title))
            {
                debug!(id = %item.identifier, %rule, "Excluded");
                continue;
            }

            let article = Article::new(item.identifier, item.title, item.url, item.fields);
            if !seen.insert(article.dedup_key()) {
                debug!(title = %article.title, url = %article.url, "Duplicate; skipping");
                continue;
            }

            if options.debug {
                info!(
                    title = %article.title,
                    url = %article.url,
                    preview = %truncate_for_log(&article.content, 200),
                    "Accepted article"
                );
            }
            articles.push(article);
        }

        let last_page = result.total_pages.is_some_and(|total| page >= total);
        page += 1;
        if last_page {
            debug!(page, "Source has no more pages");
            break;
        }
    }

    info!(count = articles.len(), pages_scanned = page - 1, "Fetched articles");
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleFields;
    use crate::sources::{SearchItem, SearchPage, SourceError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn item(id: &str, title: &str, url: &str) -> SearchItem {
        SearchItem {
            identifier: id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            fields: ArticleFields {
                body_text: Some(format!("body of {title}")),
                ..Default::default()
            },
        }
    }

    fn page(items: Vec<SearchItem>) -> Result<SearchPage, SourceError> {
        Ok(SearchPage {
            items,
            total_pages: None,
        })
    }

    /// Replays a fixed list of pages, then returns empty pages.
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<SearchPage, SourceError>>>,
        calls: Mutex<Vec<(u32, usize)>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<SearchPage, SourceError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(u32, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SearchSource for ScriptedSource {
        async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SourceError> {
            self.calls
                .lock()
                .unwrap()
                .push((request.page, request.page_size));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SearchPage::default()))
        }
    }

    /// Never runs dry: every page holds fresh items built from the page number.
    struct EndlessSource {
        id_prefix: &'static str,
        calls: Mutex<u32>,
    }

    impl SearchSource for EndlessSource {
        async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SourceError> {
            *self.calls.lock().unwrap() += 1;
            let items = (0..request.page_size)
                .map(|i| {
                    let n = format!("{}-{}", request.page, i);
                    item(
                        &format!("{}/{n}", self.id_prefix),
                        &format!("Title {n}"),
                        &format!("https://example.com/{n}"),
                    )
                })
                .collect();
            Ok(SearchPage {
                items,
                total_pages: None,
            })
        }
    }

    fn options(desired: usize, max_pages: u32) -> FetchOptions {
        FetchOptions {
            desired_count: desired,
            max_pages,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_page_fills_quota_with_one_request() {
        let source = ScriptedSource::new(vec![page(vec![
            item("tech/a", "A", "https://g/a"),
            item("tech/b", "B", "https://g/b"),
            item("tech/c", "C", "https://g/c"),
            item("tech/d", "D", "https://g/d"),
            item("tech/e", "E", "https://g/e"),
        ])]);

        let articles = fetch_articles(&source, "technology", &options(3, 5)).await;

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(source.calls(), vec![(1, 3)]);
    }

    #[tokio::test]
    async fn test_untitled_item_skipped_and_next_fills_quota() {
        let body = r#"{"response": {"status": "ok", "pages": 1, "results": [
            {"id": "technology/2025/aug/07/a", "webTitle": "", "webUrl": "https://g/a", "fields": {"headline": "  "}},
            {"id": "technology/2025/aug/07/b", "webTitle": "Real", "webUrl": "https://g/b"},
            {"id": "technology/2025/aug/07/c", "webTitle": "Also real", "webUrl": "https://g/c"}
        ]}}"#;
        let source = ScriptedSource::new(vec![crate::sources::guardian::parse_page(body)]);

        let articles = fetch_articles(&source, "technology", &options(2, 1)).await;

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Real", "Also real"]);
        assert!(articles.iter().all(|a| !a.title.is_empty()));
    }

    #[tokio::test]
    async fn test_quiz_item_skipped_and_second_page_completes() {
        let source = ScriptedSource::new(vec![
            page(vec![
                item("technology/2025/aug/07/one", "One", "https://g/1"),
                item("technology/quiz/2025/aug/07/q", "Quiz", "https://g/q"),
                item("technology/2025/aug/07/two", "Two", "https://g/2"),
            ]),
            page(vec![
                item("technology/2025/aug/06/three", "Three", "https://g/3"),
                item("technology/2025/aug/06/four", "Four", "https://g/4"),
            ]),
        ]);

        let articles = fetch_articles(&source, "technology", &options(3, 3)).await;

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(source.calls(), vec![(1, 3), (2, 3)]);
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_keep_first() {
        let source = ScriptedSource::new(vec![
            page(vec![
                item("world/1", "Same", "https://g/same"),
                item("world/2", "Other", "https://g/other"),
            ]),
            page(vec![
                item("world/3", "Same", "https://g/same"),
                item("world/4", "Same", "https://g/different-url"),
            ]),
        ]);

        let articles = fetch_articles(&source, "world", &options(3, 2)).await;

        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].identifier, "world/1");
        assert_eq!(articles[1].identifier, "world/2");
        assert_eq!(articles[2].identifier, "world/4");
        let keys: HashSet<_> = articles.iter().map(Article::dedup_key).collect();
        assert_eq!(keys.len(), articles.len());
    }

    #[tokio::test]
    async fn test_all_live_items_yield_empty_result() {
        let source = EndlessSource {
            id_prefix: "politics/live",
            calls: Mutex::new(0),
        };

        let articles = fetch_articles(&source, "politics", &options(4, 6)).await;

        assert!(articles.is_empty());
        assert_eq!(*source.calls.lock().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_page_ceiling_bounds_requests() {
        let source = ScriptedSource::new(vec![
            page(vec![item("a/1", "A", "https://g/a")]),
            page(vec![item("a/2", "A", "https://g/a")]),
            page(vec![item("a/3", "B", "https://g/b")]),
        ]);

        let articles = fetch_articles(&source, "q", &options(5, 2)).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_source_error_returns_partial_result() {
        let source = ScriptedSource::new(vec![
            page(vec![item("a/1", "A", "https://g/a")]),
            Err(SourceError::Status {
                status: 429,
                message: "rate limited".into(),
            }),
            page(vec![item("a/2", "B", "https://g/b")]),
        ]);

        let articles = fetch_articles(&source, "q", &options(3, 5)).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "A");
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_obituary_title_excluded_case_insensitively() {
        let source = ScriptedSource::new(vec![page(vec![
            item("books/1", "Jane Doe OBITUARY", "https://g/1"),
            item("books/2", "A novel", "https://g/2"),
        ])]);

        let articles = fetch_articles(&source, "books", &options(1, 1)).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "A novel");
    }

    #[tokio::test]
    async fn test_stops_at_reported_last_page() {
        let source = ScriptedSource::new(vec![Ok(SearchPage {
            items: vec![item("a/1", "A", "https://g/a")],
            total_pages: Some(1),
        })]);

        let articles = fetch_articles(&source, "q", &options(3, 5)).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_desired_or_zero_pages_makes_no_request() {
        let source = ScriptedSource::new(vec![]);
        assert!(fetch_articles(&source, "q", &options(0, 3)).await.is_empty());
        assert!(fetch_articles(&source, "q", &options(3, 0)).await.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_never_exceeds_desired_or_max_pages() {
        for desired in 1..=4 {
            for max_pages in 1..=3 {
                let source = EndlessSource {
                    id_prefix: "news",
                    calls: Mutex::new(0),
                };
                let articles = fetch_articles(&source, "q", &options(desired, max_pages)).await;
                assert_eq!(articles.len(), desired);
                assert!(*source.calls.lock().unwrap() <= max_pages);
            }
        }
    }

    #[test]
    fn test_parse_exclusion_rules() {
        let rule: ExclusionRule = "identifier:live".parse().unwrap();
        assert!(rule.matches("politics/live/2025/x", "Anything"));
        assert!(!rule.matches("politics/2025/x", "Live coverage"));

        let rule: ExclusionRule = "title:Obituary".parse().unwrap();
        assert!(rule.matches("x", "An obituary for..."));

        let rule: ExclusionRule = r"id~^[a-z]+/series/".parse().unwrap();
        assert!(rule.matches("science/series/2025/x", ""));
        assert!(!rule.matches("science/2025/series", ""));
        assert_eq!(rule.to_string(), r"identifier~^[a-z]+/series/");

        assert!(matches!(
            "body:live".parse::<ExclusionRule>(),
            Err(RuleParseError::Target(_))
        ));
        assert!(matches!(
            "live".parse::<ExclusionRule>(),
            Err(RuleParseError::Syntax(_))
        ));
        assert!(matches!(
            "title:".parse::<ExclusionRule>(),
            Err(RuleParseError::Empty)
        ));
        assert!(matches!(
            "title~(".parse::<ExclusionRule>(),
            Err(RuleParseError::Regex(_))
        ));
    }

    #[test]
    fn test_exclusion_rules_deserialize_from_yaml() {
        let rules: Vec<ExclusionRule> =
            serde_yaml::from_str("- identifier:live\n- title~(?i)crossword\n").unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[1].matches("x", "Prize Crossword No 1"));
    }
}
