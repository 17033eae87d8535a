pub mod contributors;
pub mod counts;
pub mod strategy;

use std::collections::HashSet;

use scraper::Html;

use strategy::{first_match, first_match_where, Lookup};

pub const TOPIC_CAP: usize = 6;
pub const UNKNOWN_LANGUAGE: &str = "unknown";

const STAR_LOOKUPS: &[Lookup] = &[
    Lookup::TextOr("#repo-stars-counter-star", "title"),
    Lookup::TextOr(r#"a[href$="/stargazers"] .Counter"#, "title"),
    Lookup::TextOr(r#"[data-testid="stargazers"] .Counter"#, "title"),
    Lookup::Text(r#"a[href*="stargazers"] strong"#),
    Lookup::Attr(r#"a[href*="stargazers"] span[title]"#, "title"),
];

const FORK_LOOKUPS: &[Lookup] = &[
    Lookup::TextOr("#repo-network-counter", "title"),
    Lookup::TextOr(r#"a[href$="/forks"] .Counter"#, "title"),
    Lookup::TextOr(r#"a[href*="network/members"] .Counter"#, "title"),
    Lookup::TextOr(r#"[data-testid="forks"] .Counter"#, "title"),
    Lookup::Text(r#"a[href$="/forks"] strong"#),
];

const WATCHER_LOOKUPS: &[Lookup] = &[
    Lookup::TextOr(r#"a[href$="/watchers"] .Counter"#, "title"),
    Lookup::TextOr(r#"a[href*="watchers"] .Counter"#, "title"),
    Lookup::Text(r#"a[href$="/watchers"] strong"#),
];

const DESCRIPTION_LOOKUPS: &[Lookup] = &[
    Lookup::Text(r##"[data-pjax="#repo-content-pjax-container"] p"##),
    Lookup::Text(".BorderGrid-cell p.f4"),
    Lookup::Attr(r#"meta[name="description"]"#, "content"),
];

const LANGUAGE_LOOKUPS: &[Lookup] = &[
    Lookup::Text(r#"[data-ga-click*="language"]"#),
    Lookup::Text(r#".BorderGrid-cell .mt-2 span[class*="color-fg-"]"#),
    Lookup::Text(r#".Layout-sidebar .BorderGrid-cell span[class*="color-fg-"]"#),
    Lookup::Text(r#"[itemprop="programmingLanguage"]"#),
];

// page chrome that the looser language selectors sometimes hit
const LANGUAGE_NOISE: &[&str] = &["repository", "code", "issues", "pull", "requests"];

const LICENSE_LOOKUPS: &[Lookup] = &[
    Lookup::Text(r#"a[href*="/blob/"][href*="LICENSE"]"#),
    Lookup::Text(r#"a[href*="/blob/"][href*="COPYING"]"#),
    Lookup::Text(r#".BorderGrid-cell a[title*="license"]"#),
];

const LAST_COMMIT_LOOKUPS: &[Lookup] = &[
    Lookup::Attr(r#"[data-testid="latest-commit-details"] relative-time"#, "datetime"),
    Lookup::Attr("relative-time[datetime]", "datetime"),
];

const TOPIC_LOOKUPS: &[Lookup] = &[
    Lookup::Text(r#"[data-ga-click*="topic"] .topic-tag"#),
    Lookup::Text("a.topic-tag"),
];

/// Best-effort field set for one repository page. Missing fields take their
/// defaults; extraction never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFields {
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub description: String,
    pub language: String,
    pub topics: Vec<String>,
    pub license: Option<String>,
    pub last_commit: Option<String>,
}

pub fn repo_fields(markup: &str) -> RepoFields {
    let doc = Html::parse_document(markup);
    RepoFields {
        stars: stars(&doc).unwrap_or(0),
        forks: counter(&doc, FORK_LOOKUPS).unwrap_or(0),
        watchers: counter(&doc, WATCHER_LOOKUPS).unwrap_or(0),
        description: first_match(&doc, DESCRIPTION_LOOKUPS).unwrap_or_default(),
        language: language(&doc),
        topics: topics(&doc),
        license: first_match(&doc, LICENSE_LOOKUPS),
        last_commit: first_match(&doc, LAST_COMMIT_LOOKUPS),
    }
}

/// Stars alone; `None` when no counter was found on the page.
pub fn stars(doc: &Html) -> Option<u64> {
    counter(doc, STAR_LOOKUPS)
}

pub fn stars_in(markup: &str) -> Option<u64> {
    stars(&Html::parse_document(markup))
}

fn counter(doc: &Html, lookups: &[Lookup]) -> Option<u64> {
    first_match_where(doc, lookups, counts::looks_like_count).map(|t| counts::normalize(&t))
}

fn language(doc: &Html) -> String {
    first_match_where(doc, LANGUAGE_LOOKUPS, |v| {
        !LANGUAGE_NOISE.contains(&v.to_lowercase().as_str())
    })
    .map(|l| l.to_lowercase())
    .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

fn topics(doc: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let found = TOPIC_LOOKUPS
        .iter()
        .map(|l| l.candidates(doc))
        .find(|c| !c.is_empty())
        .unwrap_or_default();

    for topic in found {
        let topic = topic.to_lowercase();
        if seen.insert(topic.clone()) {
            out.push(topic);
        }
        if out.len() == TOPIC_CAP {
            break;
        }
    }
    out
}
