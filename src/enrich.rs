use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::extract::TOPIC_CAP;

pub const FALLBACK_CATEGORY: &str = "utilities";

struct CategoryRule {
    category: &'static str,
    keywords: &'static [&'static str],
}

// first rule with any keyword present wins
const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: "database",
        keywords: &["database", "sql", "postgres", "mysql"],
    },
    CategoryRule {
        category: "automation",
        keywords: &["browser", "automation", "puppeteer", "selenium"],
    },
    CategoryRule {
        category: "cloud",
        keywords: &["cloud", "aws", "gcp", "azure"],
    },
    CategoryRule {
        category: "api",
        keywords: &["api", "rest", "webhook"],
    },
    CategoryRule {
        category: "filesystem",
        keywords: &["file", "filesystem", "directory"],
    },
    CategoryRule {
        category: "development",
        keywords: &["dev", "code", "git"],
    },
    CategoryRule {
        category: "communication",
        keywords: &["chat", "message", "slack", "discord"],
    },
    CategoryRule {
        category: "productivity",
        keywords: &["task", "todo", "productivity"],
    },
    CategoryRule {
        category: "security",
        keywords: &["security", "auth", "encrypt"],
    },
    CategoryRule {
        category: "testing",
        keywords: &["test", "testing"],
    },
    CategoryRule {
        category: "analytics",
        keywords: &["analytics", "metrics", "stats"],
    },
];

const KEYWORD_TAGS: &[&str] = &["server", "client", "api", "integration", "automation", "tool"];

static NAME_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i) (mcp|server|client|tool)$").unwrap());
static NAME_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^mcp ").unwrap());

/// Keyword category from the repository name, description and topics.
/// Substring match, case-insensitive.
pub fn category(name: &str, description: &str, topics: &[String]) -> &'static str {
    let text = format!("{} {} {}", name, description, topics.join(" ")).to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| text.contains(k)))
        .map_or(FALLBACK_CATEGORY, |rule| rule.category)
}

/// Category, `mcp`, topics, then keyword tags; deduplicated and capped.
pub fn tags(name: &str, description: &str, topics: &[String], category: &str) -> Vec<String> {
    let text = format!("{} {}", name, description).to_lowercase();
    let keyword_tags = KEYWORD_TAGS.iter().copied().filter(|k| text.contains(k));

    let mut seen = HashSet::new();
    [category, "mcp"]
        .into_iter()
        .chain(topics.iter().map(String::as_str))
        .chain(keyword_tags)
        .filter(|t| seen.insert(*t))
        .take(TOPIC_CAP)
        .map(str::to_string)
        .collect()
}

/// `mcp-server-sqlite` → `Server Sqlite MCP`.
pub fn display_name(repo_name: &str) -> String {
    let spaced = repo_name.replace(['-', '_'], " ");
    let titled: Vec<String> = spaced.split(' ').map(capitalize).collect();
    let mut name = NAME_SUFFIX_RE.replace(&titled.join(" "), "").into_owned();

    if !name.eq_ignore_ascii_case("mcp") {
        name = NAME_PREFIX_RE.replace(&name, "").into_owned();
    }
    if !name.to_lowercase().contains("mcp") {
        name.push_str(" MCP");
    }
    name
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
