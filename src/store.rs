use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::StoreError;
use crate::extract::{TOPIC_CAP, UNKNOWN_LANGUAGE};
use crate::model::{ScrapeResult, ToolRecord};

/// The in-memory dataset and the file it came from.
///
/// Mutated only by the orchestrating flow; `flush` rewrites the whole file.
#[derive(Debug)]
pub struct DatasetStore {
    path: PathBuf,
    pub tools: Vec<ToolRecord>,
}

impl DatasetStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.clone()),
            _ => StoreError::Read {
                path: path.clone(),
                source,
            },
        })?;
        let tools: Vec<ToolRecord> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?;
        info!("Loaded {} tools from {}", tools.len(), path.display());
        Ok(DatasetStore { path, tools })
    }

    #[cfg(test)]
    pub fn from_tools(path: impl Into<PathBuf>, tools: Vec<ToolRecord>) -> Self {
        DatasetStore {
            path: path.into(),
            tools,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Re-sort, then replace the file content with the dataset. Not atomic.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.sort_by_popularity();
        write_json(&self.path, &self.tools)?;
        debug!("Flushed {} tools to {}", self.tools.len(), self.path.display());
        Ok(())
    }

    /// Copy the current file to `<path>.backup`, returning the backup path.
    pub fn backup(&self) -> Result<PathBuf, StoreError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".backup");
        let backup = PathBuf::from(name);
        std::fs::copy(&self.path, &backup).map_err(|source| StoreError::Write {
            path: backup.clone(),
            source,
        })?;
        Ok(backup)
    }

    /// Stars descending; ties keep their previous relative order.
    pub fn sort_by_popularity(&mut self) {
        self.tools.sort_by_key(|t| std::cmp::Reverse(t.stars()));
    }

    /// Fold scrape results into matching records by URL, then re-sort.
    /// Returns how many records were updated.
    pub fn merge(&mut self, results: &[ScrapeResult]) -> usize {
        let by_url: HashMap<&str, &ScrapeResult> =
            results.iter().map(|r| (r.url.as_str(), r)).collect();

        let mut updated = 0;
        for tool in &mut self.tools {
            if let Some(result) = by_url.get(tool.github_url()).copied() {
                apply(tool, result);
                updated += 1;
            }
        }
        self.sort_by_popularity();
        updated
    }

    /// Drop records whose id is listed. Returns the removed records.
    pub fn remove_ids(&mut self, ids: &[i64]) -> Vec<ToolRecord> {
        let ids: HashSet<i64> = ids.iter().copied().collect();
        let (removed, kept): (Vec<ToolRecord>, Vec<ToolRecord>) = std::mem::take(&mut self.tools)
            .into_iter()
            .partition(|t| ids.contains(&t.id()));
        self.tools = kept;
        removed
    }

    /// URLs shared by more than one record, with the ids that share them.
    pub fn duplicate_urls(&self) -> Vec<(String, Vec<i64>)> {
        let mut by_url: HashMap<String, Vec<i64>> = HashMap::new();
        let mut order = Vec::new();
        for tool in self.tools.iter().filter(|t| t.has_url()) {
            let key = tool.github_url().trim().trim_end_matches('/').to_lowercase();
            let ids = by_url.entry(key.clone()).or_default();
            if ids.is_empty() {
                order.push(key);
            }
            ids.push(tool.id());
        }
        order
            .into_iter()
            .filter_map(|url| {
                let ids = by_url.remove(&url)?;
                (ids.len() > 1).then_some((url, ids))
            })
            .collect()
    }

    pub fn top(&self, n: usize) -> Vec<&ToolRecord> {
        let mut refs: Vec<&ToolRecord> = self.tools.iter().collect();
        refs.sort_by_key(|t| std::cmp::Reverse(t.stars()));
        refs.truncate(n);
        refs
    }
}

fn apply(tool: &mut ToolRecord, result: &ScrapeResult) {
    tool.set_stars(result.stars);
    tool.set_forks(result.forks);
    tool.set_watchers(result.watchers);
    if !result.description.is_empty() {
        tool.set_description(&result.description);
    }
    if result.language != UNKNOWN_LANGUAGE && !result.language.is_empty() {
        tool.set_language(&result.language);
    }
    tool.set_topics(&result.topics);
    if !result.topics.is_empty() {
        let tags = union_capped(&tool.tags(), &result.topics, TOPIC_CAP);
        tool.set_tags(&tags);
    }
    tool.set_license(result.license.as_deref());
    if let Some(ref commit) = result.last_commit {
        tool.set_last_updated(commit);
    }
    tool.set_scraped_at(&result.scraped_at);
}

/// Existing tags first, then unseen topics, capped.
pub fn union_capped(existing: &[String], incoming: &[String], cap: usize) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    existing
        .iter()
        .chain(incoming)
        .filter(|t| seen.insert(*t))
        .take(cap)
        .cloned()
        .collect()
}

pub fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Flushes the store after every `every` processed items.
#[derive(Debug)]
pub struct Checkpointer {
    every: usize,
    processed: usize,
}

impl Checkpointer {
    pub fn new(every: usize) -> Self {
        Checkpointer {
            every,
            processed: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Count one processed item; returns true if a flush happened.
    pub fn tick(&mut self, store: &mut DatasetStore) -> Result<bool, StoreError> {
        self.processed += 1;
        if self.every > 0 && self.processed % self.every == 0 {
            store.flush()?;
            println!("Progress saved ({} processed)", self.processed);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn finish(&self, store: &mut DatasetStore) -> Result<(), StoreError> {
        store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn tool(id: i64, url: &str, stars: u64) -> ToolRecord {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("tool-{}", id),
            "category": "utilities",
            "githubUrl": url,
            "stars": stars,
            "description": "original",
            "language": "typescript",
            "tags": ["mcp", "tools"],
            "lastUpdated": "2024-01-01"
        }))
        .unwrap()
    }

    fn result(url: &str, stars: u64) -> ScrapeResult {
        ScrapeResult {
            slug: "o/r".into(),
            url: url.into(),
            stars,
            forks: 4,
            watchers: 2,
            description: "scraped".into(),
            language: "rust".into(),
            topics: vec!["mcp".into(), "rust".into()],
            license: Some("MIT".into()),
            last_commit: Some("2024-06-01T00:00:00Z".into()),
            scraped_at: "2024-06-02 12:00:00".into(),
        }
    }

    fn store(tools: Vec<ToolRecord>) -> DatasetStore {
        DatasetStore::from_tools("unused.json", tools)
    }

    #[test]
    fn merge_overwrites_matching_record() {
        let mut s = store(vec![tool(1, "https://github.com/a/one", 5)]);
        assert_eq!(s.merge(&[result("https://github.com/a/one", 42)]), 1);
        let t = &s.tools[0];
        assert_eq!(t.stars(), 42);
        assert_eq!(t.get("forks"), Some(&json!(4)));
        assert_eq!(t.description(), "scraped");
        assert_eq!(t.language(), "rust");
        assert_eq!(t.tags(), vec!["mcp", "tools", "rust"]);
        assert_eq!(t.topics(), vec!["mcp", "rust"]);
        assert_eq!(t.license(), Some("MIT"));
        assert_eq!(t.last_updated(), "2024-06-01T00:00:00Z");
        assert_eq!(t.scraped_at(), Some("2024-06-02 12:00:00"));
        assert_eq!(t.category(), Some("utilities"));
    }

    #[test]
    fn empty_description_and_unknown_language_keep_existing() {
        let mut s = store(vec![tool(1, "https://github.com/a/one", 5)]);
        let mut r = result("https://github.com/a/one", 9);
        r.description = String::new();
        r.language = UNKNOWN_LANGUAGE.into();
        r.last_commit = None;
        s.merge(&[r]);
        let t = &s.tools[0];
        assert_eq!(t.description(), "original");
        assert_eq!(t.language(), "typescript");
        assert_eq!(t.last_updated(), "2024-01-01");
    }

    #[test]
    fn merge_reorders_by_stars() {
        let mut s = store(vec![
            tool(1, "https://github.com/a/one", 5),
            tool(2, "https://github.com/b/two", 50),
            tool(3, "https://github.com/c/three", 10),
        ]);
        s.merge(&[result("https://github.com/a/one", 100)]);

        let ids: Vec<i64> = s.tools.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(s.tools.windows(2).all(|w| w[0].stars() >= w[1].stars()));
    }

    #[test]
    fn unmatched_records_identical_on_disk() {
        let sparse = json!({
            "id": 2,
            "name": "sparse",
            "category": "database",
            "githubUrl": "https://github.com/b/two",
            "stars": 50,
            "topics": [],
            "license": null,
            "contributors": [],
            "rating": "4.5"
        });
        let dense = json!({
            "id": 1,
            "githubUrl": "https://github.com/a/one",
            "stars": 5,
            "tags": ["mcp"]
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(&path, serde_json::to_string_pretty(&json!([sparse, dense])).unwrap())
            .unwrap();

        let mut s = DatasetStore::load(&path).unwrap();
        s.merge(&[result("https://github.com/a/one", 100)]);
        s.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let saved: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(saved[0]["id"], 1);
        assert_eq!(saved[0]["stars"], 100);
        assert_eq!(
            serde_json::to_string_pretty(&saved[1]).unwrap(),
            serde_json::to_string_pretty(&sparse).unwrap()
        );
        assert!(text.contains(&serde_json::to_string_pretty(&sparse).unwrap().replace('\n', "\n  ")));
    }

    #[test]
    fn load_then_flush_rewrites_same_bytes() {
        let original = serde_json::to_string_pretty(&json!([
            {"id": 3, "name": "c", "stars": 9, "forks": null, "extra": {"nested": true}},
            {"id": 4, "name": "d", "stars": 1, "description": ""}
        ]))
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(&path, &original).unwrap();

        let mut s = DatasetStore::load(&path).unwrap();
        s.merge(&[]);
        s.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut tools = vec![
            tool(1, "https://github.com/a/one", 5),
            tool(2, "https://github.com/b/two", 7),
        ];
        let five: Vec<String> = ["a", "b", "c", "d", "e"].into_iter().map(String::from).collect();
        tools[0].set_tags(&five);
        let mut s = store(tools);
        let results = vec![
            result("https://github.com/a/one", 3),
            result("https://github.com/b/two", 8),
        ];

        s.merge(&results);
        let first = serde_json::to_value(&s.tools).unwrap();
        s.merge(&results);
        let second = serde_json::to_value(&s.tools).unwrap();
        assert_eq!(first, second);

        let one = s.tools.iter().find(|t| t.id() == 1).unwrap();
        assert_eq!(one.tags().len(), TOPIC_CAP);
    }

    #[test]
    fn ties_keep_prior_order() {
        let mut s = store(vec![
            tool(1, "https://github.com/a/one", 5),
            tool(2, "https://github.com/b/two", 5),
            tool(3, "https://github.com/c/three", 9),
        ]);
        s.sort_by_popularity();
        let ids: Vec<i64> = s.tools.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn union_caps_and_dedupes() {
        let existing: Vec<String> = vec!["x".into(), "y".into()];
        let incoming: Vec<String> = vec!["y".into(), "z".into()];
        assert_eq!(union_capped(&existing, &incoming, 6), vec!["x", "y", "z"]);
        assert_eq!(union_capped(&existing, &incoming, 2), vec!["x", "y"]);
    }

    #[test]
    fn flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tools.json");
        let mut s = DatasetStore::from_tools(&path, vec![tool(1, "https://github.com/a/one", 5)]);
        s.flush().unwrap();

        let loaded = DatasetStore::load(&path).unwrap();
        assert_eq!(loaded.tools, s.tools);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetStore::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(DatasetStore::load(&path), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn remove_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        let mut s = DatasetStore::from_tools(
            &path,
            vec![
                tool(1, "https://github.com/a/one", 5),
                tool(2, "https://github.com/b/two", 7),
            ],
        );
        s.flush().unwrap();

        let backup = s.backup().unwrap();
        assert!(backup.to_string_lossy().ends_with("tools.json.backup"));

        let removed = s.remove_ids(&[2, 99]);
        assert_eq!(removed.len(), 1);
        assert_eq!(s.len(), 1);
        assert_eq!(DatasetStore::load(&backup).unwrap().len(), 2);
    }

    #[test]
    fn duplicates_reported() {
        let s = store(vec![
            tool(1, "https://github.com/a/one", 5),
            tool(2, "https://github.com/A/one/", 7),
            tool(3, "https://github.com/c/three", 1),
        ]);
        let dups = s.duplicate_urls();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].1, vec![1, 2]);
    }

    #[test]
    fn checkpoint_every_n() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        let mut s = DatasetStore::from_tools(
            &path,
            vec![
                tool(1, "https://github.com/a/one", 5),
                tool(2, "https://github.com/b/two", 9),
            ],
        );
        let mut cp = Checkpointer::new(3);

        assert!(!cp.tick(&mut s).unwrap());
        assert!(!cp.tick(&mut s).unwrap());
        assert!(!path.exists());
        assert!(cp.tick(&mut s).unwrap());
        assert_eq!(DatasetStore::load(&path).unwrap().tools[0].id(), 2);
        assert!(path.exists());
        assert_eq!(cp.processed(), 3);
    }
}
