use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ID: &str = "id";
const NAME: &str = "name";
const CATEGORY: &str = "category";
const GITHUB_URL: &str = "githubUrl";
const STARS: &str = "stars";
const FORKS: &str = "forks";
const WATCHERS: &str = "watchers";
const DESCRIPTION: &str = "description";
const LANGUAGE: &str = "language";
const TAGS: &str = "tags";
const TOPICS: &str = "topics";
const LICENSE: &str = "license";
const LAST_UPDATED: &str = "lastUpdated";
const CONTRIBUTORS: &str = "contributors";
const SCRAPED_AT: &str = "scraped_at";

/// One cataloged tool, as stored in the dataset file.
///
/// Backed by the record's own JSON object. Keys are only written through the
/// setters, so anything the scraper does not touch keeps its value, its
/// presence and its position on every rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ToolRecord {
    id: i64,
    fields: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for ToolRecord {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = fields
            .get(ID)
            .and_then(Value::as_i64)
            .ok_or_else(|| "record without an integer id".to_string())?;
        Ok(ToolRecord { id, fields })
    }
}

impl From<ToolRecord> for Map<String, Value> {
    fn from(record: ToolRecord) -> Self {
        record.fields
    }
}

impl ToolRecord {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        self.str_field(NAME)
    }

    pub fn github_url(&self) -> &str {
        self.str_field(GITHUB_URL)
    }

    pub fn has_url(&self) -> bool {
        !self.github_url().trim().is_empty()
    }

    pub fn stars(&self) -> u64 {
        self.fields.get(STARS).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn description(&self) -> &str {
        self.str_field(DESCRIPTION)
    }

    pub fn language(&self) -> &str {
        self.str_field(LANGUAGE)
    }

    pub fn category(&self) -> Option<&str> {
        self.fields.get(CATEGORY).and_then(Value::as_str)
    }

    pub fn tags(&self) -> Vec<String> {
        self.str_list(TAGS)
    }

    pub fn topics(&self) -> Vec<String> {
        self.str_list(TOPICS)
    }

    #[cfg(test)]
    pub fn license(&self) -> Option<&str> {
        self.fields.get(LICENSE).and_then(Value::as_str)
    }

    #[cfg(test)]
    pub fn last_updated(&self) -> &str {
        self.str_field(LAST_UPDATED)
    }

    #[cfg(test)]
    pub fn scraped_at(&self) -> Option<&str> {
        self.fields.get(SCRAPED_AT).and_then(Value::as_str)
    }

    #[cfg(test)]
    /// Entries that do not parse as contributors are left out.
    pub fn contributors(&self) -> Vec<Contributor> {
        self.fields
            .get(CONTRIBUTORS)
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| Contributor::deserialize(v).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contributor_count(&self) -> usize {
        self.fields
            .get(CONTRIBUTORS)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    /// Raw access to any key, managed or not.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set_name(&mut self, name: &str) {
        self.set(NAME, name);
    }

    pub fn set_category(&mut self, category: &str) {
        self.set(CATEGORY, category);
    }

    pub fn set_stars(&mut self, stars: u64) {
        self.set(STARS, stars);
    }

    pub fn set_forks(&mut self, forks: u64) {
        self.set(FORKS, forks);
    }

    pub fn set_watchers(&mut self, watchers: u64) {
        self.set(WATCHERS, watchers);
    }

    pub fn set_description(&mut self, description: &str) {
        self.set(DESCRIPTION, description);
    }

    pub fn set_language(&mut self, language: &str) {
        self.set(LANGUAGE, language);
    }

    pub fn set_tags(&mut self, tags: &[String]) {
        self.set(TAGS, tags);
    }

    pub fn set_topics(&mut self, topics: &[String]) {
        self.set(TOPICS, topics);
    }

    /// `None` nulls an existing key and never adds one.
    pub fn set_license(&mut self, license: Option<&str>) {
        match license {
            Some(l) => self.set(LICENSE, l),
            None if self.fields.contains_key(LICENSE) => self.set(LICENSE, Value::Null),
            None => {}
        }
    }

    pub fn set_last_updated(&mut self, at: &str) {
        self.set(LAST_UPDATED, at);
    }

    pub fn set_scraped_at(&mut self, at: &str) {
        self.set(SCRAPED_AT, at);
    }

    pub fn set_contributors(&mut self, list: &[Contributor]) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(list)?;
        self.set(CONTRIBUTORS, value);
        Ok(())
    }

    // existing keys keep their position; new ones go last
    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or("")
    }

    fn str_list(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub avatar_url: String,
    pub html_url: String,
    /// 0 when the count could not be determined from the page.
    #[serde(default)]
    pub contributions: u64,
    #[serde(default, skip_serializing_if = "ContributorSource::is_scraped")]
    pub source: ContributorSource,
}

/// Where a contributor entry came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorSource {
    #[default]
    Scraped,
    /// Low-confidence guess: the repository owner taken from the URL.
    OwnerFallback,
}

impl ContributorSource {
    pub fn is_scraped(&self) -> bool {
        matches!(self, ContributorSource::Scraped)
    }
}

/// Fields extracted from one successfully fetched repository page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub slug: String,
    pub url: String,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub description: String,
    pub language: String,
    pub topics: Vec<String>,
    pub license: Option<String>,
    pub last_commit: Option<String>,
    pub scraped_at: String,
}
