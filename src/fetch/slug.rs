use url::Url;

use crate::error::FetchError;

/// Strip trailing slash, query and fragment.
pub fn normalize_url(raw: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(raw.trim()).map_err(|_| FetchError::InvalidUrl(raw.to_string()))?;
    url.set_query(None);
    url.set_fragment(None);
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    Ok(url)
}

/// `owner/repo` from a repository URL. A single path segment is accepted as-is.
pub fn repo_slug(raw: &str) -> Result<String, FetchError> {
    let url = normalize_url(raw)?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).take(2).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [owner, repo] => Ok(format!("{}/{}", owner, repo.trim_end_matches(".git"))),
        [only] => Ok(only.to_string()),
        _ => Err(FetchError::InvalidUrl(raw.to_string())),
    }
}

/// First path segment of a repository URL.
pub fn repo_owner(raw: &str) -> Option<String> {
    let slug = repo_slug(raw).ok()?;
    slug.split('/').next().map(str::to_string)
}

/// Last path segment of the slug, e.g. `repo` for `owner/repo`.
pub fn repo_name(raw: &str) -> Option<String> {
    let slug = repo_slug(raw).ok()?;
    slug.rsplit('/').next().map(str::to_string)
}

pub fn cache_file_name(slug: &str) -> String {
    format!("{}.html", slug.replace('/', "__"))
}
