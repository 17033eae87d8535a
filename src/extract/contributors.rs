use std::collections::HashSet;

use scraper::{ElementRef, Html};

use super::strategy::parse_selector;
use crate::fetch::slug::repo_owner;
use crate::model::{Contributor, ContributorSource};

const AVATAR_HOST: &str = "avatars.githubusercontent.com";
const BOT_LOGINS: &[&str] = &["apps", "github-actions", "dependabot", "renovate"];
const SITE_PAGES: &[&str] = &[
    "features",
    "enterprise",
    "pricing",
    "marketplace",
    "explore",
    "topics",
    "collections",
    "trending",
    "events",
    "github",
    "login",
    "signup",
    "sponsors",
];

pub fn is_bot(login: &str) -> bool {
    let lower = login.to_lowercase();
    lower.ends_with("[bot]") || BOT_LOGINS.contains(&lower.as_str())
}

/// Contributors visible on a repository page, at most `max`.
///
/// Tries the avatars beside the contributors link first, then any profile
/// link wrapping an avatar.
pub fn extract(markup: &str, max: usize) -> Vec<Contributor> {
    let doc = Html::parse_document(markup);
    let mut list = ContributorList::new(max);

    from_contributors_section(&doc, &mut list);
    if list.is_empty() {
        from_profile_links(&doc, &mut list);
    }
    list.into_vec()
}

/// Repository owner as a stand-in contributor. Low confidence; labeled so.
pub fn owner_fallback(repo_url: &str) -> Option<Contributor> {
    let owner = repo_owner(repo_url)?;
    if owner.is_empty() || is_bot(&owner) {
        return None;
    }
    Some(Contributor {
        avatar_url: format!("https://github.com/{}.png?size=60", owner),
        html_url: format!("https://github.com/{}", owner),
        login: owner,
        contributions: 0,
        source: ContributorSource::OwnerFallback,
    })
}

struct ContributorList {
    max: usize,
    seen: HashSet<String>,
    items: Vec<Contributor>,
}

impl ContributorList {
    fn new(max: usize) -> Self {
        ContributorList {
            max,
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.max
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, login: &str, avatar: &str) {
        let login = login.trim().trim_start_matches('@');
        if login.is_empty() || self.is_full() || is_bot(login) {
            return;
        }
        if !self.seen.insert(login.to_lowercase()) {
            return;
        }
        self.items.push(Contributor {
            login: login.to_string(),
            avatar_url: avatar.to_string(),
            html_url: format!("https://github.com/{}", login),
            contributions: 0,
            source: ContributorSource::Scraped,
        });
    }

    fn into_vec(self) -> Vec<Contributor> {
        self.items
    }
}

fn from_contributors_section(doc: &Html, list: &mut ContributorList) {
    let (Some(link_sel), Some(img_sel)) = (
        parse_selector(r#"a[href*="/graphs/contributors"]"#),
        parse_selector("img[src]"),
    ) else {
        return;
    };

    for link in doc.select(&link_sel) {
        let Some(parent) = link.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        for img in parent.select(&img_sel) {
            let src = img.value().attr("src").unwrap_or_default();
            if !src.contains(AVATAR_HOST) {
                continue;
            }
            if let Some(login) = login_for_avatar(img) {
                list.push(&login, src);
            }
            if list.is_full() {
                return;
            }
        }
    }
}

fn from_profile_links(doc: &Html, list: &mut ContributorList) {
    let (Some(link_sel), Some(img_sel)) = (parse_selector(r#"a[href^="/"]"#), parse_selector("img"))
    else {
        return;
    };

    for link in doc.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default().trim_matches('/');
        if href.is_empty() || href.contains('/') || SITE_PAGES.contains(&href) {
            continue;
        }
        let Some(img) = link.select(&img_sel).next() else {
            continue;
        };
        let src = img.value().attr("src").unwrap_or_default();
        if src.contains(AVATAR_HOST) {
            list.push(href, src);
        }
        if list.is_full() {
            return;
        }
    }
}

/// `alt="@login"`, else the first path segment of the enclosing link.
fn login_for_avatar(img: ElementRef<'_>) -> Option<String> {
    if let Some(alt) = img.value().attr("alt") {
        if let Some(login) = alt.trim().strip_prefix('@') {
            return Some(login.to_string());
        }
    }
    img.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a")
        .and_then(|a| a.value().attr("href"))
        .filter(|href| href.starts_with('/'))
        .and_then(|href| href.trim_matches('/').split('/').next().map(str::to_string))
        .filter(|login| !login.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIDEBAR: &str = r#"
<html><body>
  <div class="BorderGrid-cell">
    <a href="/acme/tool/graphs/contributors">Contributors 12</a>
    <ul>
      <li><a href="/alice"><img src="https://avatars.githubusercontent.com/u/1?s=64" alt="@alice"></a></li>
      <li><a href="/apps/dependabot"><img src="https://avatars.githubusercontent.com/in/29110?s=64" alt="@dependabot"></a></li>
      <li><a href="/bob"><img src="https://avatars.githubusercontent.com/u/2?s=64" alt=""></a></li>
      <li><a href="/alice"><img src="https://avatars.githubusercontent.com/u/1?s=64" alt="@alice"></a></li>
      <li><a href="/renovate-bot[bot]"><img src="https://avatars.githubusercontent.com/u/3?s=64" alt="@renovate-bot[bot]"></a></li>
      <li><img src="https://example.com/not-an-avatar.png" alt="@mallory"></li>
      <li><a href="/carol"><img src="https://avatars.githubusercontent.com/u/4?s=64" alt="@carol"></a></li>
    </ul>
  </div>
</body></html>"#;

    #[test]
    fn sidebar_avatars() {
        let list = extract(SIDEBAR, 5);
        let logins: Vec<&str> = list.iter().map(|c| c.login.as_str()).collect();
        assert_eq!(logins, vec!["alice", "bob", "carol"]);
        assert!(list.iter().all(|c| c.source == ContributorSource::Scraped));
        assert_eq!(list[1].html_url, "https://github.com/bob");
        assert_eq!(list[0].contributions, 0);
    }

    #[test]
    fn capped_at_max() {
        assert_eq!(extract(SIDEBAR, 2).len(), 2);
    }

    #[test]
    fn profile_link_fallback() {
        let page = r#"<html><body>
            <a href="/pricing"><img src="https://avatars.githubusercontent.com/u/9"></a>
            <a href="/dave"><img src="https://avatars.githubusercontent.com/u/5?v=4"></a>
            <a href="/dave/repo"><img src="https://avatars.githubusercontent.com/u/5?v=4"></a>
            <a href="/erin">no avatar</a>
          </body></html>"#;
        let list = extract(page, 5);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].login, "dave");
    }

    #[test]
    fn nothing_found() {
        assert!(extract("<html><body></body></html>", 5).is_empty());
    }

    #[test]
    fn owner_is_labeled_low_confidence() {
        let c = owner_fallback("https://github.com/octo/widgets").unwrap();
        assert_eq!(c.login, "octo");
        assert_eq!(c.source, ContributorSource::OwnerFallback);
        assert_eq!(c.avatar_url, "https://github.com/octo.png?size=60");
        assert!(owner_fallback("nonsense").is_none());
    }

    #[test]
    fn bot_detection() {
        assert!(is_bot("github-actions"));
        assert!(is_bot("Dependabot"));
        assert!(is_bot("somebody[bot]"));
        assert!(!is_bot("alice"));
    }
}
