use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// One way of pulling a value out of a page. Lists of these are tried in
/// order and the first non-empty answer wins.
#[derive(Debug, Clone, Copy)]
pub enum Lookup {
    /// Trimmed text of the matched element.
    Text(&'static str),
    /// Text, or the named attribute when the text is empty.
    TextOr(&'static str, &'static str),
    /// The named attribute only.
    Attr(&'static str, &'static str),
}

impl Lookup {
    fn selector(&self) -> &'static str {
        match *self {
            Lookup::Text(s) | Lookup::TextOr(s, _) | Lookup::Attr(s, _) => s,
        }
    }

    fn value_of(&self, el: ElementRef<'_>) -> Option<String> {
        let value = match self {
            Lookup::Text(_) => element_text(el),
            Lookup::TextOr(_, attr) => {
                let text = element_text(el);
                if text.is_empty() {
                    el.value().attr(attr).unwrap_or_default().trim().to_string()
                } else {
                    text
                }
            }
            Lookup::Attr(_, attr) => el.value().attr(attr)?.trim().to_string(),
        };
        Some(value).filter(|v| !v.is_empty())
    }

    /// Every candidate value this lookup yields, in document order.
    pub fn candidates(&self, doc: &Html) -> Vec<String> {
        let Some(selector) = parse_selector(self.selector()) else {
            return Vec::new();
        };
        doc.select(&selector).filter_map(|el| self.value_of(el)).collect()
    }
}

/// First value across `lookups` that passes `accept`.
pub fn first_match_where<P>(doc: &Html, lookups: &[Lookup], accept: P) -> Option<String>
where
    P: Fn(&str) -> bool,
{
    lookups
        .iter()
        .find_map(|lookup| lookup.candidates(doc).into_iter().find(|v| accept(v)))
}

pub fn first_match(doc: &Html, lookups: &[Lookup]) -> Option<String> {
    first_match_where(doc, lookups, |_| true)
}

pub fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!("Skipping unparseable selector {:?}: {}", css, e);
            None
        }
    }
}

pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <span class="a"></span>
          <span class="b" title="1,024"></span>
          <span class="c">second</span>
          <span class="c">third</span>
          <time datetime="2024-05-01T10:00:00Z">May 1</time>
        </body></html>"#;

    #[test]
    fn earlier_lookup_wins() {
        let doc = Html::parse_document(PAGE);
        let got = first_match(&doc, &[Lookup::Text("span.c"), Lookup::Attr("time", "datetime")]);
        assert_eq!(got.as_deref(), Some("second"));
    }

    #[test]
    fn empty_matches_fall_through() {
        let doc = Html::parse_document(PAGE);
        let got = first_match(&doc, &[Lookup::Text("span.a"), Lookup::Text("span.c")]);
        assert_eq!(got.as_deref(), Some("second"));
    }

    #[test]
    fn attribute_fallback() {
        let doc = Html::parse_document(PAGE);
        let got = first_match(&doc, &[Lookup::TextOr("span.b", "title")]);
        assert_eq!(got.as_deref(), Some("1,024"));
        let got = first_match(&doc, &[Lookup::Attr("time", "datetime")]);
        assert_eq!(got.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn predicate_filters_candidates() {
        let doc = Html::parse_document(PAGE);
        let got = first_match_where(&doc, &[Lookup::Text("span.c")], |v| v != "second");
        assert_eq!(got.as_deref(), Some("third"));
    }

    #[test]
    fn bad_selector_is_skipped() {
        let doc = Html::parse_document(PAGE);
        let got = first_match(&doc, &[Lookup::Text("[[["), Lookup::Text("span.c")]);
        assert_eq!(got.as_deref(), Some("second"));
        assert!(first_match(&doc, &[Lookup::Text("div.none")]).is_none());
    }
}
