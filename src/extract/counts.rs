use std::sync::LazyLock;

use regex::Regex;

static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:\.(\d+))?([km])?$").unwrap());

/// Parse a counter label such as `1,234`, `2.3k` or `1.2m`.
///
/// The fractional part is applied with integer arithmetic and truncated toward
/// zero. Anything unparseable is 0.
pub fn normalize(text: &str) -> u64 {
    parse(text).unwrap_or(0)
}

/// Whether `text` looks like a counter at all.
pub fn looks_like_count(text: &str) -> bool {
    parse(text).is_some()
}

fn parse(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let caps = COUNT_RE.captures(&cleaned)?;
    let whole: u64 = caps[1].parse().ok()?;
    let multiplier: u64 = match caps.get(3).map(|m| m.as_str()) {
        Some("k") => 1_000,
        Some("m") => 1_000_000,
        _ => 1,
    };

    let fraction = match caps.get(2) {
        Some(frac) => {
            // digits beyond the multiplier's precision cannot contribute
            let digits = &frac.as_str()[..frac.as_str().len().min(6)];
            let numerator: u64 = digits.parse().ok()?;
            let scale = 10u64.pow(digits.len() as u32);
            numerator * multiplier / scale
        }
        None => 0,
    };

    whole.checked_mul(multiplier)?.checked_add(fraction)
}
