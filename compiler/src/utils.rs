//! Utility functions

use strsim::levenshtein;
use url::Url;

/// Convert kebab-case or snake_case to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    s.split(&['_', '-', '.'][..])
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

/// Last non-empty path segment of a card URL, e.g. `person` for
/// `https://demo.com/person/`.
pub fn last_url_segment(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
}

/// Flatten a card URL into a single path component for module identifiers.
pub fn encode_card_url(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme.trim_end_matches('/').replace('/', "-")
}

/// Resolve a module specifier found in a card's source to a card URL.
///
/// Relative specifiers resolve against the card URL treated as a directory;
/// absolute http(s) URLs are returned as-is. Bare specifiers such as
/// `@cardstack/types` are not card references and yield `None`.
pub fn resolve_card_specifier(card_url: &str, specifier: &str) -> Option<String> {
    if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/') {
        let base = Url::parse(&format!("{}/", card_url.trim_end_matches('/'))).ok()?;
        let joined = base.join(specifier).ok()?;
        return Some(joined.as_str().trim_end_matches('/').to_string());
    }

    match Url::parse(specifier) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            Some(url.as_str().trim_end_matches('/').to_string())
        }
        _ => None,
    }
}

/// Split a file name into stem and extension (extension keeps its dot).
pub fn split_extension(file: &str) -> (&str, &str) {
    let name_start = file.rfind('/').map(|i| i + 1).unwrap_or(0);
    match file[name_start..].rfind('.') {
        Some(0) | None => (file, ""),
        Some(dot) => file.split_at(name_start + dot),
    }
}

/// Candidates close to `name`, closest first. A candidate qualifies when it
/// differs only in case, contains or is contained in `name`, or is within a
/// small edit distance scaled to the length of `name`.
pub fn similar_names<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let lower = name.to_lowercase();
    let max_distance = (name.chars().count() / 2).clamp(1, 3);
    let mut ranked: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter(|candidate| *candidate != name)
        .filter_map(|candidate| {
            let candidate_lower = candidate.to_lowercase();
            let rank = if candidate_lower == lower {
                0
            } else if candidate_lower.contains(&lower) || lower.contains(&candidate_lower) {
                1
            } else {
                let distance = levenshtein(&lower, &candidate_lower);
                if distance > max_distance {
                    return None;
                }
                distance + 1
            };
            Some((rank, candidate))
        })
        .collect();
    ranked.sort();
    ranked.into_iter().map(|(_, c)| c.to_string()).collect()
}
