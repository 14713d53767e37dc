//! Target allow-list for the external proxy.
//!
//! # Design Decisions
//! - Entries and targets are compared in normalized URL form, so
//!   `https://Example.com` and `https://example.com/` are the same entry
//! - A prefix only matches on a path boundary: `https://a.example.com`
//!   does not admit `https://a.example.com.evil.net`
//! - An empty list admits everything

use url::Url;

/// Permitted external proxy targets.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    prefixes: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = entries
            .into_iter()
            .map(Into::into)
            .filter(|e: &String| !e.is_empty())
            .map(|e| normalize(&e).unwrap_or(e))
            .collect();
        Self { prefixes }
    }

    /// True when no restriction is configured.
    pub fn is_unrestricted(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn permits(&self, target: &Url) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let target = target.as_str();
        self.prefixes.iter().any(|prefix| matches_prefix(prefix, target))
    }
}

fn normalize(entry: &str) -> Option<String> {
    Url::parse(entry).ok().map(String::from)
}

fn matches_prefix(prefix: &str, target: &str) -> bool {
    match target.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => prefix.ends_with('/') || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}
