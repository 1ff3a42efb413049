use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clipboard::item::ClipboardEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    All,
    Links,
    Other,
    Favorites,
}

impl Tab {
    pub fn matches(&self, entry: &ClipboardEntry) -> bool {
        match self {
            Tab::All => true,
            Tab::Links => is_link(&entry.content),
            Tab::Other => !is_link(&entry.content),
            Tab::Favorites => entry.is_favorite,
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tab::All => "all",
            Tab::Links => "links",
            Tab::Other => "other",
            Tab::Favorites => "favorites",
        };
        f.write_str(name)
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Tab::All),
            "links" => Ok(Tab::Links),
            "other" => Ok(Tab::Other),
            "favorites" => Ok(Tab::Favorites),
            other => Err(format!("unknown tab: {}", other)),
        }
    }
}

/// A single `http://` or `https://` token with no whitespace after trimming.
pub fn is_link(content: &str) -> bool {
    let trimmed = content.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match rest {
        Some(rest) => !rest.is_empty() && !rest.chars().any(char::is_whitespace),
        None => false,
    }
}

/// Entries on `tab` whose content contains `query`, case-insensitively. View order is kept.
pub fn filter_entries<'a>(
    entries: &'a [ClipboardEntry],
    tab: Tab,
    query: Option<&str>,
) -> Vec<&'a ClipboardEntry> {
    let needle = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    entries
        .iter()
        .filter(|e| tab.matches(e))
        .filter(|e| match &needle {
            Some(needle) => e.content.to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TabCounts {
    pub all: usize,
    pub links: usize,
    pub other: usize,
    pub favorites: usize,
}

impl TabCounts {
    pub fn of(entries: &[ClipboardEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut counts, entry| {
            counts.all += 1;
            if is_link(&entry.content) {
                counts.links += 1;
            } else {
                counts.other += 1;
            }
            if entry.is_favorite {
                counts.favorites += 1;
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str, favorite: bool) -> ClipboardEntry {
        ClipboardEntry {
            is_favorite: favorite,
            ..ClipboardEntry::captured(content, 1_000)
        }
    }

    #[test]
    fn test_is_link() {
        assert!(is_link("https://example.com/a?b=c"));
        assert!(is_link("  http://localhost:3000 \n"));
        assert!(!is_link("https://"));
        assert!(!is_link("see https://example.com"));
        assert!(!is_link("https://example.com and more"));
        assert!(!is_link("ftp://example.com"));
    }

    #[test]
    fn test_filter_by_tab_and_query() {
        let entries = vec![
            entry("https://Rust-lang.org", true),
            entry("Hello World", false),
            entry("hello again", true),
        ];

        let links = filter_entries(&entries, Tab::Links, None);
        assert_eq!(links.len(), 1);

        let hello: Vec<_> = filter_entries(&entries, Tab::All, Some("HELLO"))
            .into_iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(hello, vec!["Hello World", "hello again"]);

        let favorites = filter_entries(&entries, Tab::Favorites, Some("rust"));
        assert_eq!(favorites.len(), 1);
        assert_eq!(filter_entries(&entries, Tab::Other, Some("  ")).len(), 2);
    }

    #[test]
    fn test_counts() {
        let entries = vec![
            entry("https://a.io", false),
            entry("text", true),
            entry("more", false),
        ];
        assert_eq!(
            TabCounts::of(&entries),
            TabCounts {
                all: 3,
                links: 1,
                other: 2,
                favorites: 1
            }
        );
    }

    #[test]
    fn test_tab_names_round_trip() {
        for tab in [Tab::All, Tab::Links, Tab::Other, Tab::Favorites] {
            assert_eq!(tab.to_string().parse::<Tab>().unwrap(), tab);
        }
        assert!("videos".parse::<Tab>().is_err());
    }
}
