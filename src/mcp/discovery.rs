//! Picking a notebook out of a `notebook_list` result.
//!
//! The list tool answers with free text. Usually that text is JSON in one of
//! three shapes; sometimes it is prose. Selection tries, in order:
//!
//! 1. JSON: an array, `{"notebooks": [...]}`, or a single notebook object.
//!    A title containing the keyword wins, otherwise the first entry.
//! 2. The first UUID anywhere in the text.
//! 3. The first `ID: <token>` label.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// One notebook as reported by the list tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotebookEntry {
    /// Primary identifier.
    #[serde(default)]
    pub id: Option<Value>,
    /// Alternate identifier used by some server versions.
    #[serde(default)]
    pub notebook_id: Option<Value>,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
}

impl NotebookEntry {
    /// The entry's identifier as text, preferring `id` over `notebook_id`.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        [&self.id, &self.notebook_id]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// The shapes a JSON notebook listing can take.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NotebookListing {
    /// A bare array of notebooks.
    List(Vec<NotebookEntry>),
    /// An object wrapping the array.
    Wrapped {
        /// The wrapped notebooks.
        notebooks: Vec<NotebookEntry>,
    },
    /// A single notebook object.
    Single(NotebookEntry),
}

impl NotebookListing {
    /// Entries that carry an identifier, in listing order.
    #[must_use]
    pub fn candidates(self) -> Vec<NotebookEntry> {
        let entries = match self {
            Self::List(entries) | Self::Wrapped { notebooks: entries } => entries,
            Self::Single(entry) => vec![entry],
        };
        entries
            .into_iter()
            .filter(|entry| entry.identifier().is_some())
            .collect()
    }
}

/// How a notebook was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// From a JSON listing.
    Json,
    /// From a UUID in free text.
    Uuid,
    /// From an `ID:` label in free text.
    LabeledId,
}

/// The chosen notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Notebook identifier.
    pub id: String,
    /// Title, when the listing had one.
    pub title: Option<String>,
    /// Which rule produced the match.
    pub via: SelectionSource,
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("UUID pattern is valid")
    })
}

fn labeled_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"ID:\s*([^\s),]+)").expect("ID pattern is valid")
    })
}

/// Chooses a notebook from the list tool's text output.
///
/// `keyword` is matched case-insensitively against titles; an empty keyword
/// means "take the first".
#[must_use]
pub fn select_notebook(text: &str, keyword: &str) -> Option<Selection> {
    select_from_json(text, keyword)
        .or_else(|| select_uuid(text))
        .or_else(|| select_labeled_id(text))
}

fn select_from_json(text: &str, keyword: &str) -> Option<Selection> {
    let listing: NotebookListing = serde_json::from_str(text.trim()).ok()?;
    let candidates = listing.candidates();
    let keyword = keyword.to_lowercase();

    let preferred = if keyword.is_empty() {
        None
    } else {
        candidates.iter().find(|entry| {
            entry
                .title
                .as_deref()
                .is_some_and(|title| title.to_lowercase().contains(&keyword))
        })
    };

    let chosen = preferred.or_else(|| candidates.first())?;
    Some(Selection {
        id: chosen.identifier()?,
        title: chosen.title.clone(),
        via: SelectionSource::Json,
    })
}

fn select_uuid(text: &str) -> Option<Selection> {
    uuid_pattern().find(text).map(|m| Selection {
        id: m.as_str().to_string(),
        title: None,
        via: SelectionSource::Uuid,
    })
}

fn select_labeled_id(text: &str) -> Option<Selection> {
    labeled_id_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| Selection {
            id: m.as_str().to_string(),
            title: None,
            via: SelectionSource::LabeledId,
        })
}
