//! Domain models for the book library
//!
//! This module contains the shelf/book/list models plus the derived
//! predicates (staleness, redirect candidacy) and sort application used by
//! the sync engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Titles the remote service substitutes when a work record has lost its
/// metadata. Matched case-insensitively.
const PLACEHOLDER_TITLES: &[&str] = &["unknown title", "untitled"];

// =============================================================================
// Availability & Loans
// =============================================================================

/// Lending availability of an edition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    /// Availability not reported by the server
    #[default]
    Unknown,
    /// Available to borrow or read
    Available,
    /// Currently checked out by the user
    CheckedOut,
    /// Not currently lendable
    Unavailable,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available => "available",
            Self::CheckedOut => "checked_out",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "available" => Some(Self::Available),
            "checked_out" => Some(Self::CheckedOut),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of loan/entitlement the user holds on an edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanKind {
    /// Borrowed and readable now
    Borrowed,
    /// On the waitlist for this edition
    Waitlisted,
}

/// A loan or hold on a specific edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub edition_id: String,
    pub kind: LoanKind,
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Book
// =============================================================================

/// A single reading/shelving record.
///
/// `work_id` is the canonical, edition-independent identity and the
/// cross-shelf identity key: a work appears on at most one shelf at a time.
/// `edition_id` names the specific printing and may be empty when the
/// server only knows the work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Specific printing; empty when unknown
    pub edition_id: String,
    /// Canonical work identity (required)
    pub work_id: String,
    pub title: String,
    /// Ordered author names
    pub authors: Vec<String>,
    /// Cover image location, if any
    pub cover_url: Option<String>,
    /// Edition the cover was sourced from, if different
    pub cover_edition_id: Option<String>,
    pub availability: Availability,
    pub added_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Book {
    /// Whether the title is missing or a server-side placeholder.
    pub fn title_is_placeholder(&self) -> bool {
        let trimmed = self.title.trim();
        trimmed.is_empty()
            || PLACEHOLDER_TITLES
                .iter()
                .any(|p| trimmed.eq_ignore_ascii_case(p))
    }

    /// Whether the book carries any cover reference.
    pub fn has_cover(&self) -> bool {
        self.cover_url.is_some() || self.cover_edition_id.is_some()
    }

    /// Whether this record looks like a redirected work.
    ///
    /// True when the work id is present but the metadata is implausibly
    /// empty across the board (placeholder title, no authors, no cover),
    /// the signature of the remote service having merged the underlying
    /// record into another one.
    pub fn needs_redirect_check(&self) -> bool {
        !self.work_id.is_empty()
            && self.title_is_placeholder()
            && self.authors.is_empty()
            && !self.has_cover()
    }

    fn first_author(&self) -> &str {
        self.authors.first().map(String::as_str).unwrap_or("")
    }
}

// =============================================================================
// Shelf
// =============================================================================

/// Sort key for a shelf's books.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Title,
    Author,
    #[default]
    AddedDate,
    LastModified,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
            Self::AddedDate => "added_date",
            Self::LastModified => "last_modified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "author" => Some(Self::Author),
            "added_date" => Some(Self::AddedDate),
            "last_modified" => Some(Self::LastModified),
            _ => None,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A shelf's sort configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfSort {
    pub order: SortOrder,
    pub ascending: bool,
}

impl Default for ShelfSort {
    fn default() -> Self {
        // Newest additions first, matching the server default
        Self {
            order: SortOrder::AddedDate,
            ascending: false,
        }
    }
}

/// A named reading-status collection.
///
/// `total_count` is the server-reported size and may exceed `books.len()`
/// only while a progressive/partial load is in flight; a completed fetch
/// always delivers every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shelf {
    /// Stable identifier assigned by the server
    pub key: String,
    pub name: String,
    /// Ordered per the current sort
    pub books: Vec<Book>,
    /// Server-reported count
    pub total_count: usize,
    pub sort: ShelfSort,
    pub is_visible: bool,
    pub display_order: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Shelf {
    /// Whether this shelf's data is older than `threshold`.
    ///
    /// A shelf that has never synced is always stale.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(synced) => now.signed_duration_since(synced) > threshold,
            None => true,
        }
    }

    /// Whether a work is present on this shelf.
    pub fn contains_work(&self, work_id: &str) -> bool {
        self.books.iter().any(|b| b.work_id == work_id)
    }

    /// Re-apply the configured sort to `books` in place.
    ///
    /// The sort is stable, so books with equal keys keep their relative
    /// order. Missing dates sort last regardless of direction.
    pub fn resort(&mut self) {
        let ShelfSort { order, ascending } = self.sort;
        self.books.sort_by(|a, b| {
            let ordering = match order {
                SortOrder::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                SortOrder::Author => a
                    .first_author()
                    .to_lowercase()
                    .cmp(&b.first_author().to_lowercase()),
                SortOrder::AddedDate => return cmp_dates(a.added_date, b.added_date, ascending),
                SortOrder::LastModified => {
                    return cmp_dates(a.last_modified, b.last_modified, ascending)
                }
            };
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
}

fn cmp_dates(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    ascending: bool,
) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            if ascending {
                a.cmp(&b)
            } else {
                b.cmp(&a)
            }
        }
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

// =============================================================================
// Curated lists
// =============================================================================

/// A user-curated collection, independent of reading status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookList {
    /// List URL, used as its identity
    pub url: String,
    pub name: String,
    /// Number of seed references the list holds
    pub seed_count: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// A resolved list entry ready for display.
///
/// Lists hold opaque seed references to books or authors; resolution
/// happens in the list collaborator and only this result is held in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DisplayItem {
    Book(Book),
    Author { key: String, name: String },
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn book(work_id: &str, title: &str) -> Book {
        Book {
            work_id: work_id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn date(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn placeholder_titles_detected() {
        assert!(book("W1", "").title_is_placeholder());
        assert!(book("W1", "  ").title_is_placeholder());
        assert!(book("W1", "Unknown Title").title_is_placeholder());
        assert!(book("W1", "untitled").title_is_placeholder());
        assert!(!book("W1", "The Left Hand of Darkness").title_is_placeholder());
    }

    #[test]
    fn redirect_check_requires_all_signals() {
        let mut b = book("W9", "Unknown Title");
        assert!(b.needs_redirect_check());

        // Any populated field disqualifies the candidate
        b.authors = vec!["Ursula K. Le Guin".to_string()];
        assert!(!b.needs_redirect_check());

        let mut b = book("W9", "Unknown Title");
        b.cover_url = Some("https://covers.example/9.jpg".to_string());
        assert!(!b.needs_redirect_check());

        let mut b = book("W9", "A Real Title");
        b.authors.clear();
        assert!(!b.needs_redirect_check());

        // No work id means there is nothing to resolve
        let b = book("", "Unknown Title");
        assert!(!b.needs_redirect_check());
    }

    #[test]
    fn staleness_threshold() {
        let now = date(10_000);
        let mut shelf = Shelf {
            key: "reading".to_string(),
            last_synced_at: Some(date(10_000 - 200)),
            ..Default::default()
        };
        assert!(!shelf.is_stale(Duration::seconds(300), now));

        shelf.last_synced_at = Some(date(10_000 - 400));
        assert!(shelf.is_stale(Duration::seconds(300), now));

        shelf.last_synced_at = None;
        assert!(shelf.is_stale(Duration::seconds(300), now));
    }

    #[test]
    fn resort_by_title_descending() {
        let mut shelf = Shelf {
            books: vec![book("W1", "Annihilation"), book("W2", "Borne")],
            sort: ShelfSort {
                order: SortOrder::Title,
                ascending: false,
            },
            ..Default::default()
        };
        shelf.resort();
        assert_eq!(shelf.books[0].work_id, "W2");
        assert_eq!(shelf.books[1].work_id, "W1");
    }

    #[test]
    fn resort_added_date_missing_dates_sort_last() {
        let mut newer = book("W1", "A");
        newer.added_date = Some(date(2_000));
        let mut older = book("W2", "B");
        older.added_date = Some(date(1_000));
        let undated = book("W3", "C");

        let mut shelf = Shelf {
            books: vec![undated.clone(), older.clone(), newer.clone()],
            sort: ShelfSort::default(),
            ..Default::default()
        };
        shelf.resort();
        assert_eq!(shelf.books[0].work_id, "W1");
        assert_eq!(shelf.books[1].work_id, "W2");
        assert_eq!(shelf.books[2].work_id, "W3");

        shelf.sort.ascending = true;
        shelf.resort();
        assert_eq!(shelf.books[0].work_id, "W2");
        assert_eq!(shelf.books[2].work_id, "W3");
    }

    #[test]
    fn sort_order_round_trips() {
        for order in [
            SortOrder::Title,
            SortOrder::Author,
            SortOrder::AddedDate,
            SortOrder::LastModified,
        ] {
            assert_eq!(SortOrder::parse(order.as_str()), Some(order));
        }
        assert_eq!(SortOrder::parse("popularity"), None);
    }

    #[test]
    fn contains_work() {
        let shelf = Shelf {
            books: vec![book("W1", "A"), book("W2", "B")],
            ..Default::default()
        };
        assert!(shelf.contains_work("W2"));
        assert!(!shelf.contains_work("W3"));
    }
}
