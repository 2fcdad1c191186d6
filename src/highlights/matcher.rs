//! Highlight identity and hit-testing
//!
//! Two pure operations sit at the centre of highlight sync:
//!
//! - [`identifier_for`] derives a record key from the highlighted text and
//!   its page, so the same selection made on two devices lands on one record.
//! - [`find`] resolves a rectangle (a tap, or a fresh selection) to a known
//!   highlight on the page.

use sha1::{Digest, Sha1};

use super::geometry::Bounds;
use super::types::HighlightRegion;

/// Content-derived identifier for a highlight.
///
/// SHA-1 over `text` immediately followed by the decimal page number,
/// as 40 lowercase hex characters. Empty text is allowed.
pub fn identifier_for(text: &str, page: u32) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hasher.update(page.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Find the highlight identified by `query`.
///
/// Exact bounds win over containment regardless of position. Within each
/// phase the first region in iteration order is returned.
pub fn find<'a, I>(regions: I, query: &Bounds) -> Option<&'a HighlightRegion>
where
    I: IntoIterator<Item = &'a HighlightRegion>,
    I::IntoIter: Clone,
{
    let mut regions = regions.into_iter();

    regions
        .clone()
        .find(|r| r.bounds.same_as(query))
        .or_else(|| regions.find(|r| r.bounds.encloses(query)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(text: &str, bounds: Bounds) -> HighlightRegion {
        HighlightRegion::new("book-1", text, 0, bounds, None, true)
    }

    #[test]
    fn test_identifier_known_vector() {
        assert_eq!(
            identifier_for("abc", 1),
            "9ee036287b4cfbcfa3b5bbfcf92d46eb5e75df96"
        );
    }

    #[test]
    fn test_identifier_deterministic() {
        assert_eq!(identifier_for("hello world", 0), identifier_for("hello world", 0));
        assert_eq!(
            identifier_for("hello world", 0),
            "1152469ec5d20c99718e3de6710c3aba66116407"
        );
    }

    #[test]
    fn test_identifier_sensitivity() {
        assert_ne!(identifier_for("abc", 1), identifier_for("abd", 1));
        assert_ne!(identifier_for("abc", 1), identifier_for("abc", 2));
    }

    #[test]
    fn test_identifier_empty_text() {
        let id = identifier_for("", 3);
        assert_eq!(id, "77de68daecd823babbb58edb1c8e14d7106e83bb");
        assert_eq!(id, identifier_for("", 3));
    }

    #[test]
    fn test_identifier_plain_concatenation() {
        // Devices hash "text" + "page" with no separator
        assert_eq!(identifier_for("a1", 1), identifier_for("a", 11));
    }

    #[test]
    fn test_exact_match_beats_containment() {
        let query = Bounds::new(10.0, 10.0, 20.0, 10.0);
        let exact = region("exact", query);
        let outer = region("outer", Bounds::new(0.0, 0.0, 100.0, 50.0));

        let forward = [outer.clone(), exact.clone()];
        assert_eq!(find(&forward, &query).unwrap().text, "exact");

        let backward = [exact, outer];
        assert_eq!(find(&backward, &query).unwrap().text, "exact");
    }

    #[test]
    fn test_containment_fallback() {
        let outer = region("outer", Bounds::new(0.0, 0.0, 100.0, 50.0));
        let query = Bounds::new(10.0, 10.0, 20.0, 10.0);
        assert_eq!(find([&outer], &query).unwrap().text, "outer");
    }

    #[test]
    fn test_no_match() {
        let r = region("r", Bounds::new(0.0, 0.0, 10.0, 10.0));
        assert!(find([&r], &Bounds::new(50.0, 50.0, 5.0, 5.0)).is_none());
    }

    #[test]
    fn test_identical_bounds_match() {
        let b = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let r = region("r", b);
        assert_eq!(find([&r], &b).unwrap().text, "r");
    }

    #[test]
    fn test_first_containment_wins() {
        let query = Bounds::new(10.0, 10.0, 5.0, 5.0);
        let big = region("big", Bounds::new(0.0, 0.0, 500.0, 500.0));
        let small = region("small", Bounds::new(5.0, 5.0, 20.0, 20.0));

        // No smallest-area preference
        let regions = [big, small];
        assert_eq!(find(&regions, &query).unwrap().text, "big");
    }

    #[test]
    fn test_first_exact_wins() {
        let b = Bounds::new(1.0, 1.0, 1.0, 1.0);
        let regions = [region("first", b), region("second", b)];
        assert_eq!(find(&regions, &b).unwrap().text, "first");
    }

    #[test]
    fn test_empty_input() {
        let regions: Vec<HighlightRegion> = Vec::new();
        assert!(find(&regions, &Bounds::default()).is_none());
    }
}
