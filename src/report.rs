//! Ordering of cached results for listings.

use std::cmp::Ordering;

use crate::domain::CacheEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Name,
    Rating,
}

/// Sort entries in place.
///
/// By rating, scores come first (highest first when `descending`) and entries
/// without a score always sink to the end, ordered by name.
pub fn sort_entries(entries: &mut [CacheEntry], key: SortKey, descending: bool) {
    match key {
        SortKey::Name => {
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            if descending {
                entries.reverse();
            }
        }
        SortKey::Rating => entries.sort_by(|a, b| compare_by_rating(a, b, descending)),
    }
}

fn compare_by_rating(a: &CacheEntry, b: &CacheEntry, descending: bool) -> Ordering {
    let score_a = a.rating.and_then(|r| r.score());
    let score_b = b.rating.and_then(|r| r.score());

    match (score_a, score_b) {
        (Some(x), Some(y)) => {
            let ord = x.total_cmp(&y);
            let ord = if descending { ord.reverse() } else { ord };
            ord.then_with(|| a.key.cmp(&b.key))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.key.cmp(&b.key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Rating;

    fn entry(key: &str, rating: Option<Rating>) -> CacheEntry {
        let mut entry = CacheEntry::new(key, 0);
        entry.rating = rating;
        entry
    }

    fn keys(entries: &[CacheEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    fn sample() -> Vec<CacheEntry> {
        vec![
            entry("Delta", Some(Rating::NotFound)),
            entry("Acme", Some(Rating::Score(3.1))),
            entry("Gamma", None),
            entry("Beta", Some(Rating::Score(4.4))),
            entry("Echo", Some(Rating::Forbidden)),
        ]
    }

    #[test]
    fn test_sort_by_name() {
        let mut entries = sample();
        sort_entries(&mut entries, SortKey::Name, false);
        assert_eq!(keys(&entries), vec!["Acme", "Beta", "Delta", "Echo", "Gamma"]);

        sort_entries(&mut entries, SortKey::Name, true);
        assert_eq!(keys(&entries), vec!["Gamma", "Echo", "Delta", "Beta", "Acme"]);
    }

    #[test]
    fn test_sort_by_rating_sentinels_last() {
        let mut entries = sample();
        sort_entries(&mut entries, SortKey::Rating, false);
        assert_eq!(keys(&entries), vec!["Acme", "Beta", "Delta", "Echo", "Gamma"]);

        sort_entries(&mut entries, SortKey::Rating, true);
        assert_eq!(keys(&entries), vec!["Beta", "Acme", "Delta", "Echo", "Gamma"]);
    }
}
