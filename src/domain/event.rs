//! Events delivered to result sinks.

use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, FinancialSummary, Rating};
use super::work_item::ListingMetadata;

/// Completed vs. total items in the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

/// Partial update for one entity.
///
/// Fields arrive independently; a `None` field means "unchanged", never "cleared".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub rating: Option<Rating>,
    pub financial: Option<FinancialSummary>,
}

impl ItemPatch {
    pub fn rating(rating: Rating) -> Self {
        Self {
            rating: Some(rating),
            financial: None,
        }
    }

    pub fn financial(summary: FinancialSummary) -> Self {
        Self {
            rating: None,
            financial: Some(summary),
        }
    }

    /// Patch carrying whatever the cache already knows.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            rating: entry.rating,
            financial: entry.financial.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.financial.is_none()
    }
}

/// Owned form of every sink callback, for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(Progress),
    ItemResolved { key: String, patch: ItemPatch },
    Discovered { key: String, metadata: ListingMetadata },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(label: &str) -> FinancialSummary {
        FinancialSummary {
            period_label: label.to_string(),
            revenue: 1,
            operating_income: 2,
            net_income: 3,
        }
    }

    #[test]
    fn test_patch_constructors_set_one_field() {
        let patch = ItemPatch::financial(summary("2023"));
        assert!(patch.rating.is_none());
        assert_eq!(patch.financial, Some(summary("2023")));

        let patch = ItemPatch::rating(Rating::Score(4.0));
        assert_eq!(patch.rating, Some(Rating::Score(4.0)));
        assert!(patch.financial.is_none());
    }

    #[test]
    fn test_from_entry() {
        let mut entry = CacheEntry::new("Acme", 0);
        entry.rating = Some(Rating::NotFound);
        let patch = ItemPatch::from_entry(&entry);
        assert_eq!(patch.rating, Some(Rating::NotFound));
        assert!(patch.financial.is_none());
        assert!(!patch.is_empty());
    }
}
