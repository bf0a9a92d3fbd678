//! Discovered entities and the work items derived from them.

use serde::{Deserialize, Serialize};

/// Listing details that travel with a discovered entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingMetadata {
    /// Job title of the listing the entity was seen on
    pub title: Option<String>,
    /// Link to the listing
    pub link: Option<String>,
    /// Last location fragment of the listing
    pub location: Option<String>,
}

/// An entity as observed in the live list, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Raw display name
    pub name: String,
    /// Public id on the listing site, used to resolve the external ref
    pub external_id: Option<String>,
    pub metadata: ListingMetadata,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_id: None,
            metadata: ListingMetadata::default(),
        }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ListingMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parse a tab-separated line: `name[\tid[\ttitle[\tlink[\tlocation]]]]`.
    ///
    /// Returns None for blank lines and `#` comments.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            return None;
        }

        let mut fields = line.split('\t').map(str::trim);
        let name = fields.next()?.to_string();
        let mut field = || fields.next().filter(|f| !f.is_empty()).map(str::to_string);

        let external_id = field();
        let metadata = ListingMetadata {
            title: field(),
            link: field(),
            location: field(),
        };

        Some(Self {
            name,
            external_id,
            metadata,
        })
    }
}

/// A unit of scheduler work. Consumed exactly once; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Normalized entity key
    pub key: String,
    pub external_id: Option<String>,
    /// Rating is already fresh in cache; only the secondary chain should run
    pub skip_rating_fetch: bool,
}

impl WorkItem {
    pub fn new(key: impl Into<String>, external_id: Option<String>, skip_rating_fetch: bool) -> Self {
        Self {
            key: key.into(),
            external_id,
            skip_rating_fetch,
        }
    }

    /// Item that forces a rating fetch and skips the secondary chain.
    pub fn refresh(key: impl Into<String>) -> Self {
        Self::new(key, None, false)
    }
}
