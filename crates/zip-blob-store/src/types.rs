//! Store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archive found in the store directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobListing {
    pub id: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// An image read back out of its archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Statistics about the store directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub total_size: u64,
}

/// Outcome of a single sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stats_default() {
        let stats = StoreStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
    }

    #[test]
    fn test_blob_listing_serialization() {
        let listing = BlobListing {
            id: "aB3dE6gH".to_string(),
            size: 4096,
            modified: Utc::now(),
        };

        let json = serde_json::to_string(&listing).unwrap();
        assert!(json.contains("aB3dE6gH"));
        assert!(json.contains("4096"));

        let deserialized: BlobListing = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.id, listing.id);
        assert_eq!(deserialized.modified, listing.modified);
    }
}
