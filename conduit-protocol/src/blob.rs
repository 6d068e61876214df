//! Content-addressed blob storage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A content-addressed byte string stored out-of-line from the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: String,
    pub sha256: String,
    pub original_size: i64,
    pub compressed_size: i64,
    pub mime_type: String,
    pub ref_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Threshold above which payload text is spilled to blob storage (§6.4).
pub const LARGE_CONTENT_THRESHOLD_BYTES: usize = 5 * 1024;
