//! Work Record Resolution
//!
//! Abstracts canonical work-record lookups for the redirect repair pass.
//! When the remote service merges or moves a work record, the old id keeps
//! resolving but returns a redirect stub; the collaborator follows that
//! stub a single hop and reports the replacement identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Metadata carried by a resolved work record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedWork {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub cover_url: Option<String>,
    pub cover_edition_id: Option<String>,
}

/// Result of a single-hop redirect resolution.
///
/// `new_work_id` is `Some` only when the fetched record was a redirect stub
/// and the collaborator followed it; `resolved` then describes the target
/// record. Chains deeper than one hop are not followed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub resolved: ResolvedWork,
    pub new_work_id: Option<String>,
}

/// Work resolution trait
#[async_trait]
pub trait WorkResolver: Send + Sync {
    /// Fetch the work record for `work_id`, following at most one redirect.
    async fn resolve_work_redirect(&self, work_id: &str) -> Result<WorkRecord>;
}
