//! Traits for the external collaborators: the image decode engine and the
//! project storage backend. Both are opaque to this crate; tests substitute
//! in-memory implementations.

use std::sync::Arc;

use crate::error::SessionError;

/// Quality level of a progressive decode. The numeric value participates in
/// the stamp ordering (`version * 10 + tier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tier {
    SuperLow = 0,
    Low = 1,
    Full = 2,
}

/// One open decode session for a single source image.
///
/// The engine is expensive and not assumed safe for concurrent invocation;
/// all calls are funneled through the scheduler's single worker. A `None`
/// return means the decode failed; the engine reports no further detail.
pub trait DecodeSession: Send + Sync {
    fn decode(&self, tier: Tier, edit_json: &str) -> Option<Vec<u8>>;
}

/// Factory for decode sessions.
pub trait DecodeEngine: Send + Sync {
    fn open_session(&self, raw: &[u8]) -> Result<Arc<dyn DecodeSession>, SessionError>;
}

/// Persistence collaborator for the storage worker. Implementations own their
/// own I/O; calls are made off the decode worker and may block.
pub trait ProjectStore: Send + Sync {
    fn load_adjustments(&self, project_id: &str) -> anyhow::Result<Option<String>>;
    fn save_adjustments(&self, project_id: &str, json: &str) -> anyhow::Result<()>;
    fn save_thumbnail(&self, project_id: &str, jpeg: &[u8]) -> anyhow::Result<()>;
}
