use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::external_ids::ExternalIds;
use crate::{DestinationShowId, SourceShowId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MappingOrigin {
    /// Entered by a human; never replaced by automatic resolution
    Manual,
    Auto,
}

/// Resolved link between a source show and a destination show
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowMapping {
    pub source_show_id: SourceShowId,
    pub destination_show_id: DestinationShowId,
    #[serde(default)]
    pub secondary_ids: ExternalIds,
    pub origin: MappingOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ShowMapping {
    pub fn is_manual(&self) -> bool {
        self.origin == MappingOrigin::Manual
    }
}
