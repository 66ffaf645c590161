use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Outbound link row. `position` is the dense per-profile ordering key;
/// it is NULL only between insert and the assigner's renumbering pass.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub url: String,
    pub position: Option<i32>,
    pub created_at: OffsetDateTime,
}
