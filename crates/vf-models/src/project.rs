//! Project: the logical owner of a segment timeline.
//!
//! Projects, users, and workflows are referenced only as foreign keys by the
//! core; their CRUD surface lives outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OwnerId, ProjectId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: OwnerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            owner_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
