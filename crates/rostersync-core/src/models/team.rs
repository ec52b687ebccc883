//! Team and user models

use serde::{Deserialize, Serialize};

use super::{synced_record, EntityKind, RecordId, RecordMeta};
use crate::util::now_millis;

/// A team roster owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub sport: String,
    #[serde(default)]
    pub season: Option<String>,
}

impl Team {
    #[must_use]
    pub fn new(name: impl Into<String>, sport: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            name: name.into(),
            sport: sport.into(),
            season: None,
        }
    }
}

synced_record!(Team, EntityKind::Team);

/// A member of a team (player, coach, parent...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub team_id: Option<RecordId>,
    pub role: String,
}

impl User {
    #[must_use]
    pub fn new(display_name: impl Into<String>, team_id: Option<RecordId>) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            display_name: display_name.into(),
            email: None,
            team_id,
            role: "player".to_string(),
        }
    }
}

synced_record!(User, EntityKind::User);
