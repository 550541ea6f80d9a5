use crate::model::CategoryId;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_CATEGORY_NAME: &str = "Unknown";
pub const UNKNOWN_CATEGORY_COLOR: &str = "#6c757d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

impl Category {
    pub fn new<N: Into<String>, C: Into<String>>(id: CategoryId, name: N, color: C) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
        }
    }

    /// Stand-in for a task whose category is not in the current collection.
    pub fn unknown(id: CategoryId) -> Self {
        Self::new(id, UNKNOWN_CATEGORY_NAME, UNKNOWN_CATEGORY_COLOR)
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_CATEGORY_NAME && self.color == UNKNOWN_CATEGORY_COLOR
    }
}
