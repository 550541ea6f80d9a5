use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Ids arrive as strings or bare numbers depending on who produced them.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl AsRef<str>) -> Self {
                Self(raw.as_ref().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::new(raw)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = RawId::deserialize(deserializer)?;
                Ok(Self::new(String::from(raw)))
            }
        }
    };
}

string_id!(
    /// Identifier of a task. Ids minted locally for creates that have not
    /// been confirmed yet start with `tmp-`.
    TaskId
);

string_id!(CategoryId);

impl Default for CategoryId {
    fn default() -> Self {
        Self(String::new())
    }
}

const TEMPORARY_PREFIX: &str = "tmp-";

impl TaskId {
    pub fn temporary(sequence: u64) -> Self {
        Self(format!("{TEMPORARY_PREFIX}{sequence}"))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }
}
