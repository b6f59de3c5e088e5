//! Record types managed by the CLI.

use databank_core::Record;
use databank_core::primitives::DEFAULT_SENTINEL_ID;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An address-book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Contact {
    /// Unsaved contact carrying the sentinel id.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: DEFAULT_SENTINEL_ID,
            name: name.into(),
            email: email.into(),
            enabled: true,
        }
    }

    /// Case-insensitive match on name or email.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle) || self.email.to_lowercase().contains(&needle)
    }
}

impl Default for Contact {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Record for Contact {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_enabled_flag_defaults_to_true() {
        let contact: Contact =
            serde_json::from_str(r#"{"id": 3, "name": "Ada", "email": "ada@example.org"}"#)
                .expect("parse");
        assert!(contact.enabled);
    }

    #[test]
    fn matches_name_or_email_ignoring_case() {
        let contact = Contact::new("Ada Lovelace", "ada@example.org");
        assert!(contact.matches("lovelace"));
        assert!(contact.matches("EXAMPLE"));
        assert!(!contact.matches("babbage"));
        assert_eq!(contact.to_string(), "Ada Lovelace <ada@example.org>");
    }
}
