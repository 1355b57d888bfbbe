//! Room addressing for published changes.

use crate::error::Error;

/// Placeholder substituted with the document key.
pub const KEY_PLACEHOLDER: &str = "{key}";

/// Maps document keys to rooms.
///
/// A template has a per-document pattern containing [`KEY_PLACEHOLDER`] and
/// a global room that addresses the whole collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTemplate {
    pattern: String,
    global: String,
}

impl RoomTemplate {
    /// Rooms of the form `<prefix>.<key>`, with `<prefix>` as global room.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let global = prefix.into();
        Self {
            pattern: format!("{}.{}", global, KEY_PLACEHOLDER),
            global,
        }
    }

    /// Rooms rendered from `pattern`, which must contain `{key}`.
    pub fn new(pattern: impl Into<String>, global: impl Into<String>) -> Result<Self, Error> {
        let pattern = pattern.into();
        if !pattern.contains(KEY_PLACEHOLDER) {
            return Err(Error::RoomTemplate(format!(
                "pattern {:?} does not contain {}",
                pattern, KEY_PLACEHOLDER
            )));
        }
        Ok(Self {
            pattern,
            global: global.into(),
        })
    }

    /// Room of one document.
    pub fn room_for(&self, key: &str) -> String {
        self.pattern.replace(KEY_PLACEHOLDER, key)
    }

    /// Room of the whole collection.
    pub fn global_room(&self) -> &str {
        &self.global
    }
}
