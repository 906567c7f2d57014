//! User-related models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User profile as returned by the backend.
///
/// The payload is passed through untouched; only a few well-known fields
/// are read for display and for tagging uploads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Value);

impl UserProfile {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// User id as a string. Numeric ids are stringified; missing ids are empty.
    pub fn id(&self) -> String {
        match self.0.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.0.get("firstName").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_accessors() {
        let user = UserProfile::new(json!({
            "id": 42,
            "email": "ada@example.com",
            "firstName": "Ada",
            "role": "admin"
        }));
        assert_eq!(user.id(), "42");
        assert_eq!(user.email(), Some("ada@example.com"));
        assert_eq!(user.first_name(), Some("Ada"));
        assert_eq!(user.as_value()["role"], "admin");
    }

    #[test]
    fn test_profile_missing_fields() {
        let user = UserProfile::default();
        assert_eq!(user.id(), "");
        assert!(user.email().is_none());
        assert!(user.first_name().is_none());
    }
}
