//! User records.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// The one account the origin server knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
}

impl User {
    /// The hardcoded record returned by `Session.authenticatedUser`.
    #[must_use]
    pub fn fixed() -> Self {
        Self {
            id: UserId::new(1),
            username: "jt".to_string(),
            first_name: "Joe".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_user_wire_shape() {
        let value = serde_json::to_value(User::fixed()).ok();
        assert_eq!(
            value,
            Some(serde_json::json!({ "id": 1, "username": "jt", "firstName": "Joe" }))
        );
    }
}
