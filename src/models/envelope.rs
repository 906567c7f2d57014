//! Response envelope shared by all backend endpoints

use serde::Deserialize;

use super::UserProfile;

/// `{success, data, message}` wrapper around every backend payload.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// `data` of a successful login or refresh-token exchange.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_envelope() {
        let body = r#"{
            "success": true,
            "data": {
                "accessToken": "at",
                "refreshToken": "rt",
                "user": {"id": "u1", "email": "a@b.c"}
            }
        }"#;
        let env: Envelope<TokenGrant> = serde_json::from_str(body).unwrap();
        assert!(env.success);
        let data = env.data.unwrap();
        assert_eq!(data.access_token.as_deref(), Some("at"));
        assert_eq!(data.refresh_token.as_deref(), Some("rt"));
        assert_eq!(data.user.unwrap().id(), "u1");
    }

    #[test]
    fn test_parse_failure_envelope() {
        let body = r#"{"success": false, "message": "Invalid credentials"}"#;
        let env: Envelope<TokenGrant> = serde_json::from_str(body).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.message.as_deref(), Some("Invalid credentials"));
    }
}
