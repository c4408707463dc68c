//! ---
//! ems_section: "06-security-access-control"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "HTTP basic authentication for the status relay."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;
use vcm_common::auth::{verify_password, Role};
use vcm_common::config::AuthConfig;

use crate::error::ApiError;

/// Username and password taken from an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Decode basic credentials, returning `None` for absent or malformed headers.
pub fn extract_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials {
        username: username.to_owned(),
        password: password.to_owned(),
    })
}

/// Authenticate the request and check it holds `role`.
///
/// Returns the username on success. Unknown users and wrong passwords are
/// indistinguishable to the caller.
pub fn authorize(auth: &AuthConfig, headers: &HeaderMap, role: Role) -> Result<String, ApiError> {
    let Some(credentials) = extract_credentials(headers) else {
        debug!("request without usable basic credentials");
        return Err(ApiError::unauthorized(&auth.realm));
    };
    let Some(user) = auth.user(&credentials.username) else {
        debug!(username = %credentials.username, "unknown user");
        return Err(ApiError::unauthorized(&auth.realm));
    };
    if !verify_password(&credentials.password, &user.password_hash) {
        debug!(username = %credentials.username, "password rejected");
        return Err(ApiError::unauthorized(&auth.realm));
    }
    if !user.has_role(role) {
        debug!(username = %credentials.username, role = role.as_str(), "role missing");
        return Err(ApiError::forbidden(format!(
            "user '{}' lacks the {} role",
            credentials.username,
            role.as_str()
        )));
    }
    Ok(credentials.username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use vcm_common::auth::hash_password_rounds;
    use vcm_common::config::UserConfig;

    fn test_hash(password: &str) -> String {
        hash_password_rounds(password, 1_000).unwrap()
    }

    fn auth_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.users.insert(
            "battery_status".into(),
            UserConfig {
                password_hash: test_hash("password"),
                roles: vec![Role::Publisher, Role::Viewer],
            },
        );
        config.users.insert(
            "view".into(),
            UserConfig {
                password_hash: test_hash("view"),
                roles: vec![Role::Viewer],
            },
        );
        config
    }

    fn basic(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = BASE64.encode(format!("{user}:{password}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn extracts_credentials_with_colon_in_password() {
        let creds = extract_credentials(&basic("view", "a:b")).unwrap();
        assert_eq!(creds.username, "view");
        assert_eq!(creds.password, "a:b");
    }

    #[test]
    fn rejects_non_basic_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(extract_credentials(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(extract_credentials(&headers).is_none());
    }

    #[test]
    fn authorizes_by_role() {
        let auth = auth_config();
        assert_eq!(
            authorize(&auth, &basic("battery_status", "password"), Role::Publisher).unwrap(),
            "battery_status"
        );
        assert_eq!(
            authorize(&auth, &basic("view", "view"), Role::Viewer).unwrap(),
            "view"
        );
        let err = authorize(&auth, &basic("view", "view"), Role::Publisher).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn bad_credentials_are_unauthorized() {
        let auth = auth_config();
        for headers in [basic("view", "wrong"), basic("nobody", "view"), HeaderMap::new()] {
            let err = authorize(&auth, &headers, Role::Viewer).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
