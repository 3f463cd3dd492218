use actix_web::cookie::{time::Duration, Cookie, SameSite};

use crate::couch::AUTH_SESSION_COOKIE;
use crate::models::ClientIdentity;

/// Client-readable copy of the session identity
pub const USER_CTX_COOKIE: &str = "userCtx";

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age: Duration::minutes(10),
        }
    }
}

/// Builds the cookies a successful login sends back to the browser
#[derive(Debug, Clone, Copy)]
pub struct CookieFactory {
    cookie_secure: bool,
}

impl CookieFactory {
    #[must_use]
    pub fn new(cookie_secure: bool) -> Self {
        Self { cookie_secure }
    }

    #[must_use]
    pub fn create_cookie(&self, name: &str, value: String, options: CookieOptions) -> Cookie<'static> {
        Cookie::build(name.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.cookie_secure)
            .same_site(options.same_site)
            .path(options.path)
            .max_age(options.max_age)
            .finish()
    }

    /// The native `AuthSession` cookie, living as long as the store's session
    #[must_use]
    pub fn create_auth_session_cookie(&self, value: &str, max_age_seconds: u64) -> Cookie<'static> {
        self.create_cookie(
            AUTH_SESSION_COOKIE,
            value.to_string(),
            CookieOptions {
                max_age: max_age(max_age_seconds),
                ..Default::default()
            },
        )
    }

    /// The `userCtx` cookie the Session Guardian reads its identity from
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be serialized
    pub fn create_user_ctx_cookie(
        &self,
        identity: &ClientIdentity,
        max_age_seconds: u64,
    ) -> Result<Cookie<'static>, serde_json::Error> {
        Ok(self.create_cookie(
            USER_CTX_COOKIE,
            identity.to_cookie_value()?,
            CookieOptions {
                http_only: false,
                max_age: max_age(max_age_seconds),
                ..Default::default()
            },
        ))
    }
}

fn max_age(seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_session_cookie_attributes() {
        let cookie = CookieFactory::new(true).create_auth_session_cookie("abc", 600);

        assert_eq!(cookie.name(), "AuthSession");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(600)));
    }

    #[test]
    fn test_user_ctx_cookie_is_script_readable() {
        let identity = ClientIdentity::new("ari", &["chw"]);
        let cookie = CookieFactory::new(false)
            .create_user_ctx_cookie(&identity, 600)
            .unwrap();

        assert_eq!(cookie.name(), USER_CTX_COOKIE);
        assert_eq!(cookie.http_only(), Some(false));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(ClientIdentity::from_cookie_value(cookie.value()), Some(identity));
    }
}
