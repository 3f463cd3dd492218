use serde::{Deserialize, Serialize};

/// Role that grants full data-store administration
pub const ADMIN_ROLE: &str = "_admin";

/// Canonical identity extracted from a verified ID token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub name: Option<String>,
    pub username: String,
    pub email: Option<String>,
}

/// Result of exchanging an authorization code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchangeResult {
    pub id_token: String,
    pub user: Claims,
}

/// Authenticated-user context as reported by the data store's `_session`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCtx {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Body of a `_session` response; only `userCtx` matters to the bridge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionResponse {
    #[serde(rename = "userCtx", default)]
    pub user_ctx: UserCtx,
}

/// Client-held copy of the session identity (the `userCtx` cookie)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ClientIdentity {
    #[must_use]
    pub fn new(name: &str, roles: &[&str]) -> Self {
        Self {
            name: Some(name.to_string()),
            roles: roles.iter().map(ToString::to_string).collect(),
        }
    }

    /// Username, if the identity carries a non-empty one
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// True only for the literal `_admin` role
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }

    /// Encode as the value of the `userCtx` cookie (percent-encoded JSON)
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails
    pub fn to_cookie_value(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(urlencoding::encode(&json).into_owned())
    }

    /// Decode a `userCtx` cookie value; malformed values yield `None`
    #[must_use]
    pub fn from_cookie_value(value: &str) -> Option<Self> {
        let decoded = urlencoding::decode(value).ok()?;
        serde_json::from_str(&decoded).ok()
    }
}

impl From<UserCtx> for ClientIdentity {
    fn from(ctx: UserCtx) -> Self {
        Self {
            name: ctx.name,
            roles: ctx.roles,
        }
    }
}

/// The parts of a `_users` document the bridge needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserDoc {
    pub name: Option<String>,
    pub salt: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}
