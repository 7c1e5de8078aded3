use std::sync::RwLock;

/// Source of the bearer credential attached to every HTTP request and to
/// the realtime handshake.
///
/// Injected explicitly wherever a credential is needed; nothing in the
/// client reads ambient storage. The session layer implements this; tests
/// and one-off tools can use [`StaticCredentials`].
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, or `None` when logged out.
    fn bearer_token(&self) -> Option<String>;
}

/// A credential held in memory. Supports swapping and clearing the token
/// so logout can be exercised without a full session layer.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// No token at all; every consumer sees a logged-out state.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials_lifecycle() {
        let creds = StaticCredentials::anonymous();
        assert_eq!(creds.bearer_token(), None);

        creds.set("tok_1");
        assert_eq!(creds.bearer_token().as_deref(), Some("tok_1"));

        creds.clear();
        assert_eq!(creds.bearer_token(), None);
    }
}
