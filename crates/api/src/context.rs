use stockroom_auth::Role;
use stockroom_core::OwnerId;

/// Owner whose rows a request may touch.
///
/// Taken from the token subject; immutable and present on every protected route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OwnerContext {
    owner_id: OwnerId,
}

impl OwnerContext {
    pub fn new(owner_id: OwnerId) -> Self {
        Self { owner_id }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    owner_id: OwnerId,
    roles: Vec<Role>,
    access_token: Option<String>,
}

impl PrincipalContext {
    pub fn new(owner_id: OwnerId, roles: Vec<Role>) -> Self {
        Self {
            owner_id,
            roles,
            access_token: None,
        }
    }

    /// Attach the verified bearer token so storage calls can act as the caller.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
