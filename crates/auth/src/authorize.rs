use std::collections::HashSet;

use thiserror::Error;

use stockroom_core::OwnerId;

use crate::{Permission, Role};

/// A resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub owner_id: OwnerId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Build a principal whose permissions come from the built-in role policy.
    pub fn from_roles(owner_id: OwnerId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            owner_id,
            roles,
            permissions,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked before a write runs).
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Role -> permission policy.
///
/// `admin` grants everything, `editor` can change inventory, `viewer` can
/// only read. Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut granted: Vec<Permission> = Vec::new();
    let mut grant = |p: &'static str| {
        let perm = Permission::new(p);
        if !granted.contains(&perm) {
            granted.push(perm);
        }
    };

    for role in roles {
        match role.as_str() {
            Role::ADMIN => grant("*"),
            Role::EDITOR => {
                grant(Permission::READ);
                grant(Permission::WRITE);
                grant(Permission::ADJUST);
                grant(Permission::IMPORT);
            }
            Role::VIEWER => grant(Permission::READ),
            other => tracing::debug!(role = other, "ignoring unknown role"),
        }
    }

    granted
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[&'static str]) -> Principal {
        Principal::from_roles(OwnerId::new(), roles.iter().map(|r| Role::new(*r)).collect())
    }

    #[test]
    fn admin_has_wildcard() {
        let p = principal(&["admin"]);
        assert!(p.permissions.iter().any(Permission::is_wildcard));
        assert_eq!(authorize(&p, &Permission::new("anything.at.all")), Ok(()));
    }

    #[test]
    fn editor_can_write_but_viewer_cannot() {
        let editor = principal(&["editor"]);
        let viewer = principal(&["viewer"]);
        let write = Permission::new(Permission::WRITE);

        assert_eq!(authorize(&editor, &write), Ok(()));
        assert_eq!(
            authorize(&viewer, &write),
            Err(AuthzError::Forbidden(Permission::WRITE.to_string()))
        );
        assert_eq!(authorize(&viewer, &Permission::new(Permission::READ)), Ok(()));
    }

    #[test]
    fn unknown_roles_grant_nothing_and_duplicates_collapse() {
        assert!(principal(&["auditor"]).permissions.is_empty());

        let p = principal(&["viewer", "editor", "viewer"]);
        let reads = p
            .permissions
            .iter()
            .filter(|perm| perm.as_str() == Permission::READ)
            .count();
        assert_eq!(reads, 1);
    }
}
