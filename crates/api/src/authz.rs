//! API-side authorization guard for commands.
//!
//! Enforced at the handler boundary, before the service runs, so the service
//! and storage layers stay auth-agnostic.

use stockroom_auth::{AuthzError, CommandAuthorization, Principal, authorize};

use crate::context::PrincipalContext;

/// Check authorization for a command in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = Principal::from_roles(principal.owner_id(), principal.roles().to_vec());

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}
