//! `stockroom-auth`: authentication/authorization boundary.
//!
//! Tokens are issued by the hosted backend; this crate verifies them and maps
//! roles to permissions. It is decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize, permissions_for_roles};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use roles::Role;
