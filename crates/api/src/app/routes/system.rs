use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};

use stockroom_auth::{Permission, permissions_for_roles};

use crate::app::dto::WhoAmIResponse;
use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::{self, AppServices};
use crate::context::{OwnerContext, PrincipalContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(WhoAmIResponse {
        owner_id: principal.owner_id().to_string(),
        roles: principal.roles().iter().map(|r| r.as_str().to_string()).collect(),
        permissions: permissions_for_roles(principal.roles())
            .iter()
            .map(|p| p.as_str().to_string())
            .collect(),
    })
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let cmd = CmdAuth::new((), &[Permission::READ]);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }
    services::owner_sse_stream(services, owner.owner_id()).into_response()
}
