use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use stockroom_auth::Permission;
use stockroom_inventory::{ItemPatch, ItemQuery, NewItem};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{OwnerContext, PrincipalContext};

type Response = axum::response::Response;

pub fn router() -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/low-stock", get(low_stock_items))
        .route("/items/export", get(export_items))
        .route("/items/import", post(import_items))
        .route("/items/:id", get(get_item).put(update_item).delete(delete_item))
        .route("/items/:id/adjust", post(adjust_stock))
        .route("/items/:id/movements", get(list_movements))
}

fn guard<C>(principal: &PrincipalContext, cmd: &CmdAuth<C>) -> Result<(), Response> {
    crate::authz::authorize_command(principal, cmd).map_err(errors::forbidden)
}

fn bad_request(message: impl Into<String>) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<ItemQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return bad_request(e.body_text()),
    };
    let cmd = CmdAuth::new(query, &[Permission::READ]);
    if let Err(resp) = guard(&principal, &cmd) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.search_items(owner.owner_id(), &cmd.inner).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<NewItem>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return bad_request(e.body_text()),
    };
    let cmd = CmdAuth::new(body, &[Permission::WRITE]);
    if let Err(resp) = guard(&principal, &cmd) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.create_item(owner.owner_id(), cmd.inner).await {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn low_stock_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = guard(&principal, &CmdAuth::new((), &[Permission::READ])) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.low_stock_items(owner.owner_id()).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn export_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = guard(&principal, &CmdAuth::new((), &[Permission::READ])) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.export_csv(owner.owner_id()).await {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"inventory.csv\""),
            ],
            csv,
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn import_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: String,
) -> Response {
    let cmd = CmdAuth::new(body, &[Permission::IMPORT]);
    if let Err(resp) = guard(&principal, &cmd) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.import_csv(owner.owner_id(), &cmd.inner).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match dto::parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = guard(&principal, &CmdAuth::new((), &[Permission::READ])) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.get_item(owner.owner_id(), id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<ItemPatch>, JsonRejection>,
) -> Response {
    let id = match dto::parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(patch) = match body {
        Ok(b) => b,
        Err(e) => return bad_request(e.body_text()),
    };
    let cmd = CmdAuth::new(patch, &[Permission::WRITE]);
    if let Err(resp) = guard(&principal, &cmd) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.update_item(owner.owner_id(), id, cmd.inner).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match dto::parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = guard(&principal, &CmdAuth::new(id, &[Permission::WRITE])) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.delete_item(owner.owner_id(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> Response {
    let id = match dto::parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let command = match body {
        Ok(Json(req)) => match req.into_command() {
            Ok(c) => c,
            Err(resp) => return resp,
        },
        Err(e) => return bad_request(e.body_text()),
    };
    let cmd = CmdAuth::new(command, &[Permission::ADJUST]);
    if let Err(resp) = guard(&principal, &cmd) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.adjust_stock(owner.owner_id(), id, cmd.inner).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match dto::parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = guard(&principal, &CmdAuth::new((), &[Permission::READ])) {
        return resp;
    }

    let inventory = services.inventory_for(&principal);
    match inventory.movements_for(owner.owner_id(), id).await {
        Ok(movements) => Json(dto::MovementsResponse { item_id: id, movements }).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
