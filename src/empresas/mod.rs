//! Tenant (empresa) records. Narrow contract: validate, persist, return.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::core::shared::error::{CoreError, CoreResult};
use crate::core::shared::schema::empresas;
use crate::core::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = empresas)]
pub struct Empresa {
    pub id: i32,
    pub nombre: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = empresas)]
pub struct NewEmpresa {
    pub nombre: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmpresaRequest {
    pub nombre: String,
}

pub fn find_one(conn: &mut PgConnection, id: i32) -> CoreResult<Option<Empresa>> {
    Ok(empresas::table
        .filter(empresas::id.eq(id))
        .first(conn)
        .optional()?)
}

async fn create_empresa(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Json(req): Json<CreateEmpresaRequest>,
) -> CoreResult<Json<Empresa>> {
    if !actor.role.is_admin() {
        return Err(CoreError::forbidden("only admins may create tenants"));
    }
    if req.nombre.trim().is_empty() {
        return Err(CoreError::validation("tenant name is required"));
    }
    let mut conn = state.conn.get()?;
    let empresa: Empresa = diesel::insert_into(empresas::table)
        .values(&NewEmpresa { nombre: req.nombre })
        .get_result(&mut conn)?;
    Ok(Json(empresa))
}

async fn get_empresa(
    State(state): State<Arc<AppState>>,
    _actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<Empresa>> {
    let mut conn = state.conn.get()?;
    let empresa =
        find_one(&mut conn, id)?.ok_or_else(|| CoreError::not_found("tenant not found"))?;
    Ok(Json(empresa))
}

async fn list_empresas(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> CoreResult<Json<Vec<Empresa>>> {
    if !actor.role.is_admin() {
        return Err(CoreError::forbidden("only admins may list tenants"));
    }
    let mut conn = state.conn.get()?;
    let list: Vec<Empresa> = empresas::table.order(empresas::nombre.asc()).load(&mut conn)?;
    Ok(Json(list))
}

pub fn configure_empresas_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/empresas", get(list_empresas).post(create_empresa))
        .route("/api/empresas/:id", get(get_empresa))
}
