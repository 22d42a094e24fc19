//! User accounts and the directory queries the ticket core relies on.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::core::shared::error::{CoreError, CoreResult};
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub empresa_id: Option<i32>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub empresa_id: Option<i32>,
    pub is_active: bool,
    pub smtp_password: Option<String>,
}

/// Projection safe to return to clients and to embed in ticket views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub empresa_id: Option<i32>,
}

impl From<User> for UserPublic {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            empresa_id: u.empresa_id,
        }
    }
}

pub fn find_by_id(conn: &mut PgConnection, id: i32) -> CoreResult<Option<User>> {
    Ok(users::table
        .filter(users::id.eq(id))
        .first(conn)
        .optional()?)
}

pub fn find_by_empresa(conn: &mut PgConnection, empresa_id: i32) -> CoreResult<Vec<User>> {
    Ok(users::table
        .filter(users::empresa_id.eq(empresa_id))
        .order(users::username.asc())
        .load(conn)?)
}

/// Admin and super-admin accounts of a tenant, used for the new-ticket
/// management fan-out.
pub fn admins_of_empresa(conn: &mut PgConnection, empresa_id: i32) -> CoreResult<Vec<User>> {
    Ok(users::table
        .filter(users::empresa_id.eq(empresa_id))
        .filter(users::role.eq_any([UserRole::Admin, UserRole::SuperAdmin]))
        .load(conn)?)
}

/// Loads several users at once and hands back public projections keyed in
/// call order. Missing ids simply yield `None`.
pub fn load_parties(
    conn: &mut PgConnection,
    ids: &[Option<i32>],
) -> CoreResult<Vec<Option<UserPublic>>> {
    let wanted: Vec<i32> = ids.iter().flatten().copied().collect();
    let found: Vec<User> = if wanted.is_empty() {
        Vec::new()
    } else {
        users::table.filter(users::id.eq_any(&wanted)).load(conn)?
    };
    Ok(ids
        .iter()
        .map(|id| {
            id.and_then(|id| {
                found
                    .iter()
                    .find(|u| u.id == id)
                    .cloned()
                    .map(UserPublic::from)
            })
        })
        .collect())
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> CoreResult<Json<Vec<UserPublic>>> {
    let empresa_id = actor
        .empresa_id
        .ok_or_else(|| CoreError::forbidden("actor has no tenant"))?;
    let mut conn = state.conn.get()?;
    let list = find_by_empresa(&mut conn, empresa_id)?;
    Ok(Json(list.into_iter().map(UserPublic::from).collect()))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<UserPublic>> {
    let mut conn = state.conn.get()?;
    let user =
        find_by_id(&mut conn, id)?.ok_or_else(|| CoreError::not_found("user not found"))?;
    if user.empresa_id != actor.empresa_id && !actor.role.is_admin() {
        return Err(CoreError::forbidden("user belongs to another tenant"));
    }
    Ok(Json(user.into()))
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user))
}
