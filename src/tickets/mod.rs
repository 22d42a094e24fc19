pub mod recipients;
pub mod service;
pub mod sla;

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::core::shared::error::CoreResult;
use crate::core::shared::schema::{ticket_history, tickets};
use crate::core::shared::state::AppState;
use crate::core::shared::{TicketCategory, TicketPriority, TicketStatus, TicketType};
use crate::tickets::recipients::TicketParties;
use crate::users::UserPublic;

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = tickets, treat_none_as_null = true)]
pub struct Ticket {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub prioridad: TicketPriority,
    pub categoria: TicketCategory,
    pub tipo: TicketType,
    pub creator_id: i32,
    pub usuario_solicitante_id: Option<i32>,
    pub assigned_to_id: Option<i32>,
    pub empresa_id: i32,
    pub archivo_nombre: Vec<String>,
    pub message: Option<String>,
    pub confirmado_por_usuario: bool,
    pub fecha_confirmacion: Option<DateTime<Utc>>,
    pub rechazado_por_usuario: bool,
    pub fecha_rechazo: Option<DateTime<Utc>>,
    pub sla_total_minutos: Option<i32>,
    pub sla_start_at: Option<DateTime<Utc>>,
    pub sla_green_end_at: Option<DateTime<Utc>>,
    pub sla_yellow_end_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn parties(&self) -> TicketParties {
        TicketParties {
            creator_id: self.creator_id,
            usuario_solicitante_id: self.usuario_solicitante_id,
            assigned_to_id: self.assigned_to_id,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub prioridad: TicketPriority,
    pub categoria: TicketCategory,
    pub tipo: TicketType,
    pub creator_id: i32,
    pub usuario_solicitante_id: Option<i32>,
    pub empresa_id: i32,
    pub archivo_nombre: Vec<String>,
}

/// Append-only audit entry. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = ticket_history)]
pub struct TicketHistory {
    pub id: i32,
    pub ticket_id: i32,
    pub actualizado_por_id: i32,
    pub status_anterior: Option<TicketStatus>,
    pub status_nuevo: Option<TicketStatus>,
    pub prioridad_anterior: Option<TicketPriority>,
    pub prioridad_nueva: Option<TicketPriority>,
    pub mensaje: Option<String>,
    pub adjunto_nombre: Vec<String>,
    pub fecha: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_history)]
pub struct NewTicketHistory {
    pub ticket_id: i32,
    pub actualizado_por_id: i32,
    pub status_anterior: Option<TicketStatus>,
    pub status_nuevo: Option<TicketStatus>,
    pub prioridad_anterior: Option<TicketPriority>,
    pub prioridad_nueva: Option<TicketPriority>,
    pub mensaje: Option<String>,
    pub adjunto_nombre: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub categoria: Option<String>,
    pub tipo: Option<TicketType>,
    pub prioridad: Option<TicketPriority>,
    pub usuario_solicitante_id: Option<i32>,
    pub archivo_nombre: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<TicketStatus>,
    pub prioridad: Option<TicketPriority>,
    pub message: Option<String>,
    pub archivo_nombre: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTiRequest {
    pub ti_user_id: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetSlaRequest {
    pub dias: Option<i32>,
    pub total_minutos: Option<i32>,
    pub green_pct: Option<f64>,
    pub yellow_pct: Option<f64>,
    pub red_pct: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRechazoRequest {
    #[serde(default)]
    pub estado: bool,
}

/// Ticket plus its explicitly loaded relations. Related users are resolved
/// by id at query time; the entity itself only carries foreign keys.
#[derive(Debug, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub creator: Option<UserPublic>,
    pub usuario_solicitante: Option<UserPublic>,
    pub assigned_to: Option<UserPublic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histories: Option<Vec<HistoryEntry>>,
}

/// Flattened history projection with the acting user resolved.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: i32,
    pub fecha: DateTime<Utc>,
    pub status_anterior: Option<TicketStatus>,
    pub status_nuevo: Option<TicketStatus>,
    pub prioridad_anterior: Option<TicketPriority>,
    pub prioridad_nueva: Option<TicketPriority>,
    pub mensaje: Option<String>,
    pub adjunto_nombre: Vec<String>,
    pub actualizado_por: Option<UserPublic>,
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Json(req): Json<CreateTicketRequest>,
) -> CoreResult<Json<TicketView>> {
    let view = service::create(&state, req, actor).await?;
    Ok(Json(view))
}

async fn list_tickets(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> CoreResult<Json<Vec<TicketView>>> {
    let list = service::find_all(&state, actor)?;
    Ok(Json(list))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<TicketView>> {
    let view = service::find_one(&state, id, actor)?;
    Ok(Json(view))
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<UpdateTicketRequest>,
) -> CoreResult<Json<TicketView>> {
    let view = service::update(&state, id, req, actor).await?;
    Ok(Json(view))
}

async fn get_historial(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<Vec<HistoryEntry>>> {
    let entries = service::historial(&state, id, actor)?;
    Ok(Json(entries))
}

async fn assign_ti(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<AssignTiRequest>,
) -> CoreResult<Json<TicketView>> {
    let view = service::assign_ti(&state, id, req.ti_user_id, actor).await?;
    Ok(Json(view))
}

async fn confirmar_resolucion(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<TicketView>> {
    let view = service::confirmar_resolucion(&state, id, actor).await?;
    Ok(Json(view))
}

async fn rechazar_resolucion(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<TicketView>> {
    let view = service::rechazar_resolucion(&state, id, actor).await?;
    Ok(Json(view))
}

async fn reset_rechazo(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<ResetRechazoRequest>,
) -> CoreResult<Json<TicketView>> {
    let view = service::reset_rechazo(&state, id, req.estado, actor)?;
    Ok(Json(view))
}

async fn set_sla(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<SetSlaRequest>,
) -> CoreResult<Json<TicketView>> {
    let view = service::set_sla(&state, id, req, actor)?;
    Ok(Json(view))
}

async fn aceptar_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<i32>,
) -> CoreResult<Json<TicketView>> {
    let view = service::aceptar_ticket(&state, id, actor).await?;
    Ok(Json(view))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket).patch(update_ticket))
        .route("/api/tickets/:id/historial", get(get_historial))
        .route("/api/tickets/:id/asignar-ti", patch(assign_ti))
        .route("/api/tickets/:id/confirmar", patch(confirmar_resolucion))
        .route("/api/tickets/:id/rechazar", patch(rechazar_resolucion))
        .route("/api/tickets/:id/reset-rechazo", patch(reset_rechazo))
        .route("/api/tickets/:id/sla", patch(set_sla))
        .route("/api/tickets/:id/aceptar", patch(aceptar_ticket))
}
