//! In-app notification inbox.
//!
//! Rows are written best-effort by the ticket operations; the inbox shows
//! the newest entries first and is capped so stale rows never pile up.

use axum::extract::State;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::core::shared::error::CoreResult;
use crate::core::shared::schema::notifications;
use crate::core::shared::state::AppState;
use crate::core::shared::{NotificationType, TicketStatus};

/// Newest-first window returned to a user.
pub const INBOX_LIMIT: i64 = 30;

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub ticket_id: i32,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i32,
    pub ticket_id: i32,
    pub kind: NotificationType,
    pub message: String,
}

/// Human-readable inbox line for a ticket event.
pub fn default_message(
    kind: NotificationType,
    ticket_id: i32,
    title: &str,
    status: TicketStatus,
) -> String {
    match kind {
        NotificationType::TicketCreated => {
            format!("Se creó el ticket #{ticket_id}: {title}")
        }
        NotificationType::TicketAssigned => {
            format!("El ticket #{ticket_id} ({title}) fue asignado")
        }
        NotificationType::StatusChanged => {
            format!("El ticket #{ticket_id} ({title}) cambió a {status}")
        }
        NotificationType::CommentAdded => {
            format!("Nuevo comentario en el ticket #{ticket_id} ({title})")
        }
        NotificationType::TicketConfirmed => {
            format!("La resolución del ticket #{ticket_id} fue confirmada")
        }
        NotificationType::TicketRejected => {
            format!("La resolución del ticket #{ticket_id} fue rechazada")
        }
        NotificationType::SlaAlert => {
            format!("El ticket #{ticket_id} ({title}) está por vencer su SLA")
        }
    }
}

/// Inserts one row per recipient. A no-op for an empty recipient list.
pub fn create_many(
    conn: &mut PgConnection,
    recipient_ids: &[i32],
    ticket_id: i32,
    kind: NotificationType,
    message: &str,
) -> CoreResult<usize> {
    if recipient_ids.is_empty() {
        return Ok(0);
    }
    let rows: Vec<NewNotification> = recipient_ids
        .iter()
        .map(|user_id| NewNotification {
            user_id: *user_id,
            ticket_id,
            kind,
            message: message.to_string(),
        })
        .collect();
    Ok(diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)?)
}

pub fn find_for_user(conn: &mut PgConnection, user_id: i32) -> CoreResult<Vec<Notification>> {
    Ok(notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .limit(INBOX_LIMIT)
        .load(conn)?)
}

pub fn count_unread(conn: &mut PgConnection, user_id: i32) -> CoreResult<i64> {
    Ok(notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(conn)?)
}

pub fn mark_all_read(conn: &mut PgConnection, user_id: i32) -> CoreResult<usize> {
    Ok(diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(conn)?)
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> CoreResult<Json<Vec<Notification>>> {
    let mut conn = state.conn.get()?;
    Ok(Json(find_for_user(&mut conn, actor.id)?))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> CoreResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let count = count_unread(&mut conn, actor.id)?;
    Ok(Json(json!({ "unread": count })))
}

async fn read_all(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> CoreResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let updated = mark_all_read(&mut conn, actor.id)?;
    Ok(Json(json!({ "updated": updated })))
}

pub fn configure_notifications_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", patch(read_all))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_ticket_id() {
        for kind in [
            NotificationType::TicketCreated,
            NotificationType::TicketAssigned,
            NotificationType::StatusChanged,
            NotificationType::CommentAdded,
            NotificationType::TicketConfirmed,
            NotificationType::TicketRejected,
            NotificationType::SlaAlert,
        ] {
            let msg = default_message(kind, 42, "Printer down", TicketStatus::InProgress);
            assert!(msg.contains("#42"), "{kind}: {msg}");
        }
    }

    #[test]
    fn status_change_message_names_the_new_status() {
        let msg = default_message(
            NotificationType::StatusChanged,
            7,
            "VPN",
            TicketStatus::Resolved,
        );
        assert!(msg.contains("resolved"));
    }
}
