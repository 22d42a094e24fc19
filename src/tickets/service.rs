//! Ticket state machine & authorization core.
//!
//! Every mutating operation follows the same shape: load the ticket and its
//! party ids, authorize the actor, apply the change, append a history
//! entry, then fan out notifications. Notification and mail failures are
//! logged and swallowed; they never roll back the ticket mutation.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::{error, info, warn};

use crate::auth::AuthUser;
use crate::core::shared::error::{CoreError, CoreResult};
use crate::core::shared::schema::{ticket_history, tickets, users};
use crate::core::shared::state::AppState;
use crate::core::shared::{
    NotificationType, TicketCategory, TicketPriority, TicketStatus, TicketType, UserRole,
};
use crate::email::templates;
use crate::notifications;
use crate::tickets::recipients::{resolve_recipients, TicketParties};
use crate::tickets::sla;
use crate::tickets::{
    CreateTicketRequest, HistoryEntry, NewTicket, NewTicketHistory, SetSlaRequest, Ticket,
    TicketHistory, TicketView, UpdateTicketRequest,
};
use crate::users::{self as user_directory, UserPublic};

/// Cumulative cap on attachment filenames across a ticket's history.
pub const MAX_TICKET_ATTACHMENTS: usize = 3;

// ---------------------------------------------------------------------------
// Pure decision helpers
// ---------------------------------------------------------------------------

/// Field deltas of one update call. Old/new pairs are recorded only when
/// the value actually changes.
#[derive(Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub status_anterior: Option<TicketStatus>,
    pub status_nuevo: Option<TicketStatus>,
    pub prioridad_anterior: Option<TicketPriority>,
    pub prioridad_nueva: Option<TicketPriority>,
    pub mensaje: Option<String>,
    pub adjuntos: Vec<String>,
}

impl ChangeSet {
    pub fn compute(ticket: &Ticket, req: &UpdateTicketRequest) -> Self {
        let mut changes = Self::default();

        if let Some(status) = req.status {
            if status != ticket.status {
                changes.status_anterior = Some(ticket.status);
                changes.status_nuevo = Some(status);
            }
        }
        if let Some(prioridad) = req.prioridad {
            if prioridad != ticket.prioridad {
                changes.prioridad_anterior = Some(ticket.prioridad);
                changes.prioridad_nueva = Some(prioridad);
            }
        }
        if let Some(message) = &req.message {
            if !message.is_empty() {
                changes.mensaje = Some(message.clone());
            }
        }
        if let Some(files) = &req.archivo_nombre {
            changes.adjuntos = files.clone();
        }
        changes
    }

    /// Anything worth a history entry?
    pub fn is_empty(&self) -> bool {
        self.status_nuevo.is_none()
            && self.prioridad_nueva.is_none()
            && self.mensaje.is_none()
            && self.adjuntos.is_empty()
    }

    /// Status or priority changed, or a message was added: those trigger
    /// the notification fan-out. A bare attachment does not.
    pub fn is_notifiable(&self) -> bool {
        self.status_nuevo.is_some() || self.prioridad_nueva.is_some() || self.mensaje.is_some()
    }

    pub fn notification_kind(&self) -> NotificationType {
        if self.status_nuevo.is_some() || self.prioridad_nueva.is_some() {
            NotificationType::StatusChanged
        } else {
            NotificationType::CommentAdded
        }
    }
}

/// Tenant isolation: the actor may only act on tickets of their own tenant.
fn check_tenant(actor: AuthUser, ticket_empresa_id: i32) -> CoreResult<()> {
    if actor.empresa_id != Some(ticket_empresa_id) {
        return Err(CoreError::forbidden("ticket belongs to another tenant"));
    }
    Ok(())
}

/// Authorization for `update`: the actor must be an admin or one of the
/// ticket's parties, and status/priority edits are further restricted to
/// admins and the assigned technician.
pub fn authorize_update(
    actor: AuthUser,
    ticket_empresa_id: i32,
    parties: &TicketParties,
    wants_status_or_priority: bool,
) -> CoreResult<()> {
    check_tenant(actor, ticket_empresa_id)?;

    let is_admin = actor.role.is_admin();
    let is_creator = parties.creator_id == actor.id;
    let is_requester = parties.usuario_solicitante_id == Some(actor.id);
    let is_assignee = parties.assigned_to_id == Some(actor.id);

    if !is_admin && !is_creator && !is_requester && !is_assignee {
        return Err(CoreError::forbidden("not authorized to update this ticket"));
    }

    if wants_status_or_priority {
        let ti_driven = actor.role == UserRole::Ti && is_assignee;
        if !is_admin && !ti_driven {
            return Err(CoreError::forbidden(
                "only the assigned technician or an admin may change status or priority",
            ));
        }
    }
    Ok(())
}

/// Shared preconditions for confirm/reject: party check, resolved status,
/// and the corresponding flag still unset.
pub fn check_resolution_action(
    actor: AuthUser,
    ticket_empresa_id: i32,
    parties: &TicketParties,
    status: TicketStatus,
    flag_already_set: bool,
    action: &str,
) -> CoreResult<()> {
    check_tenant(actor, ticket_empresa_id)?;

    let is_creator = parties.creator_id == actor.id;
    let is_requester = parties.usuario_solicitante_id == Some(actor.id);
    if !is_creator && !is_requester {
        return Err(CoreError::forbidden(format!(
            "only the creator or requester may {action} this ticket"
        )));
    }
    if status != TicketStatus::Resolved {
        return Err(CoreError::conflict("ticket is not resolved yet"));
    }
    if flag_already_set {
        return Err(CoreError::validation(format!("ticket already {action}ed")));
    }
    Ok(())
}

/// Resolves the requested SLA duration to minutes. Exactly one of the two
/// inputs must be supplied; day counts are bounds-checked so the minute
/// conversion cannot overflow.
pub fn sla_total_minutes(dias: Option<i32>, total_minutos: Option<i32>) -> CoreResult<i32> {
    match (dias, total_minutos) {
        (Some(_), Some(_)) => Err(CoreError::validation(
            "supply either dias or total_minutos, not both",
        )),
        (None, None) => Err(CoreError::validation(
            "either dias or total_minutos is required",
        )),
        (Some(dias), None) => {
            if dias < 1 {
                return Err(CoreError::validation("dias must be at least 1"));
            }
            dias.checked_mul(24 * 60)
                .ok_or_else(|| CoreError::validation("dias is too large"))
        }
        (None, Some(minutos)) => {
            if minutos < 1 {
                return Err(CoreError::validation("total_minutos must be at least 1"));
            }
            Ok(minutos)
        }
    }
}

/// A claim is only valid from tech staff, within the tenant, on a ticket
/// that has no requester yet.
pub fn check_claim(
    actor: AuthUser,
    ticket_empresa_id: i32,
    usuario_solicitante_id: Option<i32>,
) -> CoreResult<()> {
    check_tenant(actor, ticket_empresa_id)?;
    if actor.role != UserRole::Ti {
        return Err(CoreError::forbidden("only tech staff may claim a ticket"));
    }
    if usuario_solicitante_id.is_some() {
        return Err(CoreError::validation("ticket already has a requester"));
    }
    Ok(())
}

/// Confirmation raises its flag and lowers a stale rejection. The status
/// stays resolved until staff move the ticket to completed.
pub fn apply_confirmation(ticket: &mut Ticket, now: DateTime<Utc>) {
    ticket.confirmado_por_usuario = true;
    ticket.fecha_confirmacion = Some(now);
    // At most one of the confirm/reject flags may be raised at a time.
    ticket.rechazado_por_usuario = false;
    ticket.updated_at = now;
}

/// Rejection clears any confirmation and sends the ticket back to the
/// technician's queue.
pub fn apply_rejection(ticket: &mut Ticket, now: DateTime<Utc>) {
    ticket.rechazado_por_usuario = true;
    ticket.fecha_rechazo = Some(now);
    ticket.confirmado_por_usuario = false;
    ticket.status = TicketStatus::InProgress;
    ticket.updated_at = now;
}

pub fn check_attachment_cap(existing: usize, adding: usize) -> CoreResult<()> {
    if existing + adding > MAX_TICKET_ATTACHMENTS {
        return Err(CoreError::validation(format!(
            "a ticket may carry at most {MAX_TICKET_ATTACHMENTS} attachments across its history"
        )));
    }
    Ok(())
}

/// Read visibility per role: admins see their tenant, technicians their
/// assigned tickets, users the tickets they created or requested.
pub fn check_visibility(actor: AuthUser, ticket_empresa_id: i32, parties: &TicketParties) -> CoreResult<()> {
    check_tenant(actor, ticket_empresa_id)?;
    let visible = match actor.role {
        UserRole::Admin | UserRole::SuperAdmin => true,
        UserRole::Ti => parties.assigned_to_id == Some(actor.id),
        UserRole::User => {
            parties.creator_id == actor.id || parties.usuario_solicitante_id == Some(actor.id)
        }
    };
    if !visible {
        return Err(CoreError::forbidden("not authorized to view this ticket"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_ticket(conn: &mut PgConnection, id: i32) -> CoreResult<Ticket> {
    tickets::table
        .filter(tickets::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or_else(|| CoreError::not_found(format!("ticket {id} not found")))
}

fn load_view(conn: &mut PgConnection, ticket: Ticket, with_history: bool) -> CoreResult<TicketView> {
    let related = user_directory::load_parties(
        conn,
        &[
            Some(ticket.creator_id),
            ticket.usuario_solicitante_id,
            ticket.assigned_to_id,
        ],
    )?;
    let mut related = related.into_iter();
    let creator = related.next().flatten();
    let usuario_solicitante = related.next().flatten();
    let assigned_to = related.next().flatten();

    let histories = if with_history {
        Some(load_history_entries(conn, ticket.id)?)
    } else {
        None
    };

    Ok(TicketView {
        ticket,
        creator,
        usuario_solicitante,
        assigned_to,
        histories,
    })
}

fn load_history_entries(conn: &mut PgConnection, ticket_id: i32) -> CoreResult<Vec<HistoryEntry>> {
    let rows: Vec<(TicketHistory, crate::users::User)> = ticket_history::table
        .inner_join(users::table)
        .filter(ticket_history::ticket_id.eq(ticket_id))
        .order(ticket_history::fecha.desc())
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(h, actor)| HistoryEntry {
            id: h.id,
            fecha: h.fecha,
            status_anterior: h.status_anterior,
            status_nuevo: h.status_nuevo,
            prioridad_anterior: h.prioridad_anterior,
            prioridad_nueva: h.prioridad_nueva,
            mensaje: h.mensaje,
            adjunto_nombre: h.adjunto_nombre,
            actualizado_por: Some(UserPublic::from(actor)),
        })
        .collect())
}

fn history_attachment_count(conn: &mut PgConnection, ticket_id: i32) -> CoreResult<usize> {
    let arrays: Vec<Vec<String>> = ticket_history::table
        .filter(ticket_history::ticket_id.eq(ticket_id))
        .select(ticket_history::adjunto_nombre)
        .load(conn)?;
    Ok(arrays.iter().map(Vec::len).sum())
}

fn save_ticket(conn: &mut PgConnection, ticket: &Ticket) -> CoreResult<()> {
    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set(ticket)
        .execute(conn)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Notification fan-out (best effort, never fails the caller)
// ---------------------------------------------------------------------------

fn emails_of(conn: &mut PgConnection, ids: &[i32]) -> CoreResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(users::table
        .filter(users::id.eq_any(ids))
        .select(users::email)
        .load(conn)?)
}

/// Resolution notices go to creator and requester only; the assignee is
/// left out of the confirm/reject loop.
fn resolution_parties(ticket: &Ticket) -> TicketParties {
    TicketParties {
        assigned_to_id: None,
        ..ticket.parties()
    }
}

/// Persists in-app notification rows for the resolved recipients and asks
/// the mailer to deliver the rendered notice. Both steps are fault
/// isolated: a failure is logged and the primary mutation stands.
fn fan_out(
    state: &AppState,
    conn: &mut PgConnection,
    ticket: &Ticket,
    parties: &TicketParties,
    actor_id: i32,
    kind: NotificationType,
    subject: &str,
    html: &str,
) {
    let recipient_ids = resolve_recipients(parties, actor_id);
    if recipient_ids.is_empty() {
        return;
    }

    let message = notifications::default_message(kind, ticket.id, &ticket.title, ticket.status);
    if let Err(e) = notifications::create_many(conn, &recipient_ids, ticket.id, kind, &message) {
        warn!("could not persist notifications for ticket {}: {e}", ticket.id);
    }

    match emails_of(conn, &recipient_ids) {
        Ok(emails) if !emails.is_empty() => {
            if let Err(e) = state
                .mailer
                .send(conn, ticket.empresa_id, &emails, subject, html)
            {
                error!("mail fan-out failed for ticket {}: {e}", ticket.id);
            }
        }
        Ok(_) => {}
        Err(e) => warn!("could not resolve recipient emails for ticket {}: {e}", ticket.id),
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub async fn create(
    state: &AppState,
    req: CreateTicketRequest,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;

    let creator = user_directory::find_by_id(&mut conn, actor.id)?
        .ok_or_else(|| CoreError::not_found("creator not found"))?;
    let empresa_id = creator
        .empresa_id
        .ok_or_else(|| CoreError::validation("creator has no tenant"))?;

    let solicitante = match req.usuario_solicitante_id {
        Some(id) => Some(
            user_directory::find_by_id(&mut conn, id)?
                .ok_or_else(|| CoreError::not_found("requester not found"))?,
        ),
        None => None,
    };

    let categoria = req
        .categoria
        .as_deref()
        .map(TicketCategory::parse_lenient)
        .unwrap_or_default();

    let new_ticket = NewTicket {
        title: req.title,
        description: req.description,
        status: TicketStatus::NotStarted,
        prioridad: req.prioridad.unwrap_or_default(),
        categoria,
        tipo: req.tipo.unwrap_or(TicketType::Incident),
        creator_id: creator.id,
        usuario_solicitante_id: solicitante.as_ref().map(|u| u.id),
        empresa_id,
        archivo_nombre: req.archivo_nombre.unwrap_or_default(),
    };

    let ticket: Ticket = diesel::insert_into(tickets::table)
        .values(&new_ticket)
        .get_result(&mut conn)?;
    info!("ticket {} created by user {}", ticket.id, creator.id);

    // Fan-out 1: creator and requester.
    let subject = format!("Nuevo Ticket #{}", ticket.id);
    let html = templates::creado(&ticket);
    let mut direct: Vec<String> = Vec::new();
    direct.push(creator.email.clone());
    if let Some(s) = &solicitante {
        if s.email != creator.email {
            direct.push(s.email.clone());
        }
    }
    if let Err(e) = state
        .mailer
        .send(&mut conn, empresa_id, &direct, &subject, &html)
    {
        error!("creation mail failed for ticket {}: {e}", ticket.id);
    }

    let message = notifications::default_message(
        NotificationType::TicketCreated,
        ticket.id,
        &ticket.title,
        ticket.status,
    );
    let in_app = resolve_recipients(&ticket.parties(), actor.id);
    if let Err(e) = notifications::create_many(
        &mut conn,
        &in_app,
        ticket.id,
        NotificationType::TicketCreated,
        &message,
    ) {
        warn!("could not persist creation notifications for ticket {}: {e}", ticket.id);
    }

    // Fan-out 2: tenant admins, deduplicated against the first fan-out.
    match user_directory::admins_of_empresa(&mut conn, empresa_id) {
        Ok(admins) => {
            let admin_subject = format!("Nuevo Ticket #{} en tu empresa", ticket.id);
            let admin_emails: Vec<String> = admins
                .iter()
                .filter(|a| !direct.contains(&a.email))
                .map(|a| a.email.clone())
                .collect();
            if !admin_emails.is_empty() {
                if let Err(e) =
                    state
                        .mailer
                        .send(&mut conn, empresa_id, &admin_emails, &admin_subject, &html)
                {
                    error!("admin mail fan-out failed for ticket {}: {e}", ticket.id);
                }
            }

            let party_ids = resolve_recipients(&ticket.parties(), actor.id);
            let admin_ids: Vec<i32> = admins
                .iter()
                .map(|a| a.id)
                .filter(|id| *id != actor.id && !party_ids.contains(id))
                .collect();
            if let Err(e) = notifications::create_many(
                &mut conn,
                &admin_ids,
                ticket.id,
                NotificationType::TicketCreated,
                &message,
            ) {
                warn!("could not persist admin notifications for ticket {}: {e}", ticket.id);
            }
        }
        Err(e) => warn!("could not resolve tenant admins for ticket {}: {e}", ticket.id),
    }

    load_view(&mut conn, ticket, true)
}

pub async fn update(
    state: &AppState,
    id: i32,
    req: UpdateTicketRequest,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, id)?;
    let wants_status_or_priority = req.status.is_some() || req.prioridad.is_some();
    authorize_update(actor, ticket.empresa_id, &ticket.parties(), wants_status_or_priority)?;

    let changes = ChangeSet::compute(&ticket, &req);
    if !changes.adjuntos.is_empty() {
        let existing = history_attachment_count(&mut conn, ticket.id)?;
        check_attachment_cap(existing, changes.adjuntos.len())?;
    }

    if let Some(status) = changes.status_nuevo {
        ticket.status = status;
    }
    if let Some(prioridad) = changes.prioridad_nueva {
        ticket.prioridad = prioridad;
    }
    if let Some(mensaje) = &changes.mensaje {
        ticket.message = Some(mensaje.clone());
    }
    ticket.updated_at = Utc::now();

    save_ticket(&mut conn, &ticket)?;

    if !changes.is_empty() {
        let entry = NewTicketHistory {
            ticket_id: ticket.id,
            actualizado_por_id: actor.id,
            status_anterior: changes.status_anterior,
            status_nuevo: changes.status_nuevo,
            prioridad_anterior: changes.prioridad_anterior,
            prioridad_nueva: changes.prioridad_nueva,
            mensaje: changes.mensaje.clone(),
            adjunto_nombre: changes.adjuntos.clone(),
        };
        diesel::insert_into(ticket_history::table)
            .values(&entry)
            .execute(&mut conn)?;
    }

    if changes.is_notifiable() {
        let subject = format!("Actualización del Ticket #{}", ticket.id);
        let html = templates::actualizado(
            &ticket,
            changes.status_nuevo,
            changes.prioridad_nueva,
            changes.mensaje.as_deref(),
        );
        fan_out(
            state,
            &mut conn,
            &ticket,
            &ticket.parties(),
            actor.id,
            changes.notification_kind(),
            &subject,
            &html,
        );
    }

    load_view(&mut conn, ticket, false)
}

pub async fn assign_ti(
    state: &AppState,
    ticket_id: i32,
    ti_user_id: i32,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, ticket_id)?;
    if !actor.role.is_admin() {
        return Err(CoreError::forbidden("only admins may assign technicians"));
    }
    check_tenant(actor, ticket.empresa_id)?;

    let ti = user_directory::find_by_id(&mut conn, ti_user_id)?
        .ok_or_else(|| CoreError::not_found("technician not found"))?;
    if ti.role != UserRole::Ti {
        return Err(CoreError::validation("selected user is not tech staff"));
    }
    if ti.empresa_id != Some(ticket.empresa_id) {
        return Err(CoreError::forbidden("technician belongs to another tenant"));
    }

    ticket.assigned_to_id = Some(ti.id);
    ticket.status = TicketStatus::Assigned;
    ticket.updated_at = Utc::now();
    save_ticket(&mut conn, &ticket)?;
    info!("ticket {} assigned to technician {}", ticket.id, ti.id);

    let html = templates::asignado(&ticket, &ti.username, &ti.email);
    let message = notifications::default_message(
        NotificationType::TicketAssigned,
        ticket.id,
        &ticket.title,
        ticket.status,
    );

    // Fan-out 1: the technician.
    let subject_ti = format!("Te asignaron el Ticket #{}", ticket.id);
    if let Err(e) = state.mailer.send(
        &mut conn,
        ticket.empresa_id,
        std::slice::from_ref(&ti.email),
        &subject_ti,
        &html,
    ) {
        error!("assignment mail to technician failed for ticket {}: {e}", ticket.id);
    }
    if let Err(e) = notifications::create_many(
        &mut conn,
        &[ti.id],
        ticket.id,
        NotificationType::TicketAssigned,
        &message,
    ) {
        warn!("could not persist technician notification for ticket {}: {e}", ticket.id);
    }

    // Fan-out 2: creator and requester, minus the actor and the technician.
    let others: Vec<i32> = resolve_recipients(
        &TicketParties {
            creator_id: ticket.creator_id,
            usuario_solicitante_id: ticket.usuario_solicitante_id,
            assigned_to_id: None,
        },
        actor.id,
    )
    .into_iter()
    .filter(|id| *id != ti.id)
    .collect();
    if !others.is_empty() {
        let subject = format!("Ticket #{} asignado a {}", ticket.id, ti.username);
        match emails_of(&mut conn, &others) {
            Ok(emails) if !emails.is_empty() => {
                if let Err(e) =
                    state
                        .mailer
                        .send(&mut conn, ticket.empresa_id, &emails, &subject, &html)
                {
                    error!("assignment mail to parties failed for ticket {}: {e}", ticket.id);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("could not resolve party emails for ticket {}: {e}", ticket.id),
        }
        if let Err(e) = notifications::create_many(
            &mut conn,
            &others,
            ticket.id,
            NotificationType::TicketAssigned,
            &message,
        ) {
            warn!("could not persist party notifications for ticket {}: {e}", ticket.id);
        }
    }

    load_view(&mut conn, ticket, false)
}

pub async fn confirmar_resolucion(
    state: &AppState,
    ticket_id: i32,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, ticket_id)?;
    check_resolution_action(
        actor,
        ticket.empresa_id,
        &ticket.parties(),
        ticket.status,
        ticket.confirmado_por_usuario,
        "confirm",
    )?;

    apply_confirmation(&mut ticket, Utc::now());
    save_ticket(&mut conn, &ticket)?;
    info!("ticket {} confirmed by user {}", ticket.id, actor.id);

    let subject = format!("Ticket #{} confirmado", ticket.id);
    let html = templates::confirmado(&ticket);
    fan_out(
        state,
        &mut conn,
        &ticket,
        &resolution_parties(&ticket),
        actor.id,
        NotificationType::TicketConfirmed,
        &subject,
        &html,
    );

    load_view(&mut conn, ticket, false)
}

pub async fn rechazar_resolucion(
    state: &AppState,
    ticket_id: i32,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, ticket_id)?;
    check_resolution_action(
        actor,
        ticket.empresa_id,
        &ticket.parties(),
        ticket.status,
        ticket.rechazado_por_usuario,
        "reject",
    )?;

    apply_rejection(&mut ticket, Utc::now());
    save_ticket(&mut conn, &ticket)?;
    info!("ticket {} rejected by user {}", ticket.id, actor.id);

    let subject = format!("Ticket #{} rechazado", ticket.id);
    let html = templates::rechazado(&ticket);
    fan_out(
        state,
        &mut conn,
        &ticket,
        &resolution_parties(&ticket),
        actor.id,
        NotificationType::TicketRejected,
        &subject,
        &html,
    );

    load_view(&mut conn, ticket, false)
}

/// Clears (or sets) the rejection flag. Admin-only.
pub fn reset_rechazo(
    state: &AppState,
    ticket_id: i32,
    estado: bool,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    if !actor.role.is_admin() {
        return Err(CoreError::forbidden("only admins may reset the rejection flag"));
    }
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, ticket_id)?;
    check_tenant(actor, ticket.empresa_id)?;

    ticket.rechazado_por_usuario = estado;
    ticket.updated_at = Utc::now();
    save_ticket(&mut conn, &ticket)?;

    load_view(&mut conn, ticket, false)
}

pub fn set_sla(
    state: &AppState,
    ticket_id: i32,
    req: SetSlaRequest,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    if !actor.role.is_admin() {
        return Err(CoreError::forbidden("only admins may set the SLA"));
    }
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, ticket_id)?;
    check_tenant(actor, ticket.empresa_id)?;

    let total_minutos = sla_total_minutes(req.dias, req.total_minutos)?;

    for pct in [req.green_pct, req.yellow_pct, req.red_pct].into_iter().flatten() {
        if !(0.0..=1.0).contains(&pct) {
            return Err(CoreError::validation("tier percentages must be within 0..=1"));
        }
    }

    let window = sla::compute_window(
        Utc::now(),
        total_minutos,
        req.green_pct,
        req.yellow_pct,
        req.red_pct,
    );

    ticket.sla_total_minutos = Some(window.total_minutos);
    ticket.sla_start_at = Some(window.start_at);
    ticket.sla_green_end_at = Some(window.green_end_at);
    ticket.sla_yellow_end_at = Some(window.yellow_end_at);
    ticket.deadline_at = Some(window.deadline_at);
    ticket.updated_at = Utc::now();
    save_ticket(&mut conn, &ticket)?;
    info!(
        "SLA set on ticket {}: {} minutes, deadline {}",
        ticket.id, window.total_minutos, window.deadline_at
    );

    let subject = format!("SLA del Ticket #{}", ticket.id);
    let html = templates::sla(&ticket, &window);
    fan_out(
        state,
        &mut conn,
        &ticket,
        &ticket.parties(),
        actor.id,
        NotificationType::SlaAlert,
        &subject,
        &html,
    );

    load_view(&mut conn, ticket, false)
}

/// A technician claims a ticket with no requester; they become the
/// requester and the creator is notified.
pub async fn aceptar_ticket(
    state: &AppState,
    ticket_id: i32,
    actor: AuthUser,
) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, ticket_id)?;
    check_claim(actor, ticket.empresa_id, ticket.usuario_solicitante_id)?;

    let user = user_directory::find_by_id(&mut conn, actor.id)?
        .ok_or_else(|| CoreError::not_found("user not found"))?;

    ticket.usuario_solicitante_id = Some(user.id);
    ticket.updated_at = Utc::now();
    save_ticket(&mut conn, &ticket)?;

    if let Some(creator) = user_directory::find_by_id(&mut conn, ticket.creator_id)? {
        let subject = format!("Ticket #{} aceptado", ticket.id);
        let html = templates::aceptado(&ticket, &user.username, &user.email);
        if let Err(e) = state.mailer.send(
            &mut conn,
            ticket.empresa_id,
            std::slice::from_ref(&creator.email),
            &subject,
            &html,
        ) {
            error!("acceptance mail failed for ticket {}: {e}", ticket.id);
        }
    }

    load_view(&mut conn, ticket, false)
}

// ---------------------------------------------------------------------------
// Query layer
// ---------------------------------------------------------------------------

pub fn find_all(state: &AppState, actor: AuthUser) -> CoreResult<Vec<TicketView>> {
    let mut conn = state.conn.get()?;
    let empresa_id = actor
        .empresa_id
        .ok_or_else(|| CoreError::forbidden("actor has no tenant"))?;

    let base = tickets::table
        .filter(tickets::empresa_id.eq(empresa_id))
        .order(tickets::created_at.desc());

    let (rows, with_history): (Vec<Ticket>, bool) = match actor.role {
        UserRole::Admin | UserRole::SuperAdmin => (base.load(&mut conn)?, false),
        UserRole::Ti => (
            base.filter(tickets::assigned_to_id.eq(actor.id)).load(&mut conn)?,
            false,
        ),
        UserRole::User => (
            base.filter(
                tickets::creator_id
                    .eq(actor.id)
                    .nullable()
                    .or(tickets::usuario_solicitante_id.eq(actor.id)),
            )
            .load(&mut conn)?,
            true,
        ),
    };

    rows.into_iter()
        .map(|t| load_view(&mut conn, t, with_history))
        .collect()
}

pub fn find_one(state: &AppState, id: i32, actor: AuthUser) -> CoreResult<TicketView> {
    let mut conn = state.conn.get()?;
    let ticket = load_ticket(&mut conn, id)?;
    check_visibility(actor, ticket.empresa_id, &ticket.parties())?;
    load_view(&mut conn, ticket, false)
}

pub fn historial(state: &AppState, ticket_id: i32, actor: AuthUser) -> CoreResult<Vec<HistoryEntry>> {
    let mut conn = state.conn.get()?;
    let ticket = load_ticket(&mut conn, ticket_id)?;
    check_visibility(actor, ticket.empresa_id, &ticket.parties())?;
    load_history_entries(&mut conn, ticket_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn actor(id: i32, role: UserRole, empresa: Option<i32>) -> AuthUser {
        AuthUser {
            id,
            role,
            empresa_id: empresa,
        }
    }

    fn ticket() -> Ticket {
        let t0 = Utc.with_ymd_and_hms(2024, 11, 4, 8, 0, 0).unwrap();
        Ticket {
            id: 10,
            title: "Printer down".to_string(),
            description: "It beeps".to_string(),
            status: TicketStatus::NotStarted,
            prioridad: TicketPriority::Medium,
            categoria: TicketCategory::Other,
            tipo: TicketType::Incident,
            creator_id: 5,
            usuario_solicitante_id: Some(6),
            assigned_to_id: Some(7),
            empresa_id: 1,
            archivo_nombre: vec![],
            message: None,
            confirmado_por_usuario: false,
            fecha_confirmacion: None,
            rechazado_por_usuario: false,
            fecha_rechazo: None,
            sla_total_minutos: None,
            sla_start_at: None,
            sla_green_end_at: None,
            sla_yellow_end_at: None,
            deadline_at: None,
            created_at: t0,
            updated_at: t0,
        }
    }

    #[test]
    fn change_set_records_old_new_pairs_only_on_change() {
        let t = ticket();
        let req = UpdateTicketRequest {
            status: Some(TicketStatus::InProgress),
            prioridad: Some(TicketPriority::Medium), // unchanged
            message: None,
            archivo_nombre: None,
        };
        let c = ChangeSet::compute(&t, &req);
        assert_eq!(c.status_anterior, Some(TicketStatus::NotStarted));
        assert_eq!(c.status_nuevo, Some(TicketStatus::InProgress));
        assert_eq!(c.prioridad_nueva, None);
        assert!(c.is_notifiable());
        assert_eq!(c.notification_kind(), NotificationType::StatusChanged);
    }

    #[test]
    fn change_set_empty_when_nothing_changes() {
        let t = ticket();
        let req = UpdateTicketRequest {
            status: Some(t.status),
            prioridad: Some(t.prioridad),
            message: None,
            archivo_nombre: None,
        };
        let c = ChangeSet::compute(&t, &req);
        assert!(c.is_empty());
        assert!(!c.is_notifiable());
    }

    #[test]
    fn message_only_update_is_a_comment() {
        let t = ticket();
        let req = UpdateTicketRequest {
            message: Some("any news?".to_string()),
            ..Default::default()
        };
        let c = ChangeSet::compute(&t, &req);
        assert!(!c.is_empty());
        assert!(c.is_notifiable());
        assert_eq!(c.notification_kind(), NotificationType::CommentAdded);
    }

    #[test]
    fn attachment_only_update_writes_history_but_does_not_notify() {
        let t = ticket();
        let req = UpdateTicketRequest {
            archivo_nombre: Some(vec!["scan.pdf".to_string()]),
            ..Default::default()
        };
        let c = ChangeSet::compute(&t, &req);
        assert!(!c.is_empty());
        assert!(!c.is_notifiable());
    }

    #[test]
    fn plain_user_cannot_change_status_even_as_creator() {
        let t = ticket();
        let creator = actor(5, UserRole::User, Some(1));
        let err = authorize_update(creator, t.empresa_id, &t.parties(), true).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        // Without a status/priority change the same user may attach a note.
        assert!(authorize_update(creator, t.empresa_id, &t.parties(), false).is_ok());
    }

    #[test]
    fn assigned_technician_may_change_status() {
        let t = ticket();
        let ti = actor(7, UserRole::Ti, Some(1));
        assert!(authorize_update(ti, t.empresa_id, &t.parties(), true).is_ok());
    }

    #[test]
    fn unassigned_technician_may_not_change_status() {
        let t = ticket();
        let other_ti = actor(99, UserRole::Ti, Some(1));
        let err = authorize_update(other_ti, t.empresa_id, &t.parties(), true).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn admin_override_allows_status_change() {
        let t = ticket();
        let admin = actor(42, UserRole::Admin, Some(1));
        assert!(authorize_update(admin, t.empresa_id, &t.parties(), true).is_ok());
    }

    #[test]
    fn tenant_mismatch_is_forbidden_even_for_admin() {
        let t = ticket();
        let foreign_admin = actor(42, UserRole::Admin, Some(2));
        let err = authorize_update(foreign_admin, t.empresa_id, &t.parties(), false).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn stranger_cannot_update() {
        let t = ticket();
        let stranger = actor(1000, UserRole::User, Some(1));
        let err = authorize_update(stranger, t.empresa_id, &t.parties(), false).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn confirm_requires_resolved_status() {
        let t = ticket();
        for status in [
            TicketStatus::NotStarted,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::Completed,
        ] {
            let err = check_resolution_action(
                actor(5, UserRole::User, Some(1)),
                t.empresa_id,
                &t.parties(),
                status,
                false,
                "confirm",
            )
            .unwrap_err();
            assert!(matches!(err, CoreError::Conflict(_)), "status {status}");
        }
    }

    #[test]
    fn duplicate_confirm_is_a_validation_error() {
        let t = ticket();
        let err = check_resolution_action(
            actor(5, UserRole::User, Some(1)),
            t.empresa_id,
            &t.parties(),
            TicketStatus::Resolved,
            true,
            "confirm",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn only_creator_or_requester_may_confirm() {
        let t = ticket();
        // The assignee is not allowed.
        let err = check_resolution_action(
            actor(7, UserRole::Ti, Some(1)),
            t.empresa_id,
            &t.parties(),
            TicketStatus::Resolved,
            false,
            "confirm",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        // Creator and requester are.
        for id in [5, 6] {
            assert!(check_resolution_action(
                actor(id, UserRole::User, Some(1)),
                t.empresa_id,
                &t.parties(),
                TicketStatus::Resolved,
                false,
                "confirm",
            )
            .is_ok());
        }
    }

    #[test]
    fn sla_duration_from_days_cannot_overflow() {
        assert_eq!(sla_total_minutes(Some(2), None).unwrap(), 2880);
        assert_eq!(sla_total_minutes(None, Some(90)).unwrap(), 90);

        // 1_500_000 days exceed i32 minutes; must fail, not wrap negative.
        let err = sla_total_minutes(Some(1_500_000), None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = sla_total_minutes(Some(i32::MAX), None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn sla_duration_requires_exactly_one_input() {
        assert!(matches!(
            sla_total_minutes(Some(2), Some(90)).unwrap_err(),
            CoreError::Validation(_)
        ));
        assert!(matches!(
            sla_total_minutes(None, None).unwrap_err(),
            CoreError::Validation(_)
        ));
        assert!(matches!(
            sla_total_minutes(Some(0), None).unwrap_err(),
            CoreError::Validation(_)
        ));
        assert!(matches!(
            sla_total_minutes(None, Some(0)).unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[test]
    fn only_tech_staff_may_claim_a_ticket() {
        assert!(check_claim(actor(8, UserRole::Ti, Some(1)), 1, None).is_ok());

        for role in [UserRole::User, UserRole::Admin, UserRole::SuperAdmin] {
            let err = check_claim(actor(8, role, Some(1)), 1, None).unwrap_err();
            assert!(matches!(err, CoreError::Forbidden(_)), "{role}");
        }
    }

    #[test]
    fn claim_rejected_outside_tenant_or_with_existing_requester() {
        let err = check_claim(actor(8, UserRole::Ti, Some(2)), 1, None).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = check_claim(actor(8, UserRole::Ti, Some(1)), 1, Some(6)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejection_returns_ticket_to_in_progress_and_clears_confirmation() {
        let mut t = ticket();
        t.status = TicketStatus::Resolved;
        t.confirmado_por_usuario = true;
        t.fecha_confirmacion = Some(t.created_at);

        let now = Utc.with_ymd_and_hms(2024, 11, 6, 12, 0, 0).unwrap();
        apply_rejection(&mut t, now);

        assert_eq!(t.status, TicketStatus::InProgress);
        assert!(t.rechazado_por_usuario);
        assert!(!t.confirmado_por_usuario);
        assert_eq!(t.fecha_rechazo, Some(now));
        assert_eq!(t.updated_at, now);
    }

    #[test]
    fn confirmation_keeps_status_and_clears_stale_rejection() {
        let mut t = ticket();
        t.status = TicketStatus::Resolved;
        t.rechazado_por_usuario = true;

        let now = Utc.with_ymd_and_hms(2024, 11, 6, 12, 0, 0).unwrap();
        apply_confirmation(&mut t, now);

        assert_eq!(t.status, TicketStatus::Resolved);
        assert!(t.confirmado_por_usuario);
        assert!(!t.rechazado_por_usuario);
        assert_eq!(t.fecha_confirmacion, Some(now));
    }

    #[test]
    fn resolution_notices_skip_the_assignee() {
        let t = ticket();
        let p = resolution_parties(&t);
        // Requester confirms: only the creator is left to notify.
        assert_eq!(resolve_recipients(&p, 6), vec![5]);
        // Creator rejects: only the requester.
        assert_eq!(resolve_recipients(&p, 5), vec![6]);
    }

    #[test]
    fn attachment_cap_enforced() {
        assert!(check_attachment_cap(0, 3).is_ok());
        assert!(check_attachment_cap(2, 1).is_ok());
        let err = check_attachment_cap(3, 1).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(check_attachment_cap(0, 4).is_err());
    }

    #[test]
    fn visibility_rules_per_role() {
        let t = ticket();
        // Admin of the tenant sees everything.
        assert!(check_visibility(actor(1, UserRole::Admin, Some(1)), t.empresa_id, &t.parties()).is_ok());
        // Technician only when assigned.
        assert!(check_visibility(actor(7, UserRole::Ti, Some(1)), t.empresa_id, &t.parties()).is_ok());
        assert!(check_visibility(actor(8, UserRole::Ti, Some(1)), t.empresa_id, &t.parties()).is_err());
        // User only as creator or requester.
        assert!(check_visibility(actor(5, UserRole::User, Some(1)), t.empresa_id, &t.parties()).is_ok());
        assert!(check_visibility(actor(6, UserRole::User, Some(1)), t.empresa_id, &t.parties()).is_ok());
        assert!(check_visibility(actor(9, UserRole::User, Some(1)), t.empresa_id, &t.parties()).is_err());
        // Wrong tenant is always forbidden.
        assert!(check_visibility(actor(1, UserRole::Admin, Some(2)), t.empresa_id, &t.parties()).is_err());
    }
}
