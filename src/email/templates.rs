//! HTML bodies for the ticket mail notices. All dynamic values pass
//! through `escape_html` before interpolation.

use crate::core::shared::branding::branding;
use crate::core::shared::{TicketPriority, TicketStatus};
use crate::tickets::sla::SlaWindow;
use crate::tickets::Ticket;

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Shared frame: header bar with the product name, body, footer note.
pub fn wrap_email(title: &str, body: &str) -> String {
    let b = branding();
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin:0;padding:0;background:#f4f5f7;font-family:Arial,Helvetica,sans-serif;">
  <div style="max-width:600px;margin:24px auto;background:#ffffff;border-radius:8px;overflow:hidden;">
    <div style="background:#1f2937;color:#ffffff;padding:16px 24px;">
      <h2 style="margin:0;font-size:18px;">{app_name}</h2>
    </div>
    <div style="padding:24px;color:#111827;">
      <h3 style="margin-top:0;">{title}</h3>
      {body}
      <p style="margin-top:24px;">
        <a href="{app_url}" style="color:#2563eb;">Abrir el panel</a>
      </p>
    </div>
    <div style="background:#f9fafb;color:#6b7280;padding:12px 24px;font-size:12px;">
      {footer} &middot; <a href="mailto:{support}" style="color:#6b7280;">{support}</a>
    </div>
  </div>
</body>
</html>"#,
        app_name = escape_html(&b.app_name),
        title = escape_html(title),
        body = body,
        app_url = escape_html(&b.app_url),
        footer = escape_html(&b.footer_note),
        support = escape_html(&b.support_email),
    )
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        "<tr><td style=\"padding:4px 12px 4px 0;color:#6b7280;\">{}</td><td style=\"padding:4px 0;\">{}</td></tr>",
        escape_html(label),
        escape_html(value)
    )
}

fn ticket_details(ticket: &Ticket) -> String {
    let rows = [
        detail_row("Título", &ticket.title),
        detail_row("Estado", ticket.status.as_str()),
        detail_row("Prioridad", ticket.prioridad.as_str()),
        detail_row("Categoría", ticket.categoria.as_str()),
    ]
    .join("");
    format!("<table style=\"border-collapse:collapse;\">{rows}</table>")
}

pub fn creado(ticket: &Ticket) -> String {
    let body = format!(
        "<p>Se registró el ticket <strong>#{}</strong>.</p>{}<p>{}</p>",
        ticket.id,
        ticket_details(ticket),
        escape_html(&ticket.description),
    );
    wrap_email(&format!("Nuevo ticket #{}", ticket.id), &body)
}

pub fn actualizado(
    ticket: &Ticket,
    status_nuevo: Option<TicketStatus>,
    prioridad_nueva: Option<TicketPriority>,
    mensaje: Option<&str>,
) -> String {
    let mut body = format!(
        "<p>El ticket <strong>#{}</strong> ({}) fue actualizado.</p>",
        ticket.id,
        escape_html(&ticket.title),
    );
    if let Some(status) = status_nuevo {
        body.push_str(&format!(
            "<p>Nuevo estado: <strong>{}</strong></p>",
            status.as_str()
        ));
    }
    if let Some(prioridad) = prioridad_nueva {
        body.push_str(&format!(
            "<p>Nueva prioridad: <strong>{}</strong></p>",
            prioridad.as_str()
        ));
    }
    if let Some(msg) = mensaje {
        body.push_str(&format!(
            "<blockquote style=\"border-left:3px solid #e5e7eb;margin:8px 0;padding:4px 12px;color:#374151;\">{}</blockquote>",
            escape_html(msg)
        ));
    }
    wrap_email(&format!("Actualización del ticket #{}", ticket.id), &body)
}

pub fn asignado(ticket: &Ticket, ti_name: &str, ti_email: &str) -> String {
    let body = format!(
        "<p>El ticket <strong>#{}</strong> ({}) fue asignado a <strong>{}</strong> ({}).</p>{}",
        ticket.id,
        escape_html(&ticket.title),
        escape_html(ti_name),
        escape_html(ti_email),
        ticket_details(ticket),
    );
    wrap_email(&format!("Ticket #{} asignado", ticket.id), &body)
}

pub fn aceptado(ticket: &Ticket, user_name: &str, user_email: &str) -> String {
    let body = format!(
        "<p><strong>{}</strong> ({}) aceptó el ticket <strong>#{}</strong> como solicitante.</p>",
        escape_html(user_name),
        escape_html(user_email),
        ticket.id,
    );
    wrap_email(&format!("Ticket #{} aceptado", ticket.id), &body)
}

pub fn confirmado(ticket: &Ticket) -> String {
    let body = format!(
        "<p>El usuario confirmó la resolución del ticket <strong>#{}</strong> ({}).</p>",
        ticket.id,
        escape_html(&ticket.title),
    );
    wrap_email(&format!("Ticket #{} confirmado", ticket.id), &body)
}

pub fn rechazado(ticket: &Ticket) -> String {
    let body = format!(
        "<p>El usuario rechazó la resolución del ticket <strong>#{}</strong> ({}). \
         El ticket vuelve a estar en proceso.</p>",
        ticket.id,
        escape_html(&ticket.title),
    );
    wrap_email(&format!("Ticket #{} rechazado", ticket.id), &body)
}

pub fn sla(ticket: &Ticket, window: &SlaWindow) -> String {
    let body = format!(
        "<p>Se definió el SLA del ticket <strong>#{}</strong> ({}).</p>\
         <p>Duración total: <strong>{} minutos</strong><br>\
         Vence: <strong>{}</strong></p>",
        ticket.id,
        escape_html(&ticket.title),
        window.total_minutos,
        window.deadline_at.format("%Y-%m-%d %H:%M UTC"),
    );
    wrap_email(&format!("SLA del ticket #{}", ticket.id), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::{TicketCategory, TicketType};
    use chrono::{TimeZone, Utc};

    fn ticket() -> Ticket {
        let t0 = Utc.with_ymd_and_hms(2024, 11, 4, 8, 0, 0).unwrap();
        Ticket {
            id: 3,
            title: "Monitor <broken>".to_string(),
            description: "a & b".to_string(),
            status: TicketStatus::NotStarted,
            prioridad: TicketPriority::Medium,
            categoria: TicketCategory::Hardware,
            tipo: TicketType::Incident,
            creator_id: 1,
            usuario_solicitante_id: None,
            assigned_to_id: None,
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
    fn escapes_html_metacharacters() {
        assert_eq!(
            escape_html("<b>\"a\" & 'b'</b>"),
            "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn creation_notice_escapes_user_content() {
        let html = creado(&ticket());
        assert!(html.contains("Monitor &lt;broken&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(!html.contains("Monitor <broken>"));
    }

    #[test]
    fn update_notice_quotes_the_message() {
        let html = actualizado(
            &ticket(),
            Some(TicketStatus::InProgress),
            None,
            Some("still <waiting>"),
        );
        assert!(html.contains("in_progress"));
        assert!(html.contains("still &lt;waiting&gt;"));
    }

    #[test]
    fn sla_notice_names_the_deadline() {
        let start = Utc.with_ymd_and_hms(2024, 11, 4, 8, 0, 0).unwrap();
        let w = crate::tickets::sla::compute_window(start, 1440, None, None, None);
        let html = sla(&ticket(), &w);
        assert!(html.contains("1440 minutos"));
        assert!(html.contains("2024-11-05 08:00 UTC"));
    }
}
