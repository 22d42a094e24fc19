//! Outbound mail.
//!
//! Each tenant may delegate sending to one of its admin accounts: the first
//! admin with an SMTP app password configured becomes the sender for that
//! tenant's mail. When no tenant sender exists the global SMTP settings
//! apply. Callers treat every send failure as non-fatal and log it.

pub mod templates;

use anyhow::{Context, Result};
use diesel::prelude::*;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::debug;

use crate::core::config::SmtpConfig;
use crate::core::shared::schema::users;
use crate::core::shared::UserRole;

struct Sender {
    from: String,
    credentials: Option<Credentials>,
}

pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Tenant sender lookup: first admin of the tenant carrying an SMTP
    /// password, otherwise the global account.
    fn sender_for(&self, conn: &mut PgConnection, empresa_id: i32) -> Result<Sender> {
        let delegated: Option<(String, Option<String>)> = users::table
            .filter(users::empresa_id.eq(empresa_id))
            .filter(users::role.eq_any([UserRole::Admin, UserRole::SuperAdmin]))
            .filter(users::smtp_password.is_not_null())
            .select((users::email, users::smtp_password))
            .first(conn)
            .optional()
            .context("tenant sender lookup failed")?;

        if let Some((email, Some(password))) = delegated {
            return Ok(Sender {
                from: email.clone(),
                credentials: Some(Credentials::new(email, password)),
            });
        }

        let credentials = match (&self.config.user, &self.config.pass) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };
        Ok(Sender {
            from: self.config.from.clone(),
            credentials,
        })
    }

    fn transport(&self, credentials: Option<Credentials>) -> Result<SmtpTransport> {
        let builder = if credentials.is_some() {
            SmtpTransport::relay(&self.config.host).context("smtp relay setup failed")?
        } else {
            SmtpTransport::builder_dangerous(&self.config.host)
        };
        let builder = match credentials {
            Some(c) => builder.credentials(c),
            None => builder,
        };
        Ok(builder.build())
    }

    /// Sends one HTML message to each address. The first transport error
    /// aborts the batch and is returned to the caller to log.
    pub fn send(
        &self,
        conn: &mut PgConnection,
        empresa_id: i32,
        to: &[String],
        subject: &str,
        html: &str,
    ) -> Result<()> {
        if to.is_empty() {
            return Ok(());
        }
        let sender = self.sender_for(conn, empresa_id)?;
        let from: Mailbox = sender.from.parse().context("invalid sender address")?;
        let transport = self.transport(sender.credentials)?;

        for addr in to {
            let mailbox: Mailbox = match addr.parse() {
                Ok(m) => m,
                Err(e) => {
                    debug!("skipping invalid recipient {addr}: {e}");
                    continue;
                }
            };
            let message = Message::builder()
                .from(from.clone())
                .to(mailbox)
                .subject(subject)
                .header(ContentType::TEXT_HTML)
                .body(html.to_string())
                .context("could not build message")?;
            transport
                .send(&message)
                .with_context(|| format!("smtp send to {addr} failed"))?;
        }
        debug!("sent '{subject}' to {} recipient(s)", to.len());
        Ok(())
    }
}
