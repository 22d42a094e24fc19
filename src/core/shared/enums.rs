//! Typed enums backed by `TEXT` columns.
//!
//! Every enum here maps to a well-known set of string values in the
//! database. Mapping them to Rust enums gives compile-time exhaustiveness
//! in the state machine instead of stringly-typed comparisons.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($name), ": {}"), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                s.parse().map_err(|e: String| e.into())
            }
        }
    };
}

/// Ticket lifecycle states.
///
/// `not_started -> assigned -> in_progress -> resolved -> completed`,
/// plus `resolved -> in_progress` when the requester rejects a resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    NotStarted,
    Assigned,
    InProgress,
    Resolved,
    Completed,
}

text_enum!(TicketStatus {
    NotStarted => "not_started",
    Assigned => "assigned",
    InProgress => "in_progress",
    Resolved => "resolved",
    Completed => "completed",
});

impl Default for TicketStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

text_enum!(TicketPriority {
    VeryLow => "very_low",
    Low => "low",
    Medium => "medium",
    High => "high",
    VeryHigh => "very_high",
});

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Maintenance,
    Hardware,
    Software,
    Network,
    Other,
}

text_enum!(TicketCategory {
    Maintenance => "maintenance",
    Hardware => "hardware",
    Software => "software",
    Network => "network",
    Other => "other",
});

impl Default for TicketCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl TicketCategory {
    /// Forgiving parse used at ticket creation: accepts the canonical
    /// values plus the legacy Spanish spellings, any casing, and falls
    /// back to `Other` for anything unrecognized.
    pub fn parse_lenient(input: &str) -> Self {
        match input.to_ascii_lowercase().as_str() {
            "maintenance" | "mantenimiento" => Self::Maintenance,
            "hardware" => Self::Hardware,
            "software" => Self::Software,
            "network" | "redes" => Self::Network,
            _ => Self::Other,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Request,
    Incident,
    Inquiry,
}

text_enum!(TicketType {
    Request => "request",
    Incident => "incident",
    Inquiry => "inquiry",
});

impl Default for TicketType {
    fn default() -> Self {
        Self::Incident
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Ti,
    Admin,
    SuperAdmin,
}

text_enum!(UserRole {
    User => "user",
    Ti => "ti",
    Admin => "admin",
    SuperAdmin => "super_admin",
});

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}

impl UserRole {
    /// Admins and super-admins share the management privileges.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TicketCreated,
    TicketAssigned,
    StatusChanged,
    CommentAdded,
    TicketConfirmed,
    TicketRejected,
    SlaAlert,
}

text_enum!(NotificationType {
    TicketCreated => "ticket_created",
    TicketAssigned => "ticket_assigned",
    StatusChanged => "status_changed",
    CommentAdded => "comment_added",
    TicketConfirmed => "ticket_confirmed",
    TicketRejected => "ticket_rejected",
    SlaAlert => "sla_alert",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TicketStatus::NotStarted,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("pending".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn category_parse_lenient_accepts_legacy_spellings() {
        assert_eq!(
            TicketCategory::parse_lenient("MANTENIMIENTO"),
            TicketCategory::Maintenance
        );
        assert_eq!(TicketCategory::parse_lenient("redes"), TicketCategory::Network);
        assert_eq!(TicketCategory::parse_lenient("Hardware"), TicketCategory::Hardware);
    }

    #[test]
    fn category_parse_lenient_falls_back_to_other() {
        assert_eq!(TicketCategory::parse_lenient("gibberish"), TicketCategory::Other);
        assert_eq!(TicketCategory::parse_lenient(""), TicketCategory::Other);
    }

    #[test]
    fn role_admin_check() {
        assert!(UserRole::Admin.is_admin());
        assert!(UserRole::SuperAdmin.is_admin());
        assert!(!UserRole::Ti.is_admin());
        assert!(!UserRole::User.is_admin());
    }

    #[test]
    fn defaults_match_creation_rules() {
        assert_eq!(TicketStatus::default(), TicketStatus::NotStarted);
        assert_eq!(TicketPriority::default(), TicketPriority::Medium);
        assert_eq!(TicketCategory::default(), TicketCategory::Other);
        assert_eq!(TicketType::default(), TicketType::Incident);
    }
}
