//! Process-wide read-only branding used by the mail templates.
//!
//! Loaded once at startup from the environment; never mutated afterwards.

use once_cell::sync::OnceCell;

#[derive(Debug, Clone)]
pub struct BrandingConfig {
    pub app_name: String,
    pub app_url: String,
    pub support_email: String,
    pub footer_note: String,
}

static BRANDING: OnceCell<BrandingConfig> = OnceCell::new();

fn load_from_env() -> BrandingConfig {
    BrandingConfig {
        app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Helpdesk".to_string()),
        app_url: std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
        support_email: std::env::var("SUPPORT_EMAIL")
            .unwrap_or_else(|_| "support@localhost".to_string()),
        footer_note: "This is an automated message. If you were not expecting it, \
                      you can safely ignore it."
            .to_string(),
    }
}

pub fn branding() -> &'static BrandingConfig {
    BRANDING.get_or_init(load_from_env)
}

/// Force the load at startup so later callers never hit env lookups.
pub fn init_branding() {
    let _ = branding();
}
