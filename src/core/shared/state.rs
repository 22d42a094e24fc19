use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::email::Mailer;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub mailer: Arc<Mailer>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            mailer: Arc::clone(&self.mailer),
        }
    }
}
