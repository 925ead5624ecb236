use std::path::PathBuf;

use clap::Args;
use common::reconcile::DuplicatePolicy;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// OAuth client id registered with the identity provider
    #[arg(long)]
    pub client_id: Option<String>,

    /// What to do when several remote snapshots share the name (first_match or reject)
    #[arg(long, default_value = "first_match")]
    pub duplicate_policy: DuplicatePolicy,

    /// Directory for log files (logs go to stderr only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            client_id: self.client_id.clone(),
            duplicate_policy: self.duplicate_policy,
            log_dir: self.log_dir.clone(),
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(format!(
            "Initialized vaultsync directory at: {}\n\
             - Config: {}\n\
             - Client id: {}\n\
             - Snapshot: {}\n\
             - Duplicate policy: {}",
            state.app_dir.display(),
            state.config_path.display(),
            state.config.client_id.as_deref().unwrap_or("(not set)"),
            state.config.location(),
            state.config.duplicate_policy,
        ))
    }
}
