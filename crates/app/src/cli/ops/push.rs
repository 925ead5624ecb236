use std::path::PathBuf;

use chrono::{Duration, Utc};
use clap::Args;
use common::identity::{Session, SessionError, StaticIdentityProvider, SystemClock};
use common::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
use common::remote::{DriveRemoteStore, MemoryRemoteStore, RemoteStore, RemoteStoreError};
use serde_json::Value;

use crate::cli::input::{inline_or_file, read_json, InputError};
use crate::cli::op::OpContext;

/// Sign in with out-of-band credentials and sync a snapshot to the drive
#[derive(Args, Debug, Clone)]
pub struct Push {
    /// Identity assertion (JWT), or @path to read it from a file
    #[arg(long)]
    pub assertion: String,

    /// Storage access token from the provider's token flow, or @path
    #[arg(long, env = "VAULTSYNC_ACCESS_TOKEN")]
    pub access_token: String,

    /// Seconds until the access token expires. Zero or less means it
    /// already has.
    #[arg(long, default_value_t = 3600, allow_negative_numbers = true)]
    pub expires_in: i64,

    /// Plaintext snapshot (JSON)
    #[arg(long)]
    pub input: PathBuf,

    /// Reconcile against an in-memory store instead of the drive
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("--expires-in {0} is out of range")]
    ExpiryOutOfRange(i64),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot reach storage: {0}")]
    Remote(#[from] RemoteStoreError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

async fn sync_with<S: RemoteStore>(
    store: S,
    ctx: &OpContext,
    session: &Session,
    snapshot: &Value,
) -> Result<ReconcileOutcome, ReconcileError> {
    Reconciler::new(store)
        .with_location(ctx.config.location())
        .with_duplicate_policy(ctx.config.duplicate_policy)
        .sync(session, snapshot)
        .await
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Push {
    type Error = PushError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let assertion = inline_or_file(&self.assertion, "assertion")?;
        let token = inline_or_file(&self.access_token, "access token")?;
        let snapshot: Value = read_json(&self.input)?;

        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or(PushError::ExpiryOutOfRange(self.expires_in))?;
        let provider = StaticIdentityProvider::new(assertion, Some(token), expires_at);
        let mut session = Session::new(ctx.session_config());
        session.sign_in(&provider, &SystemClock).await?;
        session.authorize_storage(&provider).await?;

        let outcome = if self.dry_run {
            tracing::info!("dry run, reconciling against an in-memory store");
            sync_with(MemoryRemoteStore::new(), ctx, &session, &snapshot).await?
        } else {
            let store = DriveRemoteStore::new(
                ctx.config.drive_api_url.clone(),
                ctx.config.drive_upload_url.clone(),
            )?;
            sync_with(store, ctx, &session, &snapshot).await?
        };

        Ok(outcome.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cli::op::{test_context, Op};
    use common::testkit::unsigned_assertion;
    use serde_json::json;
    use tempfile::TempDir;

    fn push(input: PathBuf, expires_in: i64) -> Push {
        Push {
            assertion: unsigned_assertion(&json!({"sub": "u123"})),
            access_token: "ya29.token".into(),
            expires_in,
            input,
            dry_run: true,
        }
    }

    #[tokio::test]
    async fn test_dry_run_creates() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("snapshot.json");
        std::fs::write(&input, r#"{"note":"hello"}"#).unwrap();

        let output = push(input, 3600).execute(&test_context()).await.unwrap();
        assert!(output.starts_with("created remote snapshot"));
    }

    #[tokio::test]
    async fn test_expired_token_refused() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("snapshot.json");
        std::fs::write(&input, "{}").unwrap();

        let result = push(input, 0).execute(&test_context()).await;
        assert!(matches!(
            result,
            Err(PushError::Reconcile(ReconcileError::GrantExpired(_)))
        ));
    }

    #[tokio::test]
    async fn test_huge_expiry_is_an_error() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("snapshot.json");
        std::fs::write(&input, "{}").unwrap();

        for expires_in in [i64::MAX, i64::MIN] {
            let result = push(input.clone(), expires_in)
                .execute(&test_context())
                .await;
            assert!(matches!(result, Err(PushError::ExpiryOutOfRange(n)) if n == expires_in));
        }
    }

    #[tokio::test]
    async fn test_missing_snapshot_file() {
        let temp = TempDir::new().unwrap();
        let result = push(temp.path().join("nope.json"), 3600)
            .execute(&test_context())
            .await;
        assert!(matches!(result, Err(PushError::Input(InputError::Read { .. }))));
    }
}
