use clap::Args;
use common::identity::{Session, SessionError};

use crate::cli::input::{inline_or_file, InputError};

#[derive(Args, Debug, Clone)]
pub struct Whoami {
    /// Identity assertion (JWT), or @path to read it from a file
    #[arg(long)]
    pub assertion: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WhoamiError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Whoami {
    type Error = WhoamiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let assertion = inline_or_file(&self.assertion, "assertion")?;

        let mut session = Session::new(ctx.session_config());
        let principal = session.establish_identity(&assertion).await?.clone();
        let fingerprint = session
            .key()
            .map(|key| key.fingerprint())
            .unwrap_or_default();

        Ok(format!(
            "{}\n - id: {}\n - key fingerprint: {}",
            principal, principal.id, fingerprint
        ))
    }
}
