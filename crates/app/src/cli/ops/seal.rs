use std::path::PathBuf;

use clap::Args;
use common::crypto::{self, DerivedKey, EnvelopeError, KdfParams, KeyDerivationError};
use serde_json::Value;

use crate::cli::input::{read_json, write_json, InputError};

/// Encrypt a snapshot file into an envelope without touching the network
#[derive(Args, Debug, Clone)]
pub struct Seal {
    /// Principal id the vault key is derived from
    #[arg(long)]
    pub subject: String,

    /// Plaintext snapshot (JSON)
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the envelope (printed to stdout if not set)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Seal {
    type Error = SealError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let snapshot: Value = read_json(&self.input)?;
        let key = DerivedKey::derive_blocking(self.subject.clone(), KdfParams::default()).await?;
        let envelope = crypto::encrypt(&snapshot, &key)?;

        match &self.output {
            Some(path) => {
                write_json(path, &envelope)?;
                Ok(format!(
                    "Sealed {} -> {} (key {})",
                    self.input.display(),
                    path.display(),
                    key.fingerprint()
                ))
            }
            None => Ok(serde_json::to_string_pretty(&envelope).map_err(EnvelopeError::Serialize)?),
        }
    }
}
