use std::path::PathBuf;

use clap::Args;
use common::crypto::{self, DerivedKey, Envelope, EnvelopeError, KdfParams, KeyDerivationError};
use serde_json::Value;

use crate::cli::input::{read_json, InputError};

/// Decrypt an envelope file and print the snapshot
#[derive(Args, Debug, Clone)]
pub struct Open {
    /// Principal id the vault key is derived from
    #[arg(long)]
    pub subject: String,

    /// Envelope (`{"cipher", "iv"}` JSON)
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Open {
    type Error = OpenError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let envelope: Envelope = read_json(&self.input)?;
        let key = DerivedKey::derive_blocking(self.subject.clone(), KdfParams::default()).await?;
        let snapshot: Value = crypto::decrypt(&envelope, &key)?;

        Ok(serde_json::to_string_pretty(&snapshot).map_err(EnvelopeError::Serialize)?)
    }
}
