//! Google Drive v3 backed [`RemoteStore`]
//!
//! Uses the per-application hidden folder (`appDataFolder`) so the snapshot
//! is invisible in the user's drive UI and unreachable by other apps.
//!
//! - `list`   → `GET    {api}/drive/v3/files?q=name='..'&spaces=..`
//! - `create` → `POST   {upload}/upload/drive/v3/files?uploadType=multipart`
//! - `update` → `PATCH  {upload}/upload/drive/v3/files/{id}?uploadType=multipart`

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::provider::{RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError};
use crate::identity::AccessGrant;

pub const GOOGLE_API_URL: &str = "https://www.googleapis.com/";

const FILES_PATH: &str = "drive/v3/files";
const UPLOAD_PATH: &str = "upload/drive/v3/files";
const FIELDS: &str = "id,name";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

impl From<DriveFile> for RemoteObjectHandle {
    fn from(file: DriveFile) -> Self {
        RemoteObjectHandle {
            id: file.id,
            name: file.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriveRemoteStore {
    api_url: Url,
    upload_url: Url,
    client: Client,
}

/// `join` replaces the last path segment unless the base ends in `/`
fn as_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Quote a value for a Drive `q` expression
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

async fn check(response: Response) -> Result<Response, RemoteStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteStoreError::GrantRejected);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteStoreError::HttpStatus(status.as_u16(), body))
}

fn json_part(bytes: Vec<u8>) -> Result<multipart::Part, RemoteStoreError> {
    Ok(multipart::Part::bytes(bytes).mime_str("application/json")?)
}

impl DriveRemoteStore {
    pub fn new(api_url: Url, upload_url: Url) -> Result<Self, RemoteStoreError> {
        let client = Client::builder().build()?;
        Ok(Self {
            api_url: as_base(api_url),
            upload_url: as_base(upload_url),
            client,
        })
    }

    /// Store pointed at the public Google endpoints
    pub fn google() -> Result<Self, RemoteStoreError> {
        let url = Url::parse(GOOGLE_API_URL)?;
        Self::new(url.clone(), url)
    }
}

#[async_trait]
impl RemoteStore for DriveRemoteStore {
    async fn list(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
    ) -> Result<Vec<RemoteObjectHandle>, RemoteStoreError> {
        let url = self.api_url.join(FILES_PATH)?;
        let query = format!("name = {} and trashed = false", quote(&location.name));
        tracing::debug!(%url, %query, "listing remote snapshot candidates");

        let response = self
            .client
            .get(url)
            .bearer_auth(grant.token())
            .query(&[
                ("q", query.as_str()),
                ("spaces", location.container.as_str()),
                ("fields", "files(id,name)"),
            ])
            .send()
            .await?;

        let list: FileList = check(response).await?.json().await?;
        Ok(list.files.into_iter().map(Into::into).collect())
    }

    async fn create(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError> {
        let url = self.upload_url.join(UPLOAD_PATH)?;
        let metadata = serde_json::json!({
            "name": location.name,
            "parents": [location.container],
        });
        let form = multipart::Form::new()
            .part("metadata", json_part(metadata.to_string().into_bytes())?)
            .part("file", json_part(body)?);

        let response = self
            .client
            .post(url)
            .bearer_auth(grant.token())
            .query(&[("uploadType", "multipart"), ("fields", FIELDS)])
            .multipart(form)
            .send()
            .await?;

        let file: DriveFile = check(response).await?.json().await?;
        Ok(file.into())
    }

    async fn update(
        &self,
        grant: &AccessGrant,
        handle: &RemoteObjectHandle,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError> {
        let url = self
            .upload_url
            .join(&format!("{}/{}", UPLOAD_PATH, handle.id))?;
        // parents are not writable on update
        let metadata = serde_json::json!({ "name": handle.name });
        let form = multipart::Form::new()
            .part("metadata", json_part(metadata.to_string().into_bytes())?)
            .part("file", json_part(body)?);

        let response = self
            .client
            .patch(url)
            .bearer_auth(grant.token())
            .query(&[("uploadType", "multipart"), ("fields", FIELDS)])
            .multipart(form)
            .send()
            .await?;

        let response = match check(response).await {
            Err(RemoteStoreError::HttpStatus(404, _)) => {
                return Err(RemoteStoreError::NotFound(handle.id.clone()))
            }
            other => other?,
        };
        let file: DriveFile = response.json().await?;
        Ok(file.into())
    }
}
