//! File uploads to the project's storage bucket

use crate::error::{required, DataError};
use crate::rest::{check_status, RestBackend};
use crate::wire;
use chrono::{DateTime, Utc};
use reqwest::header;

/// Object key for an upload: `<kind>-<unix_millis>-<file_name>`
#[must_use]
pub fn object_name(kind: &str, file_name: &str, at: DateTime<Utc>) -> String {
    format!("{kind}-{}-{file_name}", at.timestamp_millis())
}

impl RestBackend {
    /// Upload `bytes` under a timestamped key and return the key
    pub async fn upload_file(
        &self,
        kind: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DataError> {
        let kind = required("kind", kind)?;
        let file_name = required("file name", file_name)?;
        let key = object_name(&kind, &file_name, Utc::now());

        let url = self.endpoint(&[
            "storage",
            "v1",
            "object",
            self.config().storage_bucket.as_str(),
            key.as_str(),
        ])?;
        let size = bytes.len();
        let response = self
            .authorized(self.http().post(url))?
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        check_status(response).await?;

        tracing::info!(%key, size, "file uploaded");
        Ok(key)
    }
}
