//! Multipart upload pipeline
//!
//! The payload travels as one `multipart/form-data` part, streamed in
//! `chunk_size` slices so progress can be reported as the transport pulls
//! bytes. Uploads are never retried: a consumed body stream cannot be
//! replayed, and resuming needs server support.

use std::time::Instant;

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use pawlink_domain::constants::UPLOAD_FORM_FIELD;
use pawlink_domain::{UploadProgress, UploadResult};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, StatusCode};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, instrument, warn};

use super::client::{read_body, read_reason, ApiClient};
use super::endpoint::Endpoint;
use super::errors::ApiError;
use crate::logging::log_call_outcome;

const DEFAULT_FILE_NAME: &str = "upload";

/// Payload plus the metadata of its multipart part
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    payload: Bytes,
    content_type: String,
    file_name: String,
}

impl MultipartUpload {
    pub fn new(payload: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            content_type: content_type.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }

    /// File name advertised in the part's `Content-Disposition`
    #[must_use]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    fn validate(&self) -> Result<(), ApiError> {
        let mut invalid = Vec::new();
        if self.payload.is_empty() {
            invalid.push("payload".to_string());
        }
        if self.content_type.trim().is_empty() || has_line_break(&self.content_type) {
            invalid.push("content_type".to_string());
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationFailed(invalid))
        }
    }
}

/// Wire framing around the payload
struct Framing {
    boundary: String,
    preamble: Bytes,
    epilogue: Bytes,
}

impl Framing {
    fn new(upload: &MultipartUpload) -> Self {
        let boundary = format!("pawlink-{}", uuid::Uuid::new_v4().simple());
        let preamble = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{UPLOAD_FORM_FIELD}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            quote_file_name(&upload.file_name),
            upload.content_type.trim(),
        );
        let epilogue = format!("\r\n--{boundary}--\r\n");

        Self { boundary, preamble: Bytes::from(preamble), epilogue: Bytes::from(epilogue) }
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn content_length(&self, payload_len: usize) -> u64 {
        (self.preamble.len() + payload_len + self.epilogue.len()) as u64
    }
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

fn quote_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

/// Body chunks: preamble, payload slices, epilogue
///
/// Progress is sent as each payload slice is handed to the transport.
fn body_chunks(
    framing: &Framing,
    payload: &Bytes,
    chunk_size: usize,
    progress: Option<UnboundedSender<UploadProgress>>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = payload.len() as u64;
    let chunk_size = chunk_size.max(1);

    let mut parts = Vec::with_capacity(payload.len() / chunk_size + 3);
    parts.push((framing.preamble.clone(), 0_u64));
    let mut start = 0;
    while start < payload.len() {
        let end = (start + chunk_size).min(payload.len());
        parts.push((payload.slice(start..end), (end - start) as u64));
        start = end;
    }
    parts.push((framing.epilogue.clone(), 0));

    let mut sent = 0_u64;
    stream::iter(parts).map(move |(chunk, payload_bytes)| {
        if payload_bytes > 0 {
            sent += payload_bytes;
            if let Some(tx) = &progress {
                // A dropped receiver only means nobody is watching
                let _ = tx.send(UploadProgress::from_bytes(sent, total));
            }
        }
        Ok(chunk)
    })
}

impl ApiClient {
    /// Upload `upload` to `endpoint` as a multipart body
    ///
    /// Progress fractions in `[0.0, 1.0]`, non-decreasing and ending at
    /// `1.0` once the whole payload was handed over, are sent to `progress`
    /// when given.
    ///
    /// # Errors
    /// - `ValidationFailed` for an empty payload or content type, before any
    ///   other step
    /// - otherwise the same kinds as [`ApiClient::execute`], except that 401
    ///   and 429 are terminal here (`RateLimited { attempts: 1 }`)
    #[instrument(
        skip(self, upload, endpoint, progress),
        fields(endpoint = endpoint.target(), bytes = upload.len())
    )]
    pub async fn upload(
        &self,
        upload: MultipartUpload,
        endpoint: &Endpoint,
        progress: Option<UnboundedSender<UploadProgress>>,
    ) -> Result<UploadResult, ApiError> {
        let started = Instant::now();
        let mut dispatched = false;
        let result = self.run_upload(upload, endpoint, progress, &mut dispatched).await;

        log_call_outcome(endpoint.target(), u32::from(dispatched), started.elapsed(), &result);
        result
    }

    async fn run_upload(
        &self,
        upload: MultipartUpload,
        endpoint: &Endpoint,
        progress: Option<UnboundedSender<UploadProgress>>,
        dispatched: &mut bool,
    ) -> Result<UploadResult, ApiError> {
        upload.validate()?;
        let url = endpoint.resolve(&self.base_url)?;
        self.preflight()?;
        let adapted = self.authorize(endpoint).await?;

        let framing = Framing::new(&upload);
        let total = upload.payload.len() as u64;
        if let Some(tx) = &progress {
            let _ = tx.send(UploadProgress::from_bytes(0, total));
        }

        let mut request = self.http.request(adapted.method().clone(), url);
        for (name, value) in adapted.headers() {
            if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str())
                || name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())
            {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }
        let request = request
            .header(CONTENT_TYPE, framing.content_type())
            .header(CONTENT_LENGTH, framing.content_length(upload.payload.len()))
            .body(Body::wrap_stream(body_chunks(
                &framing,
                &upload.payload,
                self.upload.chunk_size,
                progress,
            )));

        debug!(boundary = %framing.boundary, "dispatching multipart upload");
        *dispatched = true;
        let response = self.http.send(request).await?;
        let status = response.status();

        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| ApiError::Network(format!("failed to read upload response: {e}")))?;
            return Ok(UploadResult { status: status.as_u16(), bytes_sent: total, body: body.to_vec() });
        }

        match status {
            StatusCode::UNAUTHORIZED => {
                let reason = read_reason(response).await;
                if !self.auth.refresh().await {
                    warn!("upload rejected and token refresh failed");
                }
                Err(ApiError::Unauthorized(reason))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited { attempts: 1 }),
            _ => {
                let body = read_body(response).await;
                Err(ApiError::from_status(status.as_u16(), body))
            }
        }
    }
}
