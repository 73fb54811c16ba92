//! Network transport collaborator.
//!
//! [`Transport`] is the only way workers reach the network. The HTTP
//! implementation uses `reqwest`; tests plug in scripted transports.

use std::pin::Pin;
use std::time::Duration;

use content_transfer_protocol::TransferError;
use futures_util::{Stream, StreamExt};
use reqwest::header::IF_NONE_MATCH;
use tracing::debug;

use crate::fs::BoxFuture;

/// Chunked body flowing in either direction.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Longest server error body kept for the listener.
const MAX_ERROR_BODY: usize = 4096;

/// Errors produced by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for TransferError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http(e) if e.is_timeout() => TransferError::Timeout,
            TransportError::Http(e) if e.is_builder() => TransferError::InvalidArg(e.to_string()),
            TransportError::Http(e) => TransferError::ConnectionFailed(e.to_string()),
            TransportError::Server { status: 412, body } => TransferError::FileAlreadyExists(body),
            TransportError::Server { status, body } => TransferError::ServerError {
                code: status.to_string(),
                message: body,
            },
            TransportError::Connection(msg) => TransferError::ConnectionFailed(msg),
            TransportError::Timeout => TransferError::Timeout,
            TransportError::Io(e) => TransferError::from_io(&e, "transport"),
        }
    }
}

/// Response to a fetch: the advertised size and the body stream.
pub struct FetchResponse {
    /// `None` when the remote end did not report a length.
    pub total_size: Option<u64>,
    pub body: ByteStream,
}

/// An upload handed to the transport.
pub struct UploadRequest {
    pub uri: String,
    pub total_size: u64,
    /// When `false` the transport must not overwrite an existing remote file.
    pub replace: bool,
    pub body: ByteStream,
}

/// Moves bytes between this process and a remote location.
pub trait Transport: Send + Sync {
    /// Starts fetching `uri`. Resolves once response headers are in.
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<FetchResponse, TransportError>>;

    /// Sends `request.body` to `request.uri`. Resolves once the remote end
    /// has acknowledged the upload.
    fn upload(&self, request: UploadRequest) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// HTTP(S) transport: `GET` for downloads, `PUT` for uploads.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the given TCP connect timeout.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(http))
    }

    /// Wraps an existing client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<FetchResponse, TransportError>> {
        Box::pin(async move {
            let resp = self.http.get(uri).send().await?;
            let status = resp.status();
            debug!(%uri, status = status.as_u16(), "fetch response");

            if !status.is_success() {
                return Err(server_error(resp).await);
            }

            let total_size = resp.content_length();
            let body = resp
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(TransportError::from));
            Ok(FetchResponse {
                total_size,
                body: Box::pin(body),
            })
        })
    }

    fn upload(&self, request: UploadRequest) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let UploadRequest {
                uri,
                total_size,
                replace,
                body,
            } = request;

            let mut req = self.http.put(&uri).body(reqwest::Body::wrap_stream(body));
            if !replace {
                req = req.header(IF_NONE_MATCH, "*");
            }

            let resp = req.send().await?;
            let status = resp.status();
            debug!(%uri, total_size, status = status.as_u16(), "upload response");

            if !status.is_success() {
                return Err(server_error(resp).await);
            }
            Ok(())
        })
    }
}

async fn server_error(resp: reqwest::Response) -> TransportError {
    let status = resp.status();
    let mut body = resp.text().await.unwrap_or_default();
    if body.is_empty() {
        body = status.canonical_reason().unwrap_or_default().to_string();
    }
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    TransportError::Server {
        status: status.as_u16(),
        body,
    }
}
