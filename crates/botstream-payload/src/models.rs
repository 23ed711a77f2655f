use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::error::Result;
use crate::stream::ContentStream;

/// Request verbs understood by the stock request handlers.
pub mod verb {
    pub const GET: &str = "GET";
    pub const POST: &str = "POST";
    pub const PUT: &str = "PUT";
    pub const DELETE: &str = "DELETE";
}

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Reference to a content stream carried alongside a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    pub id: Uuid,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// JSON body of a `Request` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub verb: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

/// JSON body of a `Response` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

/// Source of an outgoing content stream.
pub enum StreamContent {
    /// Fully buffered content; the length is known up front.
    Bytes(Bytes),
    /// Content pulled from a reader until EOF.
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: Option<usize>,
    },
}

impl fmt::Debug for StreamContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamContent::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            StreamContent::Reader { length, .. } => f
                .debug_struct("Reader")
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

/// A content stream attached to an outgoing request or response.
#[derive(Debug)]
pub struct OutgoingStream {
    pub id: Uuid,
    pub content_type: Option<String>,
    pub content: StreamContent,
}

impl OutgoingStream {
    pub fn from_bytes(content_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type,
            content: StreamContent::Bytes(data.into()),
        }
    }

    pub fn from_reader(
        content_type: Option<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        length: Option<usize>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type,
            content: StreamContent::Reader {
                reader: Box::new(reader),
                length,
            },
        }
    }

    /// Serialize `value` as a JSON body stream.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(Some(JSON_CONTENT_TYPE.to_string()), body))
    }

    pub fn len(&self) -> Option<usize> {
        match &self.content {
            StreamContent::Bytes(bytes) => Some(bytes.len()),
            StreamContent::Reader { length, .. } => *length,
        }
    }

    pub fn description(&self) -> StreamDescription {
        StreamDescription {
            id: self.id,
            content_type: self.content_type.clone(),
            length: self.len(),
        }
    }
}

/// An outgoing request.
#[derive(Debug)]
pub struct StreamingRequest {
    pub verb: String,
    pub path: String,
    pub streams: Vec<OutgoingStream>,
}

impl StreamingRequest {
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(verb::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(verb::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(verb::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(verb::DELETE, path)
    }

    pub fn add_stream(&mut self, stream: OutgoingStream) {
        self.streams.push(stream);
    }

    /// Attach `data` as the body stream.
    pub fn set_body(&mut self, content_type: Option<String>, data: impl Into<Bytes>) {
        self.streams.push(OutgoingStream::from_bytes(content_type, data));
    }

    pub fn set_body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.streams.push(OutgoingStream::json(value)?);
        Ok(())
    }

    pub fn payload(&self) -> RequestPayload {
        RequestPayload {
            verb: self.verb.clone(),
            path: self.path.clone(),
            streams: self.streams.iter().map(OutgoingStream::description).collect(),
        }
    }
}

/// An outgoing response.
#[derive(Debug)]
pub struct StreamingResponse {
    pub status_code: u16,
    pub streams: Vec<OutgoingStream>,
}

impl StreamingResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            streams: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_error() -> Self {
        Self::new(500)
    }

    pub fn add_stream(&mut self, stream: OutgoingStream) {
        self.streams.push(stream);
    }

    pub fn set_body(&mut self, content_type: Option<String>, data: impl Into<Bytes>) {
        self.streams.push(OutgoingStream::from_bytes(content_type, data));
    }

    pub fn set_body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.streams.push(OutgoingStream::json(value)?);
        Ok(())
    }

    pub fn payload(&self) -> ResponsePayload {
        ResponsePayload {
            status_code: self.status_code,
            streams: self.streams.iter().map(OutgoingStream::description).collect(),
        }
    }
}

/// A fully assembled incoming request.
#[derive(Debug)]
pub struct ReceiveRequest {
    pub verb: String,
    pub path: String,
    pub streams: Vec<ContentStream>,
}

impl ReceiveRequest {
    /// Read the first stream to its end; empty when the request has no body.
    pub async fn read_body(&self) -> Bytes {
        read_first(&self.streams).await
    }

    pub async fn read_body_as_string(&self) -> Result<String> {
        first_as_string(&self.streams).await
    }

    pub async fn read_body_json<T: DeserializeOwned>(&self) -> Result<T> {
        first_as_json(&self.streams).await
    }
}

/// A fully assembled incoming response.
#[derive(Debug)]
pub struct ReceiveResponse {
    pub status_code: u16,
    pub streams: Vec<ContentStream>,
}

impl ReceiveResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub async fn read_body(&self) -> Bytes {
        read_first(&self.streams).await
    }

    pub async fn read_body_as_string(&self) -> Result<String> {
        first_as_string(&self.streams).await
    }

    pub async fn read_body_json<T: DeserializeOwned>(&self) -> Result<T> {
        first_as_json(&self.streams).await
    }
}

async fn read_first(streams: &[ContentStream]) -> Bytes {
    match streams.first() {
        Some(stream) => stream.read_to_end().await,
        None => Bytes::new(),
    }
}

async fn first_as_string(streams: &[ContentStream]) -> Result<String> {
    let body = read_first(streams).await;
    String::from_utf8(body.to_vec())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
}

async fn first_as_json<T: DeserializeOwned>(streams: &[ContentStream]) -> Result<T> {
    let body = read_first(streams).await;
    Ok(serde_json::from_slice(&body)?)
}
