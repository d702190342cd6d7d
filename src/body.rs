//! Request payloads, response bodies and the byte stream shared by both.

use core::{
    fmt,
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream::BoxStream};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};

/// A live, consumer-driven stream of body chunks.
pub struct ByteStream(BoxStream<'static, Result<Bytes>>);

impl ByteStream {
    /// Wrap any chunk stream.
    pub fn new<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<Error>,
    {
        Self(
            stream
                .map(|item| -> Result<Bytes> {
                    match item {
                        Ok(chunk) => Ok(chunk.into()),
                        Err(err) => Err(err.into()),
                    }
                })
                .boxed(),
        )
    }

    /// A stream yielding `bytes` once.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes: Bytes = bytes.into();
        Self(futures_util::stream::once(async move { Ok(bytes) }).boxed())
    }

    /// A stream that ends immediately.
    pub fn empty() -> Self {
        Self(futures_util::stream::empty().boxed())
    }

    /// Read every chunk and concatenate them.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the stream.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.0.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the stream to its end, discarding the data.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the stream.
    pub async fn drain(mut self) -> Result<()> {
        while let Some(chunk) = self.0.next().await {
            chunk?;
        }
        Ok(())
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").finish_non_exhaustive()
    }
}

/// A request payload.
#[derive(Debug)]
pub enum RequestBody {
    /// Sent as-is.
    Text(String),
    /// Sent as-is.
    Bytes(Bytes),
    /// Piped into the transport chunk by chunk.
    Stream(ByteStream),
    /// Serialized to JSON before sending; implies `Content-Type: application/json`.
    Json(Value),
}

impl RequestBody {
    /// Build a JSON payload from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParam:body` if the value cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|_| Error::InvalidParam("body"))
    }

    /// Whether this payload counts as "a body" for method inference.
    ///
    /// Empty text and JSON `null` are treated as absent.
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Text(text) if text.is_empty()) && !matches!(self, Self::Json(Value::Null))
    }

    /// Whether sending this payload needs an implicit JSON content type.
    pub(crate) const fn is_structured(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Serialize into what a transport writes on the wire.
    pub(crate) fn into_payload(self) -> Payload {
        match self {
            Self::Text(text) => Payload::Bytes(Bytes::from(text)),
            Self::Bytes(bytes) => Payload::Bytes(bytes),
            Self::Stream(stream) => Payload::Stream(stream),
            Self::Json(value) => Payload::Bytes(Bytes::from(value.to_string())),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<ByteStream> for RequestBody {
    fn from(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }
}

/// A serialized request body, as handed to a transport.
#[derive(Debug)]
pub enum Payload {
    /// Fully buffered bytes.
    Bytes(Bytes),
    /// A stream that can be read only once.
    Stream(ByteStream),
}

/// How the response body is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// Decoded text.
    String,
    /// Raw bytes.
    Buffer,
    /// The live byte stream.
    Stream,
    /// Parsed JSON, falling back to text.
    Json,
    /// Nothing; the body is drained.
    Empty,
}

impl ReturnType {
    /// The token used on the dynamic call surface.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Buffer => "buffer",
            Self::Stream => "stream",
            Self::Json => "json",
            Self::Empty => "empty",
        }
    }
}

impl FromStr for ReturnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(Self::String),
            "buffer" => Ok(Self::Buffer),
            "stream" => Ok(Self::Stream),
            "json" => Ok(Self::Json),
            "empty" => Ok(Self::Empty),
            _ => Err(Error::InvalidParam("returnType")),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A materialized response body.
#[derive(Debug)]
pub enum ResponseBody {
    /// Concatenated bytes (`buffer`).
    Buffer(Bytes),
    /// Decoded text (`string`, or `json` that failed to parse).
    Text(String),
    /// Parsed JSON (`json`).
    Json(Value),
    /// The live stream (`stream`); the caller owns it.
    Stream(ByteStream),
    /// Nothing (`empty`).
    Empty,
}

impl ResponseBody {
    /// Borrow the text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Borrow the bytes, if this is a buffer body.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer(bytes) => Some(bytes.as_ref()),
            _ => None,
        }
    }

    /// Borrow the parsed JSON, if parsing succeeded.
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Take the live stream, if this is a stream body.
    pub fn into_stream(self) -> Option<ByteStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Whether this is the `empty` body.
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Deserialize a JSON or text body into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Json(value) => T::deserialize(value).ok(),
            Self::Text(text) => serde_json::from_str(text).ok(),
            Self::Buffer(bytes) => serde_json::from_slice(bytes).ok(),
            Self::Stream(_) | Self::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[tokio::test]
    async fn byte_stream_concatenates_chunks() {
        let chunks = vec![Ok::<_, Error>("ab"), Ok("cd"), Ok("e")];
        let stream = ByteStream::new(futures_util::stream::iter(chunks));
        assert_eq!(stream.into_bytes().await.unwrap(), Bytes::from_static(b"abcde"));
    }

    #[tokio::test]
    async fn byte_stream_surfaces_errors() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::other("reset")),
        ];
        let stream = ByteStream::new(futures_util::stream::iter(chunks));
        let err = stream.into_bytes().await.unwrap_err();
        assert_eq!(err.to_string(), "reset");
    }

    #[test]
    fn falsy_bodies_are_not_present() {
        assert!(!RequestBody::from("").is_present());
        assert!(!RequestBody::Json(Value::Null).is_present());
        assert!(RequestBody::from("x").is_present());
        assert!(RequestBody::Bytes(Bytes::new()).is_present());
        assert!(RequestBody::Json(json!({"a": 5})).is_present());
    }

    #[test]
    fn json_payload_is_serialized() {
        let body = RequestBody::json(&json!({"a": 5})).unwrap();
        assert!(body.is_structured());
        match body.into_payload() {
            Payload::Bytes(bytes) => assert_eq!(bytes, Bytes::from_static(br#"{"a":5}"#)),
            Payload::Stream(_) => panic!("json must be buffered"),
        }
    }

    #[test]
    fn return_type_tokens() {
        assert_eq!("json".parse::<ReturnType>().unwrap(), ReturnType::Json);
        assert_eq!(ReturnType::Empty.as_str(), "empty");
        let err = "bogus".parse::<ReturnType>().unwrap_err();
        assert_eq!(err.param(), Some("returnType"));
    }

    #[test]
    fn deserializes_typed_json() {
        #[derive(Deserialize)]
        struct Answer {
            a: u32,
        }
        let body = ResponseBody::Json(json!({"a": 5}));
        assert_eq!(body.deserialize::<Answer>().map(|answer| answer.a), Some(5));
        assert!(ResponseBody::Empty.deserialize::<Answer>().is_none());
    }
}
