//! Turn a decoded byte stream into the requested body representation.

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;

use crate::{ByteStream, Error, ResponseBody, Result, ReturnType, options::TransformOptions, options::Validator};

/// Produce the body for `return_type` from `body`.
///
/// Only [`ReturnType::Json`] consults `validator`: when one is configured a
/// body that fails to parse, or that the validator rejects, fails the call.
/// Without a validator unparseable JSON falls back to the raw text.
pub(crate) async fn materialize(
    body: ByteStream,
    return_type: ReturnType,
    transform: &TransformOptions,
    validator: Option<&Validator>,
) -> Result<ResponseBody> {
    match return_type {
        ReturnType::Empty => {
            // Drained so the connection can go back to the pool.
            if let Err(err) = body.drain().await {
                tracing::debug!(%err, "discarding response body failed");
            }
            Ok(ResponseBody::Empty)
        }
        ReturnType::Stream => Ok(ResponseBody::Stream(rechunk(body, transform.chunk_size))),
        ReturnType::Buffer => Ok(ResponseBody::Buffer(body.into_bytes().await?)),
        ReturnType::String => {
            let bytes = body.into_bytes().await?;
            Ok(ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
        ReturnType::Json => {
            let bytes = body.into_bytes().await?;
            json(&bytes, validator)
        }
    }
}

fn json(bytes: &[u8], validator: Option<&Validator>) -> Result<ResponseBody> {
    let parsed = serde_json::from_slice::<Value>(bytes);
    match (parsed, validator) {
        (Ok(value), Some(validator)) => {
            if validator(&value) {
                Ok(ResponseBody::Json(value))
            } else {
                tracing::debug!("validator rejected response body");
                Err(Error::ValidationFailed)
            }
        }
        (Ok(value), None) => Ok(ResponseBody::Json(value)),
        (Err(err), Some(_)) => {
            tracing::debug!(%err, "response body is not json");
            Err(Error::ValidationFailed)
        }
        (Err(_), None) => Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())),
    }
}

/// Split chunks larger than `chunk_size`.
fn rechunk(body: ByteStream, chunk_size: Option<usize>) -> ByteStream {
    let Some(size) = chunk_size.filter(|size| *size > 0) else {
        return body;
    };
    ByteStream::new(
        body.map_ok(move |mut chunk: Bytes| {
            let mut pieces = Vec::with_capacity(chunk.len().div_ceil(size));
            while chunk.len() > size {
                pieces.push(Ok::<_, Error>(chunk.split_to(size)));
            }
            pieces.push(Ok(chunk));
            futures_util::stream::iter(pieces)
        })
        .try_flatten()
        .boxed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn body(text: &'static str) -> ByteStream {
        ByteStream::from_bytes(text)
    }

    async fn run(text: &'static str, return_type: ReturnType, validator: Option<&Validator>) -> Result<ResponseBody> {
        materialize(body(text), return_type, &TransformOptions::default(), validator).await
    }

    #[tokio::test]
    async fn string_and_buffer() {
        let text = run("hello", ReturnType::String, None).await.unwrap();
        assert_eq!(text.as_text(), Some("hello"));
        let buffer = run("hello", ReturnType::Buffer, None).await.unwrap();
        assert_eq!(buffer.as_bytes(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn json_falls_back_to_text_without_validator() {
        let parsed = run(r#"{"a":5}"#, ReturnType::Json, None).await.unwrap();
        assert_eq!(parsed.as_json(), Some(&json!({"a": 5})));
        let fallback = run("<html></html>", ReturnType::Json, None).await.unwrap();
        assert_eq!(fallback.as_text(), Some("<html></html>"));
    }

    #[tokio::test]
    async fn validator_gates_json() {
        let validator: Validator = Arc::new(|value: &Value| value.get("a").is_some());
        let ok = run(r#"{"a":5}"#, ReturnType::Json, Some(&validator)).await.unwrap();
        assert!(ok.as_json().is_some());

        let rejected = run(r#"{"b":5}"#, ReturnType::Json, Some(&validator)).await.unwrap_err();
        assert!(matches!(rejected, Error::ValidationFailed));

        let unparsable = run("<html>", ReturnType::Json, Some(&validator)).await.unwrap_err();
        assert!(matches!(unparsable, Error::ValidationFailed));
    }

    #[tokio::test]
    async fn validator_ignored_for_other_types() {
        let validator: Validator = Arc::new(|_: &Value| false);
        let text = run("x", ReturnType::String, Some(&validator)).await.unwrap();
        assert_eq!(text.as_text(), Some("x"));
    }

    #[tokio::test]
    async fn empty_discards_body() {
        assert!(run("ignored", ReturnType::Empty, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_respects_chunk_size() {
        let transform = TransformOptions { chunk_size: Some(4) };
        let body = materialize(body("abcdefghij"), ReturnType::Stream, &transform, None)
            .await
            .unwrap();
        let chunks: Vec<Bytes> = body.into_stream().unwrap().try_collect().await.unwrap();
        assert_eq!(chunks, vec![Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh"), Bytes::from_static(b"ij")]);
    }
}
