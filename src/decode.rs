//! Content-decoding pipeline.
//!
//! `Content-Encoding` lists codings in the order they were applied, so the
//! stages run in reverse header order. Decoding is incremental: each chunk
//! is pushed through every stage as it arrives.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use flate2::write::{GzDecoder, ZlibDecoder};
use futures_util::StreamExt;

use crate::{ByteStream, Error, Result};

/// Codings the pipeline knows how to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    /// `gzip` / `x-gzip`
    Gzip,
    /// `br`
    Brotli,
    /// `deflate` (zlib-wrapped)
    Deflate,
}

/// Parse a `Content-Encoding` value into the stages to run, in run order.
///
/// `identity` is skipped; unknown codings are logged and passed through.
pub fn stages(content_encoding: &str) -> Vec<Coding> {
    let mut codings: Vec<Coding> = content_encoding
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.as_str() {
            "gzip" | "x-gzip" => Some(Coding::Gzip),
            "br" => Some(Coding::Brotli),
            "deflate" => Some(Coding::Deflate),
            "identity" => None,
            other => {
                tracing::warn!(coding = other, "unsupported content-encoding, passing body through");
                None
            }
        })
        .collect();
    codings.reverse();
    codings
}

/// Wrap `body` so it yields decoded bytes.
pub fn decode(body: ByteStream, content_encoding: &str) -> ByteStream {
    let codings = stages(content_encoding);
    if codings.is_empty() {
        return body;
    }
    tracing::trace!(?codings, "decoding response body");

    let pipeline = Pipeline {
        stages: codings.into_iter().map(Stage::new).collect(),
        body,
        finished: false,
    };
    ByteStream::new(futures_util::stream::try_unfold(pipeline, |mut pipeline| async move {
        let chunk = pipeline.next_chunk().await?;
        Ok::<_, Error>(chunk.map(|chunk| (chunk, pipeline)))
    }))
}

/// Output sink shared with a decoder so produced bytes can be taken between writes.
#[derive(Clone, Default)]
struct Spill(Arc<Mutex<Vec<u8>>>);

impl Spill {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Write for Spill {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Decoder {
    Gzip(GzDecoder<Spill>),
    Deflate(ZlibDecoder<Spill>),
    Brotli(Box<brotli::DecompressorWriter<Spill>>),
}

struct Stage {
    decoder: Decoder,
    output: Spill,
    received: bool,
}

impl Stage {
    fn new(coding: Coding) -> Self {
        let output = Spill::default();
        let decoder = match coding {
            Coding::Gzip => Decoder::Gzip(GzDecoder::new(output.clone())),
            Coding::Deflate => Decoder::Deflate(ZlibDecoder::new(output.clone())),
            Coding::Brotli => Decoder::Brotli(Box::new(brotli::DecompressorWriter::new(output.clone(), 8 * 1024))),
        };
        Self {
            decoder,
            output,
            received: false,
        }
    }

    fn feed(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        self.received |= !input.is_empty();
        match &mut self.decoder {
            Decoder::Gzip(decoder) => {
                decoder.write_all(input)?;
                decoder.flush()?;
            }
            Decoder::Deflate(decoder) => {
                decoder.write_all(input)?;
                decoder.flush()?;
            }
            Decoder::Brotli(decoder) => {
                decoder.write_all(input)?;
                decoder.flush()?;
            }
        }
        Ok(self.output.take())
    }

    /// Complete the stage, failing if its input stopped mid-stream.
    ///
    /// A stage that never saw a byte produces nothing.
    fn finish(&mut self) -> io::Result<Vec<u8>> {
        if !self.received {
            return Ok(Vec::new());
        }
        match &mut self.decoder {
            Decoder::Gzip(decoder) => decoder.try_finish()?,
            Decoder::Deflate(decoder) => decoder.try_finish()?,
            Decoder::Brotli(decoder) => decoder.close()?,
        }
        Ok(self.output.take())
    }
}

struct Pipeline {
    stages: Vec<Stage>,
    body: ByteStream,
    finished: bool,
}

impl Pipeline {
    /// Next non-empty decoded chunk, or `None` once the body and every stage are drained.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        while !self.finished {
            let output = match self.body.next().await {
                Some(chunk) => self.push(&chunk?)?,
                None => {
                    self.finished = true;
                    self.flush_all()?
                }
            };
            if !output.is_empty() {
                return Ok(Some(Bytes::from(output)));
            }
        }
        Ok(None)
    }

    /// Feed `input` into the first stage and carry its output through the rest.
    fn push(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut data = input.to_vec();
        for stage in &mut self.stages {
            if data.is_empty() {
                break;
            }
            data = stage.feed(&data)?;
        }
        Ok(data)
    }

    fn flush_all(&mut self) -> io::Result<Vec<u8>> {
        let mut tail = Vec::new();
        for stage in &mut self.stages {
            let mut data = if tail.is_empty() { Vec::new() } else { stage.feed(&tail)? };
            data.extend(stage.finish()?);
            tail = data;
        }
        Ok(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder, write::ZlibEncoder};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn brotli(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            encoder.write_all(data).unwrap();
        }
        out
    }

    fn chunked(data: Vec<u8>, size: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = data.chunks(size).map(|chunk| Ok(Bytes::copy_from_slice(chunk))).collect();
        ByteStream::new(futures_util::stream::iter(chunks))
    }

    #[test]
    fn stages_run_in_reverse_header_order() {
        assert_eq!(stages("gzip, br"), vec![Coding::Brotli, Coding::Gzip]);
        assert_eq!(stages("Deflate"), vec![Coding::Deflate]);
        assert!(stages("identity").is_empty());
        assert_eq!(stages("identity, unknown, gzip"), vec![Coding::Gzip]);
    }

    #[tokio::test]
    async fn decodes_each_coding_from_small_chunks() {
        let text = b"hello world, hello world, hello world".repeat(40);
        for (encoded, header) in [(gzip(&text), "gzip"), (deflate(&text), "deflate"), (brotli(&text), "br")] {
            let decoded = decode(chunked(encoded, 7), header).into_bytes().await.unwrap();
            assert_eq!(decoded.as_ref(), text.as_slice(), "{header}");
        }
    }

    #[tokio::test]
    async fn undoes_stacked_codings() {
        let text = b"stacked".repeat(100);
        // applied gzip first, then br
        let encoded = brotli(&gzip(&text));
        let decoded = decode(chunked(encoded, 16), "gzip, br").into_bytes().await.unwrap();
        assert_eq!(decoded.as_ref(), text.as_slice());
    }

    #[tokio::test]
    async fn unknown_coding_passes_through() {
        let decoded = decode(ByteStream::from_bytes("raw"), "compress").into_bytes().await.unwrap();
        assert_eq!(decoded, Bytes::from_static(b"raw"));
    }

    #[tokio::test]
    async fn empty_body_decodes_to_nothing() {
        for header in ["gzip", "deflate", "br", "gzip, br"] {
            let decoded = decode(ByteStream::empty(), header).into_bytes().await.unwrap();
            assert!(decoded.is_empty(), "{header}");
        }
    }

    #[tokio::test]
    async fn truncated_input_is_an_error() {
        let text = b"a fairly long line of text that compresses. ".repeat(150);
        for (mut encoded, header) in [(gzip(&text), "gzip"), (brotli(&text), "br")] {
            encoded.truncate(encoded.len() / 2);
            let result = decode(chunked(encoded, 64), header).into_bytes().await;
            assert!(result.is_err(), "{header}");
        }
    }

    #[tokio::test]
    async fn corrupt_input_is_an_error() {
        let result = decode(ByteStream::from_bytes("definitely not gzip"), "gzip").into_bytes().await;
        assert!(result.is_err());
    }
}
