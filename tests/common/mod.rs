//! Shared fixture server for the integration tests.
//!
//! A small tiny_http server implements just the endpoints the suite needs.
//! Two independent instances are available so redirects can cross origins.
//! Every request is answered on its own thread so a slow endpoint never
//! blocks the others.

#![allow(dead_code)]

use std::{
    io::{Cursor, Read, Write},
    thread,
    time::Duration,
};

use flate2::{Compression, write::GzEncoder, write::ZlibEncoder};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value, json};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use url::Url;

/// Payload served by every compressed endpoint.
pub const FIXTURE: &str = "candyget decodes this payload: the quick brown fox jumps over the lazy dog. \
                           the quick brown fox jumps over the lazy dog. the quick brown fox jumps over the lazy dog.";

#[derive(Debug)]
pub struct TestServer {
    base: String,
    _thread: thread::JoinHandle<()>,
}

impl TestServer {
    fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("start test server");
        let base = format!("http://{}", server.server_addr());
        let thread = thread::spawn(move || {
            for request in server.incoming_requests() {
                thread::spawn(move || {
                    let mut request = request;
                    let response = handle_request(&mut request);
                    let _ = request.respond(response);
                });
            }
        });

        Self {
            base,
            _thread: thread,
        }
    }

    /// Full URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

/// The primary fixture server.
pub fn test_server() -> &'static TestServer {
    static INSTANCE: OnceCell<TestServer> = OnceCell::new();
    INSTANCE.get_or_init(TestServer::start)
}

/// A second server on another port, i.e. another origin.
pub fn other_server() -> &'static TestServer {
    static INSTANCE: OnceCell<TestServer> = OnceCell::new();
    INSTANCE.get_or_init(TestServer::start)
}

/// Build a full URL against the primary server.
pub fn uri(path: &str) -> String {
    test_server().url(path)
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn brotli(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        encoder.write_all(data).unwrap();
    }
    out
}

fn handle_request(request: &mut Request) -> Response<Cursor<Vec<u8>>> {
    // tiny_http only provides the path/query, so prefix with a dummy scheme/host.
    let url = Url::parse(&format!("http://localhost{}", request.url())).unwrap();
    let path = url.path().to_string();
    let query = url
        .query_pairs()
        .into_owned()
        .collect::<Vec<(String, String)>>();

    match path.as_str() {
        "/get" => text_response(StatusCode(200), "OK"),
        "/json" => json_response(StatusCode(200), r#"{"a":5,"nested":{"ok":true}}"#),
        "/html" => text_response(StatusCode(200), "<html><body>not json</body></html>"),
        "/echo" => echo(request),
        "/binary" => bytes_response(StatusCode(200), (0..=255u8).collect::<Vec<_>>()),
        "/gzip" => encoded_response(gzip(FIXTURE.as_bytes()), "gzip"),
        "/br" => encoded_response(brotli(FIXTURE.as_bytes()), "br"),
        "/deflate" => encoded_response(deflate(FIXTURE.as_bytes()), "deflate"),
        "/gzip-br" => encoded_response(brotli(&gzip(FIXTURE.as_bytes())), "gzip, br"),
        "/identity" => encoded_response(FIXTURE.as_bytes().to_vec(), "Identity"),
        "/unknown-encoding" => encoded_response(FIXTURE.as_bytes().to_vec(), "compress"),
        "/empty-gzip" => encoded_response(Vec::new(), "gzip"),
        "/delay" => {
            thread::sleep(Duration::from_secs(2));
            text_response(StatusCode(200), "late")
        }
        "/redirect-no-location" => text_response(StatusCode(302), "nowhere"),
        "/redirect-to" => handle_redirect_to(&query),
        _ => {
            if let Some(stripped) = path.strip_prefix("/status/") {
                return handle_status(stripped);
            }
            if let Some(stripped) = path.strip_prefix("/redirect/") {
                return handle_redirect(stripped);
            }
            text_response(StatusCode(404), format!("no route for {path}"))
        }
    }
}

/// Reflect the request back as JSON: method, lower-cased headers and body.
fn echo(request: &mut Request) -> Response<Cursor<Vec<u8>>> {
    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);

    let mut headers = Map::new();
    for header in request.headers() {
        headers.insert(
            header.field.to_string().to_ascii_lowercase(),
            Value::String(header.value.to_string()),
        );
    }
    let reflected = json!({
        "method": request.method().to_string(),
        "headers": headers,
        "body": body,
    });
    json_response(StatusCode(200), &reflected.to_string())
}

fn handle_status(code: &str) -> Response<Cursor<Vec<u8>>> {
    let status = code.parse::<u16>().unwrap_or(400);
    text_response(StatusCode(status), format!("status {status}"))
}

fn handle_redirect(steps: &str) -> Response<Cursor<Vec<u8>>> {
    let steps = steps.parse::<u32>().unwrap_or(0);
    if steps == 0 {
        return text_response(StatusCode(200), "redirect complete");
    }
    redirect_response(&format!("/redirect/{}", steps - 1), 302)
}

fn handle_redirect_to(query: &[(String, String)]) -> Response<Cursor<Vec<u8>>> {
    let target = query
        .iter()
        .find(|(key, _)| key == "url")
        .map_or("/", |(_, value)| value.as_str());
    let status = query
        .iter()
        .find(|(key, _)| key == "status")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(302);
    redirect_response(target, status)
}

fn redirect_response(location: &str, status: u16) -> Response<Cursor<Vec<u8>>> {
    let location_header = Header::from_bytes("Location", location).unwrap();
    Response::from_string("redirect")
        .with_status_code(StatusCode(status))
        .with_header(location_header)
}

fn encoded_response(body: Vec<u8>, encoding: &str) -> Response<Cursor<Vec<u8>>> {
    let header = Header::from_bytes("Content-Encoding", encoding).unwrap();
    bytes_response(StatusCode(200), body).with_header(header)
}

fn json_response(status: StatusCode, body: &str) -> Response<Cursor<Vec<u8>>> {
    let content_type = Header::from_bytes("Content-Type", "application/json").unwrap();
    Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(content_type)
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response<Cursor<Vec<u8>>> {
    Response::from_string(body.into()).with_status_code(status)
}

fn bytes_response(status: StatusCode, body: impl Into<Vec<u8>>) -> Response<Cursor<Vec<u8>>> {
    Response::from_data(body.into()).with_status_code(status)
}
