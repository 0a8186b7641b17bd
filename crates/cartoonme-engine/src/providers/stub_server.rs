//! Blocking HTTP/1.1 stub for exercising the remote stylizers end to end.
//!
//! The server answers one scripted response per connection, in order, and
//! records every request it saw. Responses carry `Connection: close`, so each
//! request the client makes arrives on a fresh connection.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

const ACCEPT_DEADLINE: Duration = Duration::from_secs(10);

pub(crate) struct StubResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl StubResponse {
    pub(crate) fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    pub(crate) fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl RecordedRequest {
    /// Header lookup by case-insensitive name.
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn body_json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).context("request body is not JSON")
    }
}

pub(crate) struct StubServer {
    url: String,
    handle: JoinHandle<Result<Vec<RecordedRequest>>>,
}

impl StubServer {
    /// Binds a loopback port and serves the responses built by `script`,
    /// which receives the server's base URL.
    pub(crate) fn start(script: impl FnOnce(&str) -> Vec<StubResponse>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").context("failed to bind stub server")?;
        listener.set_nonblocking(true)?;
        let url = format!("http://{}", listener.local_addr()?);
        let responses = script(&url);
        let handle = thread::spawn(move || serve(listener, responses));
        Ok(Self { url, handle })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Waits until every scripted response was served and returns the
    /// requests in arrival order.
    pub(crate) fn finish(self) -> Result<Vec<RecordedRequest>> {
        self.handle
            .join()
            .map_err(|_| anyhow!("stub server thread panicked"))?
    }
}

/// Loopback requests must not be routed through a proxy from the environment.
pub(crate) fn direct_client() -> Result<HttpClient> {
    HttpClient::builder()
        .no_proxy()
        .timeout(ACCEPT_DEADLINE)
        .build()
        .context("failed to build test HTTP client")
}

fn serve(listener: TcpListener, responses: Vec<StubResponse>) -> Result<Vec<RecordedRequest>> {
    let deadline = Instant::now() + ACCEPT_DEADLINE;
    let mut seen = Vec::new();
    for response in responses {
        let mut stream = accept_before(&listener, deadline)?;
        seen.push(read_request(&mut stream)?);
        write_response(&mut stream, &response)?;
    }
    Ok(seen)
}

fn accept_before(listener: &TcpListener, deadline: Instant) -> Result<TcpStream> {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(ACCEPT_DEADLINE))?;
                return Ok(stream);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    bail!("client stopped before every scripted response was served");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    let read = stream.read(&mut chunk)?;
    if read == 0 {
        bail!("client closed the connection mid-request");
    }
    buf.extend_from_slice(&chunk[..read]);
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<RecordedRequest> {
    let mut buf = Vec::new();
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        read_more(stream, &mut buf)?;
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let mut request = RecordedRequest {
        method,
        path,
        headers,
        body: Vec::new(),
    };
    let mut rest = buf[head_end..].to_vec();
    if let Some(length) = request
        .header("content-length")
        .and_then(|value| value.parse::<usize>().ok())
    {
        while rest.len() < length {
            read_more(stream, &mut rest)?;
        }
        rest.truncate(length);
        request.body = rest;
    } else if request
        .header("transfer-encoding")
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    {
        request.body = read_chunked(stream, rest)?;
    }
    Ok(request)
}

fn read_chunked(stream: &mut TcpStream, mut pending: Vec<u8>) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = loop {
            if let Some(pos) = find(&pending, b"\r\n") {
                break pos;
            }
            read_more(stream, &mut pending)?;
        };
        let size_line = String::from_utf8_lossy(&pending[..line_end]).into_owned();
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .with_context(|| format!("invalid chunk size '{size_hex}'"))?;
        pending.drain(..line_end + 2);
        if size == 0 {
            return Ok(body);
        }
        while pending.len() < size + 2 {
            read_more(stream, &mut pending)?;
        }
        body.extend_from_slice(&pending[..size]);
        pending.drain(..size + 2);
    }
}

fn write_response(stream: &mut TcpStream, response: &StubResponse) -> Result<()> {
    let reason = match response.status {
        200 => "OK",
        201 => "Created",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()?;
    Ok(())
}
