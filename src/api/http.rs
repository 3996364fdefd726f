use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Reads per close check; a peer that keeps talking is checked again later.
const MAX_DRAIN_READS: usize = 16;

/// Request exceeded `MAX_REQUEST_BYTES`.
#[derive(Debug)]
pub(crate) struct RequestTooLarge;

impl std::fmt::Display for RequestTooLarge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request larger than {} bytes", MAX_REQUEST_BYTES)
    }
}

impl std::error::Error for RequestTooLarge {}

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Field names of an `application/x-www-form-urlencoded` body.
    pub fn form_fields(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.body)
            .split('&')
            .filter_map(|pair| {
                let key = pair.split('=').next().unwrap_or(pair).trim();
                (!key.is_empty()).then(|| key.replace('+', " "))
            })
            .collect()
    }

    fn content_length(&self) -> Result<usize> {
        match self.headers.get("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid content-length '{}'", value)),
            None => Ok(0),
        }
    }
}

pub(crate) fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(RequestTooLarge.into());
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    let mut request = HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body: data.split_off(header_end),
    };

    let expected = request.content_length()?;
    if header_end
        .checked_add(expected)
        .map_or(true, |total| total > MAX_REQUEST_BYTES)
    {
        return Err(RequestTooLarge.into());
    }
    while request.body.len() < expected {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        request.body.extend_from_slice(&buf[..n]);
    }
    request.body.truncate(expected);
    Ok(request)
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        303 => "HTTP/1.1 303 See Other",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub(crate) fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

pub(crate) fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line(status),
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

pub(crate) fn write_redirect(stream: &mut TcpStream, location: &str) -> Result<()> {
    let header = format!(
        "{}\r\nLocation: {}\r\nContent-Length: 0\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line(303),
        location
    );
    stream.write_all(header.as_bytes())?;
    Ok(())
}

/// Headers that open an endless `multipart/x-mixed-replace` response.
pub(crate) fn write_stream_header(stream: &mut TcpStream, boundary: &str) -> std::io::Result<()> {
    let header = format!(
        "{}\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line(200),
        boundary
    );
    stream.write_all(header.as_bytes())
}

pub(crate) fn write_stream_part(
    stream: &mut TcpStream,
    boundary: &str,
    jpeg: &[u8],
) -> std::io::Result<()> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        boundary,
        jpeg.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(jpeg)?;
    stream.write_all(b"\r\n")?;
    stream.flush()
}

/// True once the peer has closed its side of the connection.
///
/// Only called after the request has been consumed, so any bytes still
/// arriving are discarded rather than left to mask the close.
pub(crate) fn peer_closed(stream: &mut TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return true;
    }
    let mut scratch = [0u8; 512];
    let mut closed = false;
    for _ in 0..MAX_DRAIN_READS {
        match stream.read(&mut scratch) {
            Ok(0) => {
                closed = true;
                break;
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => break,
            Err(_) => {
                closed = true;
                break;
            }
        }
    }
    closed || stream.set_nonblocking(false).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn roundtrip(raw: &'static [u8]) -> Result<HttpRequest> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let client = std::thread::spawn(move || -> std::io::Result<TcpStream> {
            let mut stream = TcpStream::connect(addr)?;
            stream.write_all(raw)?;
            Ok(stream)
        });
        let (mut server_side, _) = listener.accept()?;
        let request = read_request(&mut server_side);
        let _client = client
            .join()
            .map_err(|_| anyhow!("client thread panicked"))??;
        request
    }

    #[test]
    fn parses_form_body_by_content_length() -> Result<()> {
        let request = roundtrip(
            b"POST /?x=1 HTTP/1.1\r\nHost: a\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 12\r\n\r\ntoggle_pir=1",
        )?;
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/");
        assert_eq!(request.form_fields(), vec!["toggle_pir".to_string()]);
        Ok(())
    }

    #[test]
    fn rejects_oversize_bodies() {
        let err = roundtrip(b"POST / HTTP/1.1\r\nContent-Length: 100000\r\n\r\n")
            .err()
            .map(|err| err.is::<RequestTooLarge>());
        assert_eq!(err, Some(true));

        let err = roundtrip(
            b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n",
        )
        .err()
        .map(|err| err.is::<RequestTooLarge>());
        assert_eq!(err, Some(true));
    }

    fn connected_pair() -> Result<(TcpStream, TcpStream)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let client = TcpStream::connect(listener.local_addr()?)?;
        let (server_side, _) = listener.accept()?;
        Ok((client, server_side))
    }

    #[test]
    fn close_is_seen_past_unread_trailing_bytes() -> Result<()> {
        let (mut client, mut server_side) = connected_pair()?;
        client.write_all(b"trailing bytes after the request")?;
        drop(client);
        std::thread::sleep(Duration::from_millis(50));
        assert!(peer_closed(&mut server_side));
        Ok(())
    }

    #[test]
    fn open_peer_with_pending_bytes_is_not_closed() -> Result<()> {
        let (mut client, mut server_side) = connected_pair()?;
        client.write_all(b"keep-alive noise")?;
        std::thread::sleep(Duration::from_millis(50));
        assert!(!peer_closed(&mut server_side));
        assert!(!peer_closed(&mut server_side));
        drop(client);
        Ok(())
    }

    #[test]
    fn empty_form_has_no_fields() -> Result<()> {
        let request = roundtrip(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n")?;
        assert!(request.form_fields().is_empty());
        Ok(())
    }
}
