// Hand-framed HTTP/1.1 GET over a raw connection

use std::io::{self, BufReader, Read, Write};
use std::time::Duration;

use url::Url;

use crate::error::BoxError;
use crate::headers::parse_headers;
use crate::net::{Connection, Connector};
use crate::platform::{HttpGet, HttpResponse};

/// Write a non-persistent, non-cached GET request for `path`.
pub fn write_get_request<W: Write + ?Sized>(
    out: &mut W,
    host: &str,
    port: u16,
    path: &str,
) -> io::Result<()> {
    let request = if port == 80 {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
            path, host
        )
    } else {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}:{}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
            path, host, port
        )
    };
    log::debug!("GET: {:?}", request);

    out.write_all(request.as_bytes())?;
    out.flush()
}

/// Minimal `http://` manifest client built on a [`Connector`].
///
/// The body is read up to `Content-Length` when the server sends one,
/// otherwise until the server closes the connection.
pub struct PlainHttpClient<C> {
    connector: C,
    read_timeout: Duration,
}

impl<C: Connector> PlainHttpClient<C> {
    pub fn new(connector: C, read_timeout: Duration) -> Self {
        Self {
            connector,
            read_timeout,
        }
    }

    fn exchange(
        conn: &mut C::Connection,
        url: &Url,
        host: &str,
        port: u16,
    ) -> Result<HttpResponse, BoxError> {
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        write_get_request(conn, host, port, &target)?;

        let mut reader = BufReader::new(conn);
        let headers = parse_headers(&mut reader)?;
        let status = headers.status.ok_or("response has no valid status line")?;
        if !headers.status_ok() {
            return Ok(HttpResponse {
                status,
                body: Vec::new(),
            });
        }

        let mut body = Vec::new();
        if headers.content_length > 0 {
            reader
                .take(headers.content_length as u64)
                .read_to_end(&mut body)?;
        } else {
            reader.read_to_end(&mut body)?;
        }

        Ok(HttpResponse { status, body })
    }
}

impl<C: Connector> HttpGet for PlainHttpClient<C> {
    fn get(&mut self, url: &str) -> Result<HttpResponse, BoxError> {
        let url = Url::parse(url)?;
        if url.scheme() != "http" {
            return Err(format!("unsupported scheme {:?}", url.scheme()).into());
        }
        let host = url.host_str().ok_or("URL has no host")?.to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let mut conn = self.connector.connect(&host, port)?;
        conn.set_read_timeout(Some(self.read_timeout))?;

        let result = Self::exchange(&mut conn, &url, &host, port);
        conn.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedConnector;

    #[test]
    fn test_request_framing() {
        let mut out = Vec::new();
        write_get_request(&mut out, "update.example.com", 80, "/fw.bin").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "GET /fw.bin HTTP/1.1\r\nHost: update.example.com\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n"
        );

        let mut out = Vec::new();
        write_get_request(&mut out, "10.0.0.2", 8080, "/fw.bin").unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Host: 10.0.0.2:8080\r\n"));
    }

    #[test]
    fn test_get_reads_body_by_length() {
        let mut connector = ScriptedConnector::respond(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 7\r\n\r\n{\"a\":1}trailing",
        );
        let mut client = PlainHttpClient::new(&mut connector, Duration::from_secs(5));

        let response = client.get("http://example.com:8081/check.json?id=7").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{\"a\":1}");

        assert_eq!(connector.dialed, vec![("example.com".to_string(), 8081)]);
        assert!(connector
            .request_text(0)
            .starts_with("GET /check.json?id=7 HTTP/1.1\r\nHost: example.com:8081\r\n"));
        assert!(connector.log(0).closed);
        assert_eq!(connector.log(0).timeouts, vec![Some(Duration::from_secs(5))]);
    }

    #[test]
    fn test_get_reads_body_to_close_without_length() {
        let mut connector = ScriptedConnector::respond("HTTP/1.1 200 OK\r\n\r\n{\"b\":2}");
        let mut client = PlainHttpClient::new(&mut connector, Duration::from_secs(5));

        let response = client.get("http://example.com/m.json").unwrap();
        assert_eq!(response.body, b"{\"b\":2}");
    }

    #[test]
    fn test_get_reports_non_200_status() {
        let mut connector = ScriptedConnector::respond("HTTP/1.1 503 Busy\r\n\r\n");
        let mut client = PlainHttpClient::new(&mut connector, Duration::from_secs(5));

        let response = client.get("http://example.com/m.json").unwrap();
        assert_eq!(response.status, 503);
        assert!(response.body.is_empty());
        assert!(connector.log(0).closed);
    }

    #[test]
    fn test_get_rejects_https_and_refusal() {
        let mut connector = ScriptedConnector::refusing();
        let mut client = PlainHttpClient::new(&mut connector, Duration::from_secs(5));

        assert!(client.get("https://example.com/m.json").is_err());
        assert!(client.get("http://example.com/m.json").is_err());
        assert_eq!(connector.dialed.len(), 1);
    }
}
