use crate::{RemoteConfig, RemoteError};
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};

/// Blocking HTTP client shared by the fetcher and the release lister.
pub struct HttpClient {
    agent: ureq::Agent,
    auth_token: Option<String>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            auth_token: None,
        }
    }

    pub fn with_config(config: &RemoteConfig) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn call(&self, url: &str, accept: &str) -> Result<ureq::http::Response<ureq::Body>, RemoteError> {
        let mut req = self.agent.get(url).header("Accept", accept);
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        match req.call() {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::StatusCode(404)) => Err(RemoteError::NotFound(url.to_owned())),
            Err(ureq::Error::StatusCode(code)) => {
                Err(RemoteError::Http(format!("HTTP {code} for {url}")))
            }
            Err(e) => Err(RemoteError::Http(format!("{url}: {e}"))),
        }
    }

    /// Stream the body of `url` into `out`. Returns the byte count.
    pub fn download(&self, url: &str, out: &mut impl Write) -> Result<u64, RemoteError> {
        tracing::debug!("GET {url}");
        let resp = self.call(url, "application/octet-stream")?;
        let mut reader = resp.into_body().into_reader();
        io::copy(&mut reader, out).map_err(|e| RemoteError::Http(format!("{url}: {e}")))
    }

    /// GET `url` as JSON. Also returns the `rel="next"` link, if any.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, Option<String>), RemoteError> {
        tracing::debug!("GET {url}");
        let resp = self.call(url, "application/vnd.github+json")?;
        let next = resp
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(format!("{url}: {e}")))?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Serialization(format!("{url}: {e}")))?;
        Ok((value, next))
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == "rel=\"next\"")
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_owned()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tiny_http::{Header, Response, Server};

    struct TestServer {
        url: String,
        auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    }

    fn start() -> TestServer {
        let server = Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}", server.server_addr().to_ip().unwrap());
        let auth_headers = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&auth_headers);
        std::thread::spawn(move || {
            for req in server.incoming_requests() {
                let auth = req
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.to_string());
                seen.lock().unwrap().push(auth);
                let resp = match req.url() {
                    "/blob" => Response::from_data(b"payload".to_vec()),
                    "/page1" => Response::from_data(b"[1,2]".to_vec()).with_header(
                        Header::from_bytes(&b"Link"[..], &b"</page2>; rel=\"next\""[..]).unwrap(),
                    ),
                    _ => Response::from_data(b"missing".to_vec()).with_status_code(404),
                };
                let _ = req.respond(resp);
            }
        });
        TestServer { url, auth_headers }
    }

    #[test]
    fn download_streams_body() {
        let server = start();
        let mut out = Vec::new();
        let n = HttpClient::new()
            .download(&format!("{}/blob", server.url), &mut out)
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(out, b"payload");
    }

    #[test]
    fn missing_resource_is_not_found() {
        let server = start();
        let err = HttpClient::new()
            .download(&format!("{}/nope", server.url), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn get_json_returns_next_link_and_sends_token() {
        let server = start();
        let client =
            HttpClient::with_config(&RemoteConfig::new(&server.url).with_token(Some("tok")));
        let (values, next): (Vec<u32>, _) =
            client.get_json(&format!("{}/page1", server.url)).unwrap();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(next.as_deref(), Some("/page2"));
        assert_eq!(
            server.auth_headers.lock().unwrap()[0].as_deref(),
            Some("Bearer tok")
        );
    }

    #[test]
    fn next_link_parsing() {
        let header = "<https://api.github.com/x?page=1>; rel=\"prev\", \
                      <https://api.github.com/x?page=3>; rel=\"next\"";
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://api.github.com/x?page=3")
        );
        assert_eq!(next_link("<https://a>; rel=\"last\""), None);
    }
}
