//! Fetches and decodes the server directory

use crate::error::ClientError;
use log::{debug, info};
use shared::{decode_directory, EndpointRecord, DIRECTORY_URL};
use std::time::Duration;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DirectoryClient {
    http: reqwest::Client,
    url: String,
}

impl DirectoryClient {
    /// Targets the public directory.
    pub fn new() -> Result<Self, ClientError> {
        Self::with_url(DIRECTORY_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Downloads the directory once. Failures are returned as is, without retry.
    pub async fn fetch_servers(&self) -> Result<Vec<EndpointRecord>, ClientError> {
        debug!("Fetching server directory from {}", self.url);

        let body = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        // a trailing newline is not part of the encoding
        let servers = decode_directory(body.trim_end())?;
        info!("Directory lists {} servers", servers.len());
        Ok(servers)
    }

    /// The first listed server, which is the conventional pick.
    pub async fn fetch_first_server(&self) -> Result<EndpointRecord, ClientError> {
        self.fetch_servers()
            .await?
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyDirectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TWO_SERVERS: &str = "alqrxirqhelsarzuljaypkuasvhcovxcjqypxszgnuiib";

    /// Serves one canned HTTP response and returns the directory URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });

        format!("http://{}/i33628.txt", addr)
    }

    #[test]
    fn test_default_url() {
        let directory = DirectoryClient::new().unwrap();
        assert_eq!(directory.url(), "http://slither.io/i33628.txt");
    }

    #[tokio::test]
    async fn test_fetch_servers() {
        let url = serve_once("200 OK", "alqrxirqhelsarzuljaypkuasvhcovxcjqypxszgnuiib\n").await;
        let directory = DirectoryClient::with_url(url).unwrap();

        let servers = directory.fetch_servers().await.unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].host, Ipv4Addr::new(185, 50, 104, 10));
        assert_eq!(servers[1].cluster_id, 12);
    }

    #[tokio::test]
    async fn test_fetch_first_server() {
        let url = serve_once("200 OK", TWO_SERVERS).await;
        let directory = DirectoryClient::with_url(url).unwrap();

        let first = directory.fetch_first_server().await.unwrap();
        assert_eq!(first.to_string(), "185.50.104.10:444");
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let url = serve_once("200 OK", "a").await;
        let directory = DirectoryClient::with_url(url).unwrap();

        assert!(directory.fetch_servers().await.unwrap().is_empty());
        // the responder served its only request; fetch again from a fresh one
        let url = serve_once("200 OK", "").await;
        let directory = DirectoryClient::with_url(url).unwrap();
        assert!(matches!(
            directory.fetch_first_server().await,
            Err(ClientError::EmptyDirectory)
        ));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let url = serve_once("503 Service Unavailable", "").await;
        let directory = DirectoryClient::with_url(url).unwrap();

        assert!(matches!(
            directory.fetch_servers().await,
            Err(ClientError::DirectoryFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let directory = DirectoryClient::with_url(format!("http://{}/i33628.txt", addr)).unwrap();
        assert!(matches!(
            directory.fetch_servers().await,
            Err(ClientError::DirectoryFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_directory() {
        // the first digit of the first record decodes to 16
        let url = serve_once("200 OK", "aqqrxirqhelsarzuljaypkuasvhcovxcjqypxszgnuiib").await;
        let directory = DirectoryClient::with_url(url).unwrap();

        assert!(matches!(
            directory.fetch_servers().await,
            Err(ClientError::Protocol(shared::ProtocolError::MalformedDirectory { .. }))
        ));
    }
}
