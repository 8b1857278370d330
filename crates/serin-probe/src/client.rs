//! One-shot HTTP exchange shared by the source and sink halves.

use std::time::Duration;

use anyhow::Context;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ClientError {
    /// The whole exchange exceeded the configured timeout.
    #[error("timed out after {0}ms")]
    Timeout(u64),
    /// Connect, handshake, or transfer failed.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub(crate) struct HttpResponse {
    pub status: u16,
    pub body: bytes::Bytes,
}

/// Issue one request on a fresh connection and collect the body.
pub(crate) async fn request(
    method: &str,
    uri: &http::Uri,
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<HttpResponse, ClientError> {
    match tokio::time::timeout(timeout, exchange(method, uri, body)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(ClientError::Transport(e)),
        Err(_) => Err(ClientError::Timeout(timeout.as_millis() as u64)),
    }
}

async fn exchange(
    method: &str,
    uri: &http::Uri,
    body: Option<Vec<u8>>,
) -> anyhow::Result<HttpResponse> {
    let host = uri.host().context("uri is missing a host")?;
    let port = uri.port_u16().unwrap_or(80);
    let address = format!("{host}:{port}");

    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("connect to {address}"))?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .context("http handshake")?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", address)
        .header("user-agent", "serin-probe/0.1");
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(Full::new(bytes::Bytes::from(body.unwrap_or_default())))
        .context("build request")?;

    let response = sender.send_request(request).await.context("send request")?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .collect()
        .await
        .context("read response body")?
        .to_bytes();

    Ok(HttpResponse { status, body })
}
