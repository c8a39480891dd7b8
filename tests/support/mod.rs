#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// In-process HTTP/1.1 server with a handful of scripted routes:
///
/// - `/delay/{ms}`: replies `delayed {ms}` after `ms` milliseconds
/// - `/hang`: never replies in any reasonable time
/// - `/echo`: replies with the request body, method in `x-echo-method`
/// - `/headers`: replies with every `x-multi` value joined by `,`
/// - `/status/{code}`: replies with that status and an empty body
pub struct TestServer {
    addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("read local address");

        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(TokioIo::new(stream), service_fn(route))
                        .await;
                });
            }
        });

        Self { addr, accept_loop }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
    let addr = listener.local_addr().expect("read local address");
    drop(listener);
    format!("http://{addr}/")
}

async fn route(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();

    if let Some(ms) = path.strip_prefix("/delay/").and_then(|ms| ms.parse::<u64>().ok()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        return Ok(reply(StatusCode::OK, format!("delayed {ms}")));
    }
    if let Some(code) = path.strip_prefix("/status/").and_then(|c| c.parse::<u16>().ok()) {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(reply(status, Bytes::new()));
    }

    match path.as_str() {
        "/hang" => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(reply(StatusCode::OK, "too late"))
        }
        "/echo" => {
            let method = req.method().to_string();
            let body = req
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            let mut response = reply(StatusCode::OK, body);
            response
                .headers_mut()
                .insert("x-echo-method", method.parse().expect("method header"));
            Ok(response)
        }
        "/headers" => {
            let joined = req
                .headers()
                .get_all("x-multi")
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            Ok(reply(StatusCode::OK, joined))
        }
        _ => Ok(reply(StatusCode::NOT_FOUND, "not found")),
    }
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
