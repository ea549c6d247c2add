use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::http::{HttpRequest, HttpResponse};
use crate::request::{JsonRpcRequest, JsonRpcResponse, Method, ParsedRequest, SkippedResult};
use crank_traits::{CycleTrigger, TriggerOutcome};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

/// buffer size for a single read.
const READ_CHUNK: usize = 8192;

/// JSON-RPC trigger server. one request per connection.
#[derive(Clone)]
pub struct RpcServer {
    config: Arc<ServerConfig>,
}

impl RpcServer {
    /// create a new trigger server.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(ServerError::Internal)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Trigger server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// bind and serve until `shutdown` flips to true.
    pub async fn run(
        &self,
        trigger: Arc<dyn CycleTrigger>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, trigger, shutdown).await
    }

    /// accept loop on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        trigger: Arc<dyn CycleTrigger>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&permits).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("Connection limit reached, dropping {}", addr);
                            continue;
                        }
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY: {}", e);
                    }

                    let config = Arc::clone(&self.config);
                    let trigger = Arc::clone(&trigger);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, &config, trigger.as_ref()).await {
                            debug!("Connection {} ended with error: {}", addr, e);
                        }
                        drop(permit);
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Trigger server stopped");
        Ok(())
    }
}

/// read one request, answer it, close.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: &ServerConfig,
    trigger: &dyn CycleTrigger,
) -> Result<()> {
    let response = match tokio::time::timeout(config.read_timeout, read_request(&mut stream, config))
        .await
    {
        Ok(Ok(buf)) => match HttpRequest::parse(&buf) {
            Ok(request) => handle_http(request, trigger).await,
            Err(e) => {
                warn!("Bad HTTP request from {}: {}", addr, e);
                HttpResponse::bad_request()
            }
        },
        Ok(Err(ServerError::InvalidHttp(reason))) => {
            warn!("Rejected request from {}: {}", addr, reason);
            HttpResponse::payload_too_large()
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(ServerError::Timeout),
    };

    stream.write_all(&response.build()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// read until a complete request is buffered.
async fn read_request(stream: &mut TcpStream, config: &ServerConfig) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before request completed",
            )));
        }
        buf.extend_from_slice(&chunk[..n]);

        if buf.len() > config.max_request_size {
            return Err(ServerError::InvalidHttp("Request too large".to_string()));
        }
        if HttpRequest::is_complete(&buf) {
            return Ok(buf);
        }
    }
}

async fn handle_http(request: HttpRequest, trigger: &dyn CycleTrigger) -> HttpResponse {
    debug!(
        "{} {} ({})",
        request.method,
        request.path,
        request.user_agent.as_deref().unwrap_or("-")
    );
    if request.method != "POST" {
        return HttpResponse::method_not_allowed();
    }

    let response = dispatch(&request.body, trigger).await;
    match serde_json::to_vec(&response) {
        Ok(body) => HttpResponse::json(body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            HttpResponse::json(
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#,
            )
        }
    }
}

/// answer one JSON-RPC body.
pub async fn dispatch(body: &[u8], trigger: &dyn CycleTrigger) -> JsonRpcResponse {
    let request = match JsonRpcRequest::from_slice(body) {
        Ok(request) => request,
        Err(e) => return JsonRpcResponse::from_error(serde_json::Value::Null, e),
    };

    let id = request.id.clone();
    let parsed = match ParsedRequest::from_rpc_request(request) {
        Ok(parsed) => parsed,
        Err(e) => return JsonRpcResponse::from_error(id, e),
    };

    match parsed.method {
        Method::RunCycle => {
            info!("Manual cycle requested");
            match trigger.trigger().await {
                TriggerOutcome::Ran(report) => JsonRpcResponse::success(parsed.id, report),
                TriggerOutcome::Skipped => match serde_json::to_value(SkippedResult::new()) {
                    Ok(result) => JsonRpcResponse::success(parsed.id, result),
                    Err(e) => JsonRpcResponse::from_error(parsed.id, ServerError::JsonParse(e)),
                },
            }
        }
        Method::GetStatus => JsonRpcResponse::success(parsed.id, trigger.status()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeTrigger {
        busy: AtomicBool,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl CycleTrigger for FakeTrigger {
        async fn trigger(&self) -> TriggerOutcome {
            if self.busy.load(Ordering::Acquire) {
                return TriggerOutcome::Skipped;
            }
            let n = self.runs.fetch_add(1, Ordering::AcqRel) + 1;
            TriggerOutcome::Ran(json!({"outcome": "idle", "run": n}))
        }

        fn status(&self) -> serde_json::Value {
            json!({"running": self.busy.load(Ordering::Acquire), "runs": self.runs.load(Ordering::Acquire)})
        }
    }

    async fn call(body: &str, trigger: &FakeTrigger) -> serde_json::Value {
        serde_json::to_value(dispatch(body.as_bytes(), trigger).await).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_methods() {
        let trigger = FakeTrigger::default();

        let out = call(r#"{"jsonrpc":"2.0","id":7,"method":"runCycle"}"#, &trigger).await;
        assert_eq!(out["id"], 7);
        assert_eq!(out["result"]["run"], 1);

        let out = call(r#"{"jsonrpc":"2.0","id":8,"method":"getStatus"}"#, &trigger).await;
        assert_eq!(out["result"]["runs"], 1);

        trigger.busy.store(true, Ordering::Release);
        let out = call(r#"{"jsonrpc":"2.0","id":9,"method":"runCycle"}"#, &trigger).await;
        assert_eq!(out["result"], json!({"status": "skipped"}));
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let trigger = FakeTrigger::default();

        let out = call("{", &trigger).await;
        assert_eq!(out["error"]["code"], -32700);
        assert!(out["id"].is_null());

        let out = call(r#"{"id":1}"#, &trigger).await;
        assert_eq!(out["error"]["code"], -32600);

        let out = call(r#"{"jsonrpc":"2.0","id":2,"method":"mint"}"#, &trigger).await;
        assert_eq!(out["error"]["code"], -32601);
        assert_eq!(out["id"], 2);
        assert_eq!(trigger.runs.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let server = RpcServer::new(ServerConfig::new()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trigger: Arc<dyn CycleTrigger> = Arc::new(FakeTrigger::default());

        let handle = tokio::spawn(async move { server.serve(listener, trigger, shutdown_rx).await });

        let body = r#"{"jsonrpc":"2.0","id":1,"method":"runCycle"}"#;
        let request = format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.contains(r#""run":1"#));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8(response).unwrap().starts_with("HTTP/1.1 405"));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
