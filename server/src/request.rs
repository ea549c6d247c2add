use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// decode a request body. malformed json is a parse error, json that is
    /// not a request object is an invalid request.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        serde_json::from_value(value).map_err(|e| ServerError::InvalidRequest(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.jsonrpc != "2.0" {
            return Err(ServerError::InvalidRequest(format!(
                "Invalid jsonrpc version: {}",
                self.jsonrpc
            )));
        }
        Ok(())
    }
}

/// methods the trigger server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// run one cycle now unless one is in flight.
    RunCycle,
    /// scheduler state.
    GetStatus,
}

impl Method {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "runCycle" => Ok(Method::RunCycle),
            "getStatus" => Ok(Method::GetStatus),
            other => Err(ServerError::MethodNotFound(other.to_string())),
        }
    }
}

/// parsed and validated request ready for dispatch.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub id: serde_json::Value,
    pub method: Method,
}

impl ParsedRequest {
    /// parse and validate a JSON-RPC request.
    pub fn from_rpc_request(req: JsonRpcRequest) -> Result<Self> {
        req.validate()?;
        let method = Method::parse(&req.method)?;

        // neither method takes params
        match &req.params {
            serde_json::Value::Null => {}
            serde_json::Value::Array(a) if a.is_empty() => {}
            serde_json::Value::Object(o) if o.is_empty() => {}
            _ => {
                return Err(ServerError::InvalidParams(format!(
                    "{} takes no params",
                    req.method
                )))
            }
        }

        Ok(ParsedRequest { id: req.id, method })
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// error response from ServerError.
    pub fn from_error(id: serde_json::Value, err: ServerError) -> Self {
        Self::error(id, JsonRpcError::from_server_error(err))
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl JsonRpcError {
    pub fn from_server_error(err: ServerError) -> Self {
        Self {
            code: err.to_rpc_code(),
            message: err.to_rpc_message(),
            data: err.to_rpc_data(),
        }
    }
}

/// `runCycle` result when a cycle was already running.
#[derive(Debug, Serialize)]
pub struct SkippedResult {
    pub status: &'static str,
}

impl SkippedResult {
    pub fn new() -> Self {
        Self { status: "skipped" }
    }
}

impl Default for SkippedResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_validation() {
        let req = JsonRpcRequest::from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"runCycle"}"#)
            .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.params, serde_json::Value::Null);

        let req = JsonRpcRequest::from_slice(br#"{"jsonrpc":"1.0","id":1,"method":"runCycle"}"#)
            .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_parse_vs_invalid_request() {
        let err = JsonRpcRequest::from_slice(b"{nope").unwrap_err();
        assert_eq!(err.to_rpc_code(), -32700);

        let err = JsonRpcRequest::from_slice(b"[1,2]").unwrap_err();
        assert_eq!(err.to_rpc_code(), -32600);
    }

    #[test]
    fn test_methods() {
        let parsed = ParsedRequest::from_rpc_request(JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: json!("a"),
            method: "getStatus".into(),
            params: json!([]),
        })
        .unwrap();
        assert_eq!(parsed.method, Method::GetStatus);
        assert_eq!(parsed.id, json!("a"));

        let err = ParsedRequest::from_rpc_request(JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: json!(1),
            method: "sendTransaction".into(),
            params: json!(null),
        })
        .unwrap_err();
        assert_eq!(err.to_rpc_code(), -32601);

        let err = ParsedRequest::from_rpc_request(JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: json!(1),
            method: "runCycle".into(),
            params: json!({"force": true}),
        })
        .unwrap_err();
        assert_eq!(err.to_rpc_code(), -32602);
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(JsonRpcResponse::success(json!(1), json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {"a": 1}}));

        let err = serde_json::to_value(JsonRpcResponse::from_error(
            json!(null),
            ServerError::MethodNotFound("x".into()),
        ))
        .unwrap();
        assert_eq!(err["error"]["code"], -32601);
        assert_eq!(err["error"]["message"], "Method not found");
        assert!(err.get("result").is_none());
    }
}
