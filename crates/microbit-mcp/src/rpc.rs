//! Newline-delimited JSON-RPC 2.0 over a byte stream.
//!
//! One request per line in, one response per line out. `tools/call`
//! requests run on their own tasks so a long button wait never holds up a
//! temperature query; their replies are written as they complete and may
//! therefore arrive out of request order.

use std::future::Future;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ToolError, ToolResult};
use crate::handler::ToolHandler;
use crate::tools::{tool_catalog, ToolReply};

/// Protocol revision reported when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "microbit-server";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// The server failed while handling the request.
pub const INTERNAL_ERROR: i64 = -32603;

/// What to do with one inbound message.
#[derive(Debug)]
pub enum Action {
    /// Write this response now.
    Respond(Value),
    /// Run a tool and respond to `id` when it finishes.
    CallTool {
        /// Request id.
        id: Value,
        /// Tool name.
        name: String,
        /// Tool arguments.
        arguments: Value,
    },
    /// A notification; nothing to send.
    Ignore,
}

/// Build a success response.
pub fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Build an error response.
pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}

/// Decide how to answer one line of input.
pub fn classify(line: &str) -> Action {
    let message: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "invalid JSON on input");
            return Action::Respond(failure(Value::Null, PARSE_ERROR, format!("Parse error: {e}")));
        }
    };

    let id = message.get("id").cloned();
    let Some(method) = message.get("method").and_then(Value::as_str) else {
        return match id {
            Some(id) => Action::Respond(failure(id, INVALID_REQUEST, "Invalid request: missing method")),
            None => Action::Ignore,
        };
    };

    // Notifications never get a response.
    let Some(id) = id else {
        debug!(method, "notification");
        return Action::Ignore;
    };

    let params = message.get("params").cloned().unwrap_or(Value::Null);

    match method {
        "initialize" => {
            let version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            Action::Respond(success(
                id,
                json!({
                    "protocolVersion": version,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ))
        }
        "ping" => Action::Respond(success(id, json!({}))),
        "tools/list" => Action::Respond(success(id, json!({ "tools": tool_catalog() }))),
        "tools/call" => match params.get("name").and_then(Value::as_str) {
            Some(name) => Action::CallTool {
                id,
                name: name.to_string(),
                arguments: params.get("arguments").cloned().unwrap_or(Value::Null),
            },
            None => Action::Respond(failure(id, INVALID_PARAMS, "Invalid params: missing tool name")),
        },
        other => Action::Respond(failure(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

/// Run a tool and build its JSON-RPC response.
pub async fn call_tool(handler: &ToolHandler, id: Value, name: &str, arguments: Value) -> Value {
    match handler.call(name, arguments).await {
        Ok(reply) => success(id, reply_value(&reply)),
        Err(e @ (ToolError::UnknownTool(_) | ToolError::InvalidArguments(_))) => {
            failure(id, INVALID_PARAMS, e.to_string())
        }
        Err(e) => {
            warn!(tool = name, error = %e, "tool failed");
            success(id, reply_value(&ToolReply::error(format!("Error: {e}"))))
        }
    }
}

/// Run a tool call on its own task so a panic still answers `id`.
async fn guarded_call<F>(id: Value, call: F) -> Value
where
    F: Future<Output = Value> + Send + 'static,
{
    match tokio::spawn(call).await {
        Ok(response) => response,
        Err(e) => {
            warn!(id = %id, error = %e, "tool task failed");
            failure(id, INTERNAL_ERROR, format!("Internal error: {e}"))
        }
    }
}

fn reap(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!(error = %e, "tool call task ended abnormally");
    }
}

fn reply_value(reply: &ToolReply) -> Value {
    serde_json::to_value(reply).unwrap_or_else(|e| json!({
        "content": [{ "type": "text", "text": format!("Error: {e}") }],
        "isError": true
    }))
}

/// Serve requests from `input` until it ends, writing responses to `output`.
///
/// In-flight tool calls are allowed to finish before returning.
pub async fn serve<R, W>(handler: ToolHandler, input: R, output: W) -> ToolResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(message) = rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut calls = JoinSet::new();
    let mut lines = BufReader::new(input).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match classify(&line) {
            Action::Respond(response) => {
                if tx.send(response).is_err() {
                    break;
                }
            }
            Action::CallTool {
                id,
                name,
                arguments,
            } => {
                let handler = handler.clone();
                let tx = tx.clone();
                let call_id = id.clone();
                calls.spawn(async move {
                    let call = async move { call_tool(&handler, call_id, &name, arguments).await };
                    let response = guarded_call(id, call).await;
                    // The writer only goes away if output failed.
                    let _ = tx.send(response);
                });
            }
            Action::Ignore => {}
        }

        // Reap finished calls so the set does not grow without bound.
        while let Some(result) = calls.try_join_next() {
            reap(result);
        }
    }

    info!(in_flight = calls.len(), "input closed");
    while let Some(result) = calls.join_next().await {
        reap(result);
    }
    drop(tx);

    match writer.await {
        Ok(result) => result.map_err(ToolError::from),
        Err(e) => Err(ToolError::Io(std::io::Error::other(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respond(line: &str) -> Value {
        match classify(line) {
            Action::Respond(v) => v,
            other => panic!("expected a response, got {:?}", other),
        }
    }

    #[test]
    fn test_initialize_echoes_protocol_version() {
        let v = respond(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#);
        assert_eq!(v["id"], 1);
        assert_eq!(v["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(v["result"]["serverInfo"]["name"], SERVER_NAME);

        let v = respond(r#"{"jsonrpc":"2.0","id":2,"method":"initialize"}"#);
        assert_eq!(v["result"]["protocolVersion"], DEFAULT_PROTOCOL_VERSION);
    }

    #[test]
    fn test_tools_list() {
        let v = respond(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#);
        let tools = v["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 5);
        assert!(tools.iter().all(|t| t.get("inputSchema").is_some()));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(respond("{not json")["error"]["code"], PARSE_ERROR);
        assert_eq!(
            respond(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)["error"]["code"],
            METHOD_NOT_FOUND
        );
        assert_eq!(
            respond(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{}}"#)["error"]["code"],
            INVALID_PARAMS
        );
        assert_eq!(respond(r#"{"jsonrpc":"2.0","id":5}"#)["error"]["code"], INVALID_REQUEST);
    }

    #[test]
    fn test_notifications_are_ignored() {
        assert!(matches!(
            classify(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
            Action::Ignore
        ));
        assert!(matches!(
            classify(r#"{"jsonrpc":"2.0","method":"something/unknown"}"#),
            Action::Ignore
        ));
    }

    #[tokio::test]
    async fn test_panicking_tool_still_answers() {
        let response = guarded_call(json!(12), async { Vec::<Value>::new()[0].clone() }).await;
        assert_eq!(response["id"], 12);
        assert_eq!(response["error"]["code"], INTERNAL_ERROR);

        let response = guarded_call(json!(13), async { success(json!(13), json!({})) }).await;
        assert_eq!(response, success(json!(13), json!({})));
    }

    #[test]
    fn test_tools_call_is_deferred() {
        match classify(r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"get_temperature"}}"#) {
            Action::CallTool { id, name, arguments } => {
                assert_eq!(id, 7);
                assert_eq!(name, "get_temperature");
                assert!(arguments.is_null());
            }
            other => panic!("expected a tool call, got {:?}", other),
        }
    }
}
