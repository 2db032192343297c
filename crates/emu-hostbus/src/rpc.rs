//! JSON-RPC 2.0 control server.
//!
//! Reads newline-delimited requests, writes one response line per request.
//! Every control-plane operation on [`Host`] is exposed as a method; the
//! dispatch thread keeps running between requests.

use std::io::{self, BufRead, Write};

use base64::Engine;
use cpld_link::Link;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::dump::format_dump;
use crate::host::Host;
use crate::models::{MemoryProfile, ModelId};
use crate::store::StoreKind;

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const FAILED: i32 = -32000;

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: JsonValue,
    id: JsonValue,
}

#[derive(Serialize)]
pub struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: JsonValue, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError { code, message }),
            id,
        }
    }
}

type Handled = Result<JsonValue, (i32, String)>;

fn invalid(message: impl Into<String>) -> (i32, String) {
    (INVALID_PARAMS, message.into())
}

fn failed(err: impl std::fmt::Display) -> (i32, String) {
    (FAILED, err.to_string())
}

/// Numbers may be JSON numbers or `0x` hex strings.
fn number(params: &JsonValue, key: &str) -> Result<Option<u64>, (i32, String)> {
    match params.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(format!("'{key}' must be unsigned"))),
        Some(JsonValue::String(s)) => {
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed
                .map(Some)
                .map_err(|_| invalid(format!("'{key}' is not a number: {s}")))
        }
        Some(other) => Err(invalid(format!("'{key}' is not a number: {other}"))),
    }
}

fn required<T: TryFrom<u64>>(params: &JsonValue, key: &str) -> Result<T, (i32, String)> {
    let value = number(params, key)?.ok_or_else(|| invalid(format!("Missing '{key}'")))?;
    T::try_from(value).map_err(|_| invalid(format!("'{key}' out of range: {value:#X}")))
}

fn string<'a>(params: &'a JsonValue, key: &str) -> Result<&'a str, (i32, String)> {
    params
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| invalid(format!("Missing '{key}'")))
}

fn model(params: &JsonValue) -> Result<ModelId, (i32, String)> {
    string(params, "model")?.parse().map_err(failed)
}

fn profile(params: &JsonValue) -> Result<Option<MemoryProfile>, (i32, String)> {
    match params.get("profile").and_then(JsonValue::as_str) {
        Some(name) => name.parse().map(Some).map_err(|e| invalid(format!("{e}"))),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct RpcServer<L: Link + 'static> {
    host: Host<L>,
}

impl<L: Link + 'static> RpcServer<L> {
    #[must_use]
    pub fn new(host: Host<L>) -> Self {
        Self { host }
    }

    #[must_use]
    pub fn host(&self) -> &Host<L> {
        &self.host
    }

    /// Serve stdin to stdout until EOF.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve(stdin.lock(), stdout.lock());
    }

    pub fn serve(&mut self, input: impl BufRead, mut output: impl Write) {
        for line in input.lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<RpcRequest>(line) {
                Err(e) => {
                    RpcResponse::error(JsonValue::Null, PARSE_ERROR, format!("Parse error: {e}"))
                }
                Ok(request) if request.jsonrpc != "2.0" => RpcResponse::error(
                    request.id,
                    INVALID_REQUEST,
                    "Invalid JSON-RPC version".to_string(),
                ),
                Ok(request) => self.dispatch(&request.method, &request.params, request.id),
            };

            let written = serde_json::to_string(&response)
                .map_err(io::Error::other)
                .and_then(|text| writeln!(output, "{text}"))
                .and_then(|()| output.flush());
            if let Err(e) = written {
                warn!("rpc output closed: {e}");
                break;
            }
        }
    }

    pub fn dispatch(&mut self, method: &str, params: &JsonValue, id: JsonValue) -> RpcResponse {
        debug!("rpc {method} {params}");
        let handled = match method {
            "state" => Ok(self.state()),
            "start" => {
                self.host.start();
                Ok(self.state())
            }
            "stop" => {
                self.host.stop();
                Ok(self.state())
            }
            "pause" => {
                self.host.pause();
                Ok(self.state())
            }
            "resume" => {
                self.host.resume();
                Ok(self.state())
            }
            "select_model" => self.handle_select_model(params),
            "deselect_model" => self.handle_deselect_model(params),
            "reset" => {
                self.host.reset_machine();
                Ok(self.state())
            }
            "set_profile" => self.handle_set_profile(params),
            "set_speed" => self.handle_set_speed(params),
            "set_lookahead" => self.handle_set_lookahead(params),
            "load_image" => self.handle_load_image(params),
            "set_pc" => self.handle_set_pc(params),
            "dump" => self.handle_dump(params),
            "sync_to_host" => self.handle_sync_to_host(params),
            "send_raw" => self.handle_send_raw(params),
            "loopback" => self.handle_loopback(params),
            "query" => self.handle_query(params),
            "events" => self.handle_events(),
            _ => Err((METHOD_NOT_FOUND, format!("Unknown method: {method}"))),
        };
        match handled {
            Ok(result) => RpcResponse::success(id, result),
            Err((code, message)) => RpcResponse::error(id, code, message),
        }
    }

    fn state(&self) -> JsonValue {
        json!({ "state": self.host.run_state() })
    }

    // === Handlers ===

    fn handle_select_model(&self, params: &JsonValue) -> Handled {
        let id = model(params)?;
        let profile = profile(params)?.unwrap_or_default();
        self.host.select_model(id, profile).map_err(failed)?;
        Ok(json!({ "model": id.to_string(), "profile": profile }))
    }

    fn handle_deselect_model(&self, params: &JsonValue) -> Handled {
        let id = model(params)?;
        self.host.deselect_model(id).map_err(failed)?;
        Ok(json!({ "status": "ok" }))
    }

    fn handle_set_profile(&self, params: &JsonValue) -> Handled {
        let profile = profile(params)?.ok_or_else(|| invalid("Missing 'profile'"))?;
        self.host.set_profile(profile);
        Ok(json!({ "profile": profile }))
    }

    fn handle_set_speed(&self, params: &JsonValue) -> Handled {
        let requested =
            number(params, "multiplier")?.ok_or_else(|| invalid("Missing 'multiplier'"))?;
        // Out-of-range values fall through to the governor's 1x fallback.
        let requested = u8::try_from(requested).unwrap_or(0);
        let multiplier = self.host.set_speed_multiplier(requested);
        Ok(json!({ "multiplier": multiplier }))
    }

    fn handle_set_lookahead(&self, params: &JsonValue) -> Handled {
        let enabled = params
            .get("enabled")
            .and_then(JsonValue::as_bool)
            .ok_or_else(|| invalid("Missing 'enabled'"))?;
        self.host.set_lookahead(enabled);
        Ok(json!({ "lookahead": enabled }))
    }

    fn handle_load_image(&self, params: &JsonValue) -> Handled {
        let kind = match params.get("kind") {
            Some(kind) => serde_json::from_value::<StoreKind>(kind.clone())
                .map_err(|e| invalid(format!("Invalid 'kind': {e}")))?,
            None => StoreKind::Rom,
        };
        let offset: u32 = number(params, "offset")?
            .map_or(Ok(0), u32::try_from)
            .map_err(|_| invalid("'offset' out of range"))?;

        let data = if let Some(b64) = params.get("data").and_then(JsonValue::as_str) {
            base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| invalid(format!("Invalid base64: {e}")))?
        } else if let Some(path) = params.get("path").and_then(JsonValue::as_str) {
            std::fs::read(path).map_err(|e| invalid(format!("Cannot read file: {e}")))?
        } else {
            return Err(invalid("Provide 'data' (base64) or 'path'"));
        };

        self.host.load_image(kind, offset, &data).map_err(failed)?;
        Ok(json!({ "kind": kind, "offset": offset, "bytes": data.len() }))
    }

    fn handle_set_pc(&self, params: &JsonValue) -> Handled {
        let pc: u16 = required(params, "pc")?;
        self.host.set_pc(pc).map_err(failed)?;
        Ok(json!({ "pc": format!("{pc:04X}") }))
    }

    fn handle_dump(&self, params: &JsonValue) -> Handled {
        let start: u16 = required(params, "start")?;
        let length: usize = number(params, "length")?
            .map_or(Ok(256), usize::try_from)
            .map_err(|_| invalid("'length' out of range"))?;
        let width: usize = number(params, "width")?
            .map_or(Ok(16), usize::try_from)
            .map_err(|_| invalid("'width' out of range"))?;
        let bytes = self.host.dump_range(start, length);
        Ok(json!({
            "start": start,
            "data": base64::engine::general_purpose::STANDARD.encode(&bytes),
            "text": format_dump(start, &bytes, width),
        }))
    }

    fn handle_sync_to_host(&self, params: &JsonValue) -> Handled {
        let start: u16 = required(params, "start")?;
        let end: u16 = required(params, "end")?;
        if end < start {
            return Err(invalid("'end' is before 'start'"));
        }
        let bytes = self.host.sync_to_host(start..=end);
        Ok(json!({ "bytes": bytes }))
    }

    fn handle_send_raw(&self, params: &JsonValue) -> Handled {
        let word: u32 = required(params, "word")?;
        let data = self.host.send_raw(word);
        Ok(json!({ "data": data }))
    }

    fn handle_loopback(&self, params: &JsonValue) -> Handled {
        let value: u8 = required(params, "value")?;
        self.host.loopback_test(value).map_err(failed)?;
        Ok(json!({ "status": "ok" }))
    }

    fn handle_query(&self, params: &JsonValue) -> Handled {
        let path = string(params, "path")?;
        let value = self
            .host
            .query(path)
            .ok_or_else(|| failed(format!("Unknown query path: {path}")))?;
        let value = serde_json::to_value(value).map_err(failed)?;
        Ok(json!({ "path": path, "value": value }))
    }

    fn handle_events(&self) -> Handled {
        let events = self.host.take_events();
        serde_json::to_value(events).map_err(failed)
    }
}
