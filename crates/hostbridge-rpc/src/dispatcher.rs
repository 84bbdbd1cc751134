use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::bridge::ExecutionBridge;
use crate::error::BridgeError;
use crate::protocol::{ErrorObject, Request, RequestId, Response, JSONRPC_VERSION};
use crate::registry::CommandRegistry;

/// A request rejected before dispatch, with whatever id could be read.
#[derive(Debug)]
struct Rejected {
    id: Option<RequestId>,
    reason: String,
}

impl Rejected {
    fn new(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Turns a decoded request into a handler call on the host thread and a
/// normalized response.
///
/// Each request yields at most one response, always carrying the request's
/// id. Notifications run but yield none.
pub struct CommandDispatcher<C> {
    registry: Arc<CommandRegistry<C>>,
    bridge: ExecutionBridge<C>,
    #[cfg(feature = "schema")]
    schemas: Option<Arc<hostbridge_schema::SchemaRegistry>>,
}

impl<C: 'static> CommandDispatcher<C> {
    /// Create a dispatcher over `registry`, executing through `bridge`.
    pub fn new(registry: CommandRegistry<C>, bridge: ExecutionBridge<C>) -> Self {
        Self {
            registry: Arc::new(registry),
            bridge,
            #[cfg(feature = "schema")]
            schemas: None,
        }
    }

    /// Validate params against per-method JSON Schemas before dispatch.
    #[cfg(feature = "schema")]
    pub fn with_schema_registry(mut self, schemas: Arc<hostbridge_schema::SchemaRegistry>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry<C> {
        &self.registry
    }

    /// The execution bridge.
    pub fn bridge(&self) -> &ExecutionBridge<C> {
        &self.bridge
    }

    /// Dispatch one raw frame.
    ///
    /// Bytes that are not valid JSON produce a parse error with a null id.
    pub async fn dispatch_bytes(&self, payload: &[u8]) -> Option<Response> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => self.dispatch(value).await,
            Err(err) => {
                warn!(%err, "malformed JSON request");
                Some(Response::error(None, ErrorObject::parse_error("Invalid JSON")))
            }
        }
    }

    /// Dispatch one decoded JSON value.
    pub async fn dispatch(&self, value: Value) -> Option<Response> {
        let request = match parse_request(value) {
            Ok(request) => request,
            Err(rejected) => {
                warn!(id = ?rejected.id, reason = %rejected.reason, "invalid request");
                return Some(Response::error(
                    rejected.id,
                    ErrorObject::invalid_request(rejected.reason),
                ));
            }
        };

        let id = request.id.clone();
        let method = request.method.clone();
        let outcome = self.execute(request).await;

        match id {
            Some(id) => Some(match outcome {
                Ok(result) => Response::success(id, result),
                Err(error) => Response::error(Some(id), error),
            }),
            None => {
                if let Err(error) = outcome {
                    debug!(%method, code = error.code, "notification failed; no response sent");
                }
                None
            }
        }
    }

    async fn execute(&self, request: Request) -> Result<Value, ErrorObject> {
        let Request {
            method, params, id, ..
        } = request;

        let Some(handler) = self.registry.try_get_handler(&method) else {
            warn!(%method, "unknown method");
            return Err(ErrorObject::method_not_found(&method));
        };

        #[cfg(feature = "schema")]
        if let Some(schemas) = &self.schemas {
            if let Err(err) = schemas.validate(&method, &params) {
                debug!(%method, %err, "params rejected by schema");
                return Err(ErrorObject::invalid_params(err.to_string()));
            }
        }

        debug!(%method, id = ?id, "dispatching command");
        let started = Instant::now();
        let outcome = self
            .bridge
            .submit(move |host: &mut C| handler.execute(host, params))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                debug!(%method, elapsed_ms, "command succeeded");
                Ok(result)
            }
            Ok(Err(err)) => {
                let error = err.to_error_object();
                debug!(
                    %method,
                    elapsed_ms,
                    code = error.code,
                    message = %error.message,
                    "command failed"
                );
                Err(error)
            }
            Err(BridgeError::Panicked(message)) => {
                error!(%method, %message, "command panicked");
                Err(ErrorObject::internal_error(message))
            }
            Err(err) => {
                error!(%method, %err, "execution bridge rejected command");
                Err(ErrorObject::internal_error(err.to_string()))
            }
        }
    }
}

impl<C> std::fmt::Debug for CommandDispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("registry", &self.registry)
            .field("bridge", &self.bridge)
            .finish()
    }
}

/// Structural validation of a request object.
///
/// The id is read first so that later failures can still echo it.
fn parse_request(value: Value) -> Result<Request, Rejected> {
    let Value::Object(mut object) = value else {
        return Err(Rejected::new(None, "Invalid JSON-RPC request: expected an object"));
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(RequestId::Str(id)),
        Some(Value::Number(n)) => Some(RequestId::Num(n)),
        Some(_) => {
            return Err(Rejected::new(
                None,
                "Invalid JSON-RPC request: id must be a string or a number",
            ))
        }
    };

    match object.remove("jsonrpc") {
        None => {}
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(Rejected::new(
                id,
                format!("Invalid JSON-RPC request: unsupported jsonrpc version {other}"),
            ))
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        Some(Value::String(_)) => {
            return Err(Rejected::new(id, "Invalid JSON-RPC request: method is empty"))
        }
        Some(_) => {
            return Err(Rejected::new(
                id,
                "Invalid JSON-RPC request: method must be a string",
            ))
        }
        None => return Err(Rejected::new(id, "Invalid JSON-RPC request: missing method")),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(params @ Value::Object(_)) => params,
        Some(_) => {
            return Err(Rejected::new(
                id,
                "Invalid JSON-RPC request: params must be an object",
            ))
        }
    };

    Ok(Request {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method,
        params,
        id,
    })
}
