//! Shared fixtures for unit tests: a small host context with a few commands.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};

use crate::bridge::ExecutionBridge;
use crate::command::{parse_params, CommandError};
use crate::dispatcher::CommandDispatcher;
use crate::host::HostThread;
use crate::protocol::ErrorCode;
use crate::registry::CommandRegistry;

/// Host context standing in for a document model.
#[derive(Debug, Default)]
pub(crate) struct TestHost {
    pub parameters: BTreeMap<String, Value>,
    pub calls: Vec<String>,
}

#[derive(serde::Deserialize)]
struct NameParams {
    name: String,
}

pub(crate) fn test_registry() -> CommandRegistry<TestHost> {
    let mut registry = CommandRegistry::new();
    registry
        .register("echo", |host: &mut TestHost, params: Value| -> Result<Value, CommandError> {
            host.calls.push("echo".into());
            Ok(params)
        })
        .register("get_parameter", get_parameter)
        .register("set_parameter", |host: &mut TestHost, params: Value| -> CommandResult {
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| CommandError::invalid_params("missing name"))?
                .to_string();
            let value = params.get("value").cloned().unwrap_or(Value::Null);
            host.calls.push(format!("set_parameter:{name}"));
            host.parameters.insert(name, value);
            Ok(json!({"ok": true}))
        })
        .register("fail", |_: &mut TestHost, _: Value| -> Result<Value, CommandError> {
            let inner = std::io::Error::other("transaction rolled back");
            Err(CommandError::failed(WrappedError(inner)))
        })
        .register("panic", |_: &mut TestHost, _: Value| -> Result<Value, CommandError> {
            panic!("host API misuse")
        })
        .register("sleep", |host: &mut TestHost, params: Value| -> Result<Value, CommandError> {
            let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
            std::thread::sleep(Duration::from_millis(ms));
            host.calls.push(format!("sleep:{ms}"));
            Ok(json!({"slept_ms": ms}))
        })
        .register("calls", |host: &mut TestHost, _: Value| -> Result<Value, CommandError> {
            Ok(json!(host.calls))
        });
    registry
}

type CommandResult = Result<Value, CommandError>;

fn get_parameter(host: &mut TestHost, params: Value) -> CommandResult {
    let NameParams { name } = parse_params(params)?;
    host.calls.push(format!("get_parameter:{name}"));
    host.parameters
        .get(&name)
        .cloned()
        .ok_or_else(|| CommandError::domain(ErrorCode::NOT_FOUND, "not found"))
}

#[derive(Debug, thiserror::Error)]
#[error("command failed")]
struct WrappedError(#[source] std::io::Error);

/// Spawn a host thread and build a dispatcher over the test registry.
pub(crate) fn spawn_test_host() -> (HostThread, CommandDispatcher<TestHost>) {
    let bridge = ExecutionBridge::new();
    let host = HostThread::spawn("test-host", bridge.clone(), TestHost::default)
        .expect("host thread should start");
    (host, CommandDispatcher::new(test_registry(), bridge))
}
