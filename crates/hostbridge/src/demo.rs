//! Demonstration host for `hostbridge serve`: an in-memory parameter store
//! owned by the host thread, standing in for a real application's model.

use std::collections::BTreeMap;
use std::time::Duration;

use hostbridge_rpc::{parse_params, CommandError, CommandRegistry};
use serde::Deserialize;
use serde_json::{json, Value};

/// Longest `sleep` the demo host accepts.
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct ParameterStore {
    parameters: BTreeMap<String, Value>,
    commands_run: u64,
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Deserialize)]
struct SetParams {
    name: String,
    value: Value,
}

#[derive(Deserialize)]
struct SleepParams {
    ms: u64,
}

pub fn demo_registry() -> CommandRegistry<ParameterStore> {
    let mut registry = CommandRegistry::new();
    registry
        .register("ping", ping)
        .register("echo", echo)
        .register("get_parameter", get_parameter)
        .register("set_parameter", set_parameter)
        .register("list_parameters", list_parameters)
        .register("sleep", sleep);
    registry
}

fn ping(store: &mut ParameterStore, _params: Value) -> Result<Value, CommandError> {
    store.commands_run += 1;
    Ok(json!({
        "pong": true,
        "thread": std::thread::current().name(),
        "commands_run": store.commands_run,
    }))
}

fn echo(store: &mut ParameterStore, params: Value) -> Result<Value, CommandError> {
    store.commands_run += 1;
    Ok(params)
}

fn get_parameter(store: &mut ParameterStore, params: Value) -> Result<Value, CommandError> {
    store.commands_run += 1;
    let NameParams { name } = parse_params(params)?;
    store.parameters.get(&name).cloned().ok_or_else(|| {
        CommandError::domain_with_data(
            hostbridge_rpc::ErrorCode::NOT_FOUND,
            format!("parameter not found: {name}"),
            json!({ "name": name }),
        )
    })
}

fn set_parameter(store: &mut ParameterStore, params: Value) -> Result<Value, CommandError> {
    store.commands_run += 1;
    let SetParams { name, value } = parse_params(params)?;
    if name.trim().is_empty() {
        return Err(CommandError::invalid_params("parameter name must not be empty"));
    }
    let previous = store.parameters.insert(name.clone(), value);
    Ok(json!({ "name": name, "previous": previous }))
}

fn list_parameters(store: &mut ParameterStore, _params: Value) -> Result<Value, CommandError> {
    store.commands_run += 1;
    Ok(json!(store.parameters))
}

fn sleep(store: &mut ParameterStore, params: Value) -> Result<Value, CommandError> {
    store.commands_run += 1;
    let SleepParams { ms } = parse_params(params)?;
    let duration = Duration::from_millis(ms);
    if duration > MAX_SLEEP {
        return Err(CommandError::invalid_params(format!(
            "ms must be at most {}",
            MAX_SLEEP.as_millis()
        )));
    }
    std::thread::sleep(duration);
    Ok(json!({ "slept_ms": ms }))
}
