use std::time::Instant;

use hostbridge_rpc::{ClientConfig, ConnectionManager};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{parse_duration, runtime, CallArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_result, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let params = parse_params(&args.params)?;
    let config = ClientConfig::with_addr(format!("{}:{}", args.host, args.port))
        .connect_timeout(parse_duration(&args.connect_timeout)?)
        .request_timeout(parse_duration(&args.timeout)?);

    let runtime = runtime()?;
    runtime.block_on(async move {
        let manager = ConnectionManager::new(config);
        let started = Instant::now();

        if args.notify {
            let client = manager
                .get_connection()
                .await
                .map_err(|err| rpc_error("connect failed", err))?;
            client
                .notify(&args.method, params)
                .await
                .map_err(|err| rpc_error("notify failed", err))?;
            manager.disconnect().await;
            return Ok(SUCCESS);
        }

        let outcome = manager.send_command(&args.method, params).await;
        manager.disconnect().await;
        let result = outcome.map_err(|err| rpc_error("call failed", err))?;

        debug!(
            method = %args.method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "call completed"
        );
        print_result(&args.method, &result, started.elapsed(), format);
        Ok(SUCCESS)
    })
}

fn parse_params(input: &str) -> CliResult<Value> {
    let params: Value = serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("--params is not valid JSON: {err}")))?;
    if !params.is_object() {
        return Err(CliError::new(USAGE, "--params must be a JSON object"));
    }
    Ok(params)
}
