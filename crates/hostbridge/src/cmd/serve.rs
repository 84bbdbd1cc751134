use std::path::Path;
use std::sync::Arc;

use hostbridge_rpc::{CommandDispatcher, ExecutionBridge, HostThread, RpcServer, ServerConfig};
use hostbridge_schema::{RegistryConfig, SchemaRegistry};
use tracing::{error, info};

use crate::cmd::{runtime, ServeArgs};
use crate::demo::{demo_registry, ParameterStore};
use crate::exit::{rpc_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_listening, OutputFormat};

const HOST_THREAD_NAME: &str = "hostbridge-host";

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = ServerConfig::default().with_bind_addr(format!("{}:{}", args.host, args.port));
    if let Some(max) = args.max_connections {
        if max == 0 {
            return Err(CliError::new(USAGE, "--max-connections must be greater than zero"));
        }
        config = config.with_max_connections(max);
    }

    let bridge = ExecutionBridge::new();
    let mut dispatcher = CommandDispatcher::new(demo_registry(), bridge.clone());
    if let Some(dir) = &args.schemas {
        let schemas = load_schemas(dir)?;
        info!(dir = %dir.display(), methods = schemas.methods().len(), "loaded params schemas");
        dispatcher = dispatcher.with_schema_registry(Arc::new(schemas));
    }

    let host = HostThread::spawn(HOST_THREAD_NAME, bridge, ParameterStore::default)
        .map_err(|err| rpc_error("host thread failed to start", err))?;

    let runtime = runtime()?;
    let result = runtime.block_on(async move {
        let server = RpcServer::bind(config, dispatcher)
            .await
            .map_err(|err| rpc_error("bind failed", err))?;
        let handle = server.handle();
        print_listening(handle.local_addr(), format);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received; shutting down");
                    handle.shutdown();
                }
                Err(err) => error!(%err, "failed to listen for interrupt"),
            }
        });

        server
            .serve()
            .await
            .map_err(|err| rpc_error("server failed", err))
    });

    host.stop();
    result.map(|()| SUCCESS)
}

fn load_schemas(dir: &Path) -> CliResult<SchemaRegistry> {
    SchemaRegistry::from_directory_with_config(dir, RegistryConfig::strict())
        .map_err(|err| CliError::new(DATA_INVALID, format!("schema load failed: {err}")))
}
