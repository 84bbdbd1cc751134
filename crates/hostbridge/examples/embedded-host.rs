//! Embed the bridge in an application that owns its own event loop.
//!
//! The "application" here is a main thread running a message loop, the way a
//! desktop host pumps UI events. The bridge raises a signal by posting a
//! message; the loop answers each one by running one queued command.
//!
//! Run with:
//!   cargo run --example embedded-host

use std::sync::mpsc;
use std::thread;

use hostbridge::rpc::{parse_params, CommandError, HostSignal};
use hostbridge::{
    ClientConfig, CommandDispatcher, CommandRegistry, ConnectionManager, ExecutionBridge,
    RpcServer, ServerConfig,
};
use serde_json::{json, Value};

/// The application's model. Only the main thread ever touches it.
#[derive(Default)]
struct Document {
    title: String,
    revision: u32,
}

enum AppEvent {
    RunBridge,
    Quit,
}

struct PostMessage(mpsc::Sender<AppEvent>);

impl HostSignal for PostMessage {
    fn raise(&self) {
        let _ = self.0.send(AppEvent::RunBridge);
    }
}

fn rename(doc: &mut Document, params: Value) -> Result<Value, CommandError> {
    #[derive(serde::Deserialize)]
    struct Rename {
        title: String,
    }
    let Rename { title } = parse_params(params)?;
    doc.title = title;
    doc.revision += 1;
    Ok(json!({ "revision": doc.revision }))
}

fn describe(doc: &mut Document, _params: Value) -> Result<Value, CommandError> {
    Ok(json!({ "title": doc.title, "revision": doc.revision }))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (events, inbox) = mpsc::channel();
    let bridge = ExecutionBridge::new();
    bridge.initialize(PostMessage(events.clone()))?;

    let mut registry = CommandRegistry::new();
    registry.register("rename", rename).register("describe", describe);
    let dispatcher = CommandDispatcher::new(registry, bridge.clone());

    // Network side: server and a client on a tokio runtime in the background.
    let quit = events.clone();
    let network = thread::spawn(move || -> Result<(), hostbridge::RpcError> {
        let runtime = tokio::runtime::Runtime::new()?;
        let outcome = runtime.block_on(async {
            let config = ServerConfig::default().with_bind_addr("127.0.0.1:0");
            let server = RpcServer::bind(config, dispatcher).await?;
            let handle = server.handle();
            eprintln!("listening on {}", handle.local_addr());
            tokio::spawn(server.serve());

            let client =
                ConnectionManager::new(ClientConfig::with_addr(handle.local_addr().to_string()));
            let renamed = client.send_command("rename", json!({ "title": "Bracket" })).await?;
            eprintln!("rename -> {renamed}");
            let described = client.send_command("describe", json!({})).await?;
            eprintln!("describe -> {described}");

            match client.send_command("delete", json!({})).await {
                Err(err) => eprintln!("delete -> {err}"),
                Ok(value) => eprintln!("delete -> unexpected {value}"),
            }

            client.disconnect().await;
            handle.shutdown();
            Ok(())
        });
        let _ = quit.send(AppEvent::Quit);
        outcome
    });

    // Application main loop.
    let mut document = Document::default();
    while let Ok(event) = inbox.recv() {
        match event {
            AppEvent::RunBridge => {
                bridge.on_signal(&mut document);
            }
            AppEvent::Quit => break,
        }
    }
    bridge.close();

    network.join().map_err(|_| "network thread panicked")??;
    eprintln!("final title: {}", document.title);
    Ok(())
}
