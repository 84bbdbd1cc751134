use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::bridge::{ExecutionBridge, HostSignal};
use crate::error::{BridgeError, Result, RpcError};

enum HostEvent {
    Signal,
    Stop,
}

struct ChannelSignal(mpsc::Sender<HostEvent>);

impl HostSignal for ChannelSignal {
    fn raise(&self) {
        if self.0.send(HostEvent::Signal).is_err() {
            debug!("host loop has exited; signal dropped");
        }
    }
}

/// A dedicated host thread driving an [`ExecutionBridge`].
///
/// For processes that own their privileged thread rather than borrowing
/// one from a host application. The thread builds the host context itself,
/// so the context never crosses threads and need not be `Send`. Each signal
/// runs one queued item, exactly as a host scheduler would.
///
/// Dropping the handle stops the loop, cancels queued work and joins.
pub struct HostThread {
    events: mpsc::Sender<HostEvent>,
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl HostThread {
    /// Spawn the host thread, build its context with `make_context`, and
    /// initialize `bridge` on it.
    ///
    /// Returns once the bridge is ready to accept submissions.
    pub fn spawn<C, F>(name: &str, bridge: ExecutionBridge<C>, make_context: F) -> Result<Self>
    where
        C: 'static,
        F: FnOnce() -> C + Send + 'static,
    {
        let (events, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), BridgeError>>();
        let signal = ChannelSignal(events.clone());
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut host = make_context();
                if let Err(err) = bridge.initialize(signal) {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                info!(thread = %thread_name, "host thread running");

                let mut executed = 0u64;
                while let Ok(event) = inbox.recv() {
                    match event {
                        HostEvent::Signal => {
                            if bridge.on_signal(&mut host) {
                                executed += 1;
                            }
                        }
                        HostEvent::Stop => break,
                    }
                }

                bridge.close();
                info!(thread = %thread_name, executed, "host thread stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                events,
                handle: Some(handle),
                name: name.to_string(),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(RpcError::Bridge(err))
            }
            Err(_) => {
                let _ = handle.join();
                Err(RpcError::Bridge(BridgeError::NotInitialized))
            }
        }
    }

    /// Thread name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the loop and wait for the thread to exit.
    ///
    /// Signals already delivered are processed first; anything still queued
    /// after that is cancelled.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.events.send(HostEvent::Stop);
        if handle.join().is_err() {
            warn!(thread = %self.name, "host thread panicked");
        }
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for HostThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostThread")
            .field("name", &self.name)
            .field("running", &self.handle.is_some())
            .finish()
    }
}
