use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, RpcError};
use crate::protocol::{RequestId, Response};

/// Outcome delivered to a waiting caller.
pub type CallResult = Result<Value>;

struct PendingCall {
    method: String,
    submitted_at: Instant,
    completion: oneshot::Sender<CallResult>,
}

/// In-flight calls keyed by request id.
///
/// The reader task, the caller's timeout and disconnect handling all race to
/// complete the same call. Every path removes the entry under the lock before
/// completing it, so each id resolves exactly once.
#[derive(Clone, Default)]
pub struct PendingRequestTable {
    calls: Arc<Mutex<HashMap<RequestId, PendingCall>>>,
}

impl PendingRequestTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and return the receiver its outcome arrives on.
    ///
    /// Fails with [`RpcError::DuplicateId`] if `id` is already in flight.
    pub fn register(
        &self,
        id: RequestId,
        method: impl Into<String>,
    ) -> Result<oneshot::Receiver<CallResult>> {
        let mut calls = self.lock();
        if calls.contains_key(&id) {
            return Err(RpcError::DuplicateId(id));
        }
        let (completion, receiver) = oneshot::channel();
        calls.insert(
            id,
            PendingCall {
                method: method.into(),
                submitted_at: Instant::now(),
                completion,
            },
        );
        Ok(receiver)
    }

    /// Complete the call matching `response.id`.
    ///
    /// Returns `false` for responses with no pending call (unknown id, or a
    /// call that already timed out); those are dropped.
    pub fn resolve(&self, response: Response) -> bool {
        let Some(id) = response.id.clone() else {
            warn!("response without id dropped");
            return false;
        };
        let Some(call) = self.lock().remove(&id) else {
            debug!(%id, "response for unknown or expired request dropped");
            return false;
        };
        debug!(
            %id,
            method = %call.method,
            elapsed_ms = call.submitted_at.elapsed().as_millis() as u64,
            "response received"
        );
        let outcome = response.into_result().map_err(RpcError::from);
        // The caller may have stopped waiting; nothing to do then.
        let _ = call.completion.send(outcome);
        true
    }

    /// Remove a call whose caller gave up waiting.
    ///
    /// Returns `false` if the call was already resolved.
    pub fn expire(&self, id: &RequestId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Fail every pending call, e.g. after the connection dropped.
    /// Returns the number of calls failed.
    pub fn fail_all(&self, error: impl Fn() -> RpcError) -> usize {
        let drained: Vec<PendingCall> = self.lock().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            let _ = call.completion.send(Err(error()));
        }
        count
    }

    /// Number of calls in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PendingRequestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequestTable")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::protocol::ErrorObject;

    #[tokio::test]
    async fn resolve_delivers_result() {
        let table = PendingRequestTable::new();
        let rx = table.register("1".into(), "echo").unwrap();
        assert_eq!(table.len(), 1);

        assert!(table.resolve(Response::success("1".into(), json!({"x": 1}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"x": 1}));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn resolve_error_carries_code_and_data() {
        let table = PendingRequestTable::new();
        let rx = table.register(RequestId::from(7_i64), "get_parameter").unwrap();
        let error = ErrorObject::with_data(-32001, "not found", json!({"name": "W"}));
        table.resolve(Response::error(Some(RequestId::from(7_i64)), error));

        match rx.await.unwrap() {
            Err(RpcError::Remote { code, message, data }) => {
                assert_eq!(code, -32001);
                assert_eq!(message, "not found");
                assert_eq!(data, Some(json!({"name": "W"})));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_id_is_refused() {
        let table = PendingRequestTable::new();
        let _rx = table.register("a".into(), "echo").unwrap();
        assert!(matches!(
            table.register("a".into(), "echo"),
            Err(RpcError::DuplicateId(RequestId::Str(id))) if id == "a"
        ));
    }

    #[test]
    fn unknown_and_idless_responses_are_dropped() {
        let table = PendingRequestTable::new();
        assert!(!table.resolve(Response::success("ghost".into(), json!(1))));
        assert!(!table.resolve(Response::error(None, ErrorObject::parse_error("bad"))));
    }

    #[test]
    fn expired_call_ignores_late_response() {
        let table = PendingRequestTable::new();
        let _rx = table.register("slow".into(), "sleep").unwrap();
        assert!(table.expire(&"slow".into()));
        assert!(!table.expire(&"slow".into()));
        assert!(!table.resolve(Response::success("slow".into(), json!(null))));
    }

    #[test]
    fn resolve_and_expire_race_exactly_once() {
        for round in 0..200 {
            let table = PendingRequestTable::new();
            let id = RequestId::from(round as i64);
            let mut rx = table.register(id.clone(), "race").unwrap();

            let resolver = {
                let table = table.clone();
                let id = id.clone();
                thread::spawn(move || table.resolve(Response::success(id, json!(round))))
            };
            let expirer = {
                let table = table.clone();
                thread::spawn(move || table.expire(&id))
            };

            let resolved = resolver.join().unwrap();
            let expired = expirer.join().unwrap();
            assert!(resolved ^ expired, "exactly one path must win");
            assert_eq!(rx.try_recv().is_ok(), resolved);
        }
    }

    #[tokio::test]
    async fn fail_all_rejects_everything() {
        let table = PendingRequestTable::new();
        let a = table.register("a".into(), "echo").unwrap();
        let b = table.register("b".into(), "echo").unwrap();

        let failed = table.fail_all(|| RpcError::Disconnected("connection reset".into()));
        assert_eq!(failed, 2);
        assert!(table.is_empty());
        for rx in [a, b] {
            assert!(matches!(rx.await.unwrap(), Err(RpcError::Disconnected(_))));
        }
    }
}
