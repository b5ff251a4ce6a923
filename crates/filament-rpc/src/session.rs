//! Session — the correlation layer instance owning one connection's state.
//!
//! A session matches asynchronous requests to replies: every outbound call
//! gets a reply address unique within the session, and each inbound reply
//! resolves exactly the pending call whose address it names, regardless of
//! arrival order. Inbound requests are dispatched against the session's
//! service registry on their own tasks, so calls in both directions overlap
//! freely.

use crate::error::RpcError;
use crate::registry::ServiceRegistry;

use dashmap::DashMap;
use filament_wire::message::REPLY_ADDRESS_PREFIX;
use filament_wire::{RpcRequestPayload, Transport, WireEvent, EVENT_RPC_REQUEST};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// One connection's correlation state. Owned by whichever endpoint created
/// it; destroyed when the transport disconnects.
pub struct Session {
    id: String,
    transport: Arc<dyn Transport>,
    registry: ServiceRegistry,
    /// Pending calls keyed by reply address. Each slot resolves exactly once.
    pending: DashMap<String, oneshot::Sender<Value>>,
    /// Monotonic per-session counter; only for correlation-id uniqueness.
    call_seq: AtomicU64,
    authenticated: AtomicBool,
    destroyed: AtomicBool,
}

impl Session {
    /// Create a session over a transport with its local service declarations.
    pub fn new(transport: Arc<dyn Transport>, registry: ServiceRegistry) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            transport,
            registry,
            pending: DashMap::new(),
            call_seq: AtomicU64::new(0),
            authenticated: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Session identity (not the peer's identity — just this connection).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session's service registry.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// The underlying transport (endpoints emit lifecycle events on it).
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether the handshake has completed on this session.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Mark the handshake complete: unlocks outbound calls and enables
    /// inbound dispatch.
    pub fn authenticate(&self) {
        self.authenticated.store(true, Ordering::SeqCst);
    }

    /// Tear the session down. All pending calls are abandoned — their
    /// completion slots are dropped and in-flight callers observe
    /// [`RpcError::SessionClosed`]. Outbound calls fail immediately again.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.authenticated.store(false, Ordering::SeqCst);
        let abandoned = self.pending.len();
        self.pending.clear();
        debug!(
            session = %self.id,
            abandoned,
            "Session destroyed"
        );
    }

    /// Allocate a reply address unique within this session. The time seed
    /// plus the counter avoids collision even for calls issued within the
    /// same tick.
    fn next_reply_address(&self) -> String {
        let seq = self.call_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!(
            "{}{}-{}",
            REPLY_ADDRESS_PREFIX,
            chrono::Utc::now().timestamp_millis(),
            seq
        )
    }

    /// Invoke a named function on the peer and await its result.
    ///
    /// Fails immediately with [`RpcError::BackendUnavailable`] before the
    /// handshake completes or after the session is destroyed — never queued.
    /// Otherwise suspends until the matching reply arrives; if the session
    /// is destroyed first the call fails with [`RpcError::SessionClosed`].
    /// The protocol defines no timeout; callers wanting one must apply it
    /// externally.
    pub async fn call(&self, function: &str, arguments: Vec<Value>) -> Result<Value, RpcError> {
        if self.destroyed.load(Ordering::SeqCst) || !self.is_authenticated() {
            return Err(RpcError::BackendUnavailable);
        }

        let reply_address = self.next_reply_address();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(reply_address.clone(), tx);

        let request = RpcRequestPayload {
            function: function.to_string(),
            arguments,
            reply_address: reply_address.clone(),
        };
        let event = WireEvent::rpc_request(&request).map_err(RpcError::Wire)?;
        if let Err(e) = self.transport.emit(event).await {
            self.pending.remove(&reply_address);
            return Err(RpcError::Wire(e));
        }

        rx.await.map_err(|_| RpcError::SessionClosed)
    }

    /// Feed one inbound correlation-layer event (a request or a reply) into
    /// the session. Endpoints route lifecycle events themselves and hand
    /// everything else here.
    ///
    /// Requests run on their own tasks, so inbound calls overlap freely. An
    /// unknown function or a failing implementation produces a log line and
    /// no reply — the remote caller's pending call is left to be abandoned.
    pub fn dispatch(&self, event: WireEvent) {
        if !self.is_authenticated() {
            warn!(
                session = %self.id,
                event = %event.event,
                "Dropping event on unauthenticated session"
            );
            return;
        }

        if event.event == EVENT_RPC_REQUEST {
            let request: RpcRequestPayload = match serde_json::from_value(event.payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!(session = %self.id, "Malformed rpc-request: {}", e);
                    return;
                }
            };

            let Some(service) = self.registry.get(&request.function) else {
                error!(
                    session = %self.id,
                    function = %request.function,
                    "RPC call does not exist"
                );
                debug!(available = ?self.registry.names(), "Available services");
                return;
            };

            debug!(session = %self.id, function = %request.function, "Dispatching request");

            let transport = Arc::clone(&self.transport);
            let session_id = self.id.clone();
            tokio::spawn(async move {
                match service.call(request.arguments).await {
                    Ok(result) => {
                        let reply = WireEvent::reply(&request.reply_address, result);
                        if let Err(e) = transport.emit(reply).await {
                            warn!(
                                session = %session_id,
                                function = %request.function,
                                "Could not send reply: {}",
                                e
                            );
                        }
                    }
                    Err(e) => {
                        error!(
                            session = %session_id,
                            function = %request.function,
                            "RPC implementation failed: {:#}",
                            e
                        );
                    }
                }
            });
            return;
        }

        // Anything else is a reply addressed to one pending call.
        match self.pending.remove(&event.event) {
            Some((_, slot)) => {
                // The caller may have gone away with its future; nothing
                // left to do then.
                let _ = slot.send(event.payload);
            }
            None => {
                debug!(
                    session = %self.id,
                    event = %event.event,
                    "Reply with no matching pending call"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_wire::memory_pair;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Two authenticated sessions wired back-to-back, each pumping its own
    /// end of the pair.
    fn linked_sessions(
        registry_a: ServiceRegistry,
        registry_b: ServiceRegistry,
    ) -> (Arc<Session>, Arc<Session>) {
        let (end_a, end_b) = memory_pair();
        let a = Session::new(Arc::new(end_a) as Arc<dyn Transport>, registry_a);
        let b = Session::new(Arc::new(end_b) as Arc<dyn Transport>, registry_b);
        a.authenticate();
        b.authenticate();
        spawn_pump(&a);
        spawn_pump(&b);
        (a, b)
    }

    fn spawn_pump(session: &Arc<Session>) {
        let session = Arc::clone(session);
        tokio::spawn(async move {
            while let Some(event) = session.transport().recv().await {
                session.dispatch(event);
            }
            session.destroy();
        });
    }

    #[tokio::test]
    async fn test_call_before_authentication_fails_immediately() {
        let (end_a, _end_b) = memory_pair();
        let session = Session::new(Arc::new(end_a) as Arc<dyn Transport>, ServiceRegistry::new());

        match session.call("anything", vec![]).await {
            Err(RpcError::BackendUnavailable) => {}
            other => panic!("Expected BackendUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_value_fidelity() {
        let registry = ServiceRegistry::new();
        registry.register_fn("identity", |mut args| async move {
            Ok(args.pop().unwrap_or(Value::Null))
        });
        let (a, _b) = linked_sessions(ServiceRegistry::new(), registry);

        let value = json!({
            "string": "simple value",
            "number": 42.5,
            "nested": {"complex": "value", "list": [1, 2, 3]}
        });
        let result = a.call("identity", vec![value.clone()]).await.unwrap();
        assert_eq!(result, value);
    }

    #[tokio::test]
    async fn test_correlation_ids_distinct_and_replies_match_out_of_order() {
        // Hand-drive the peer end so replies can be sent in reverse order.
        let (end_a, end_b) = memory_pair();
        let session = Session::new(Arc::new(end_a) as Arc<dyn Transport>, ServiceRegistry::new());
        session.authenticate();
        spawn_pump(&session);

        let n = 8;
        let mut calls = Vec::new();
        for i in 0..n {
            let session = Arc::clone(&session);
            calls.push(tokio::spawn(async move {
                session.call("echo", vec![json!(i)]).await
            }));
        }

        // Collect all requests, check address uniqueness, reply in reverse.
        let mut requests = Vec::new();
        for _ in 0..n {
            let event = end_b.recv().await.unwrap();
            assert_eq!(event.event, EVENT_RPC_REQUEST);
            let payload: RpcRequestPayload = serde_json::from_value(event.payload).unwrap();
            requests.push(payload);
        }
        let mut addresses: Vec<_> = requests.iter().map(|r| r.reply_address.clone()).collect();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), n, "reply addresses must be pairwise distinct");

        for request in requests.iter().rev() {
            let echoed = request.arguments[0].clone();
            end_b
                .emit(WireEvent::reply(&request.reply_address, echoed))
                .await
                .unwrap();
        }

        for (i, call) in calls.into_iter().enumerate() {
            let result = call.await.unwrap().unwrap();
            assert_eq!(result, json!(i), "call {i} resolved with the wrong reply");
        }
    }

    #[tokio::test]
    async fn test_missing_function_is_abandoned_not_fatal() {
        let registry = ServiceRegistry::new();
        registry.register_fn("works", |_| async move { Ok(json!("ok")) });
        let (a, _b) = linked_sessions(ServiceRegistry::new(), registry);

        // No reply arrives within a bounded window.
        let hung = timeout(Duration::from_millis(200), a.call("missing", vec![])).await;
        assert!(hung.is_err(), "missing function must produce no reply");

        // The dispatcher survived; a valid call still succeeds.
        let result = a.call("works", vec![]).await.unwrap();
        assert_eq!(result, json!("ok"));
    }

    #[tokio::test]
    async fn test_failing_implementation_is_caught_and_silent() {
        let registry = ServiceRegistry::new();
        registry.register_fn("explodes", |_| async move {
            Err(anyhow::anyhow!("implementation bug"))
        });
        registry.register_fn("works", |_| async move { Ok(json!("ok")) });
        let (a, _b) = linked_sessions(ServiceRegistry::new(), registry);

        let hung = timeout(Duration::from_millis(200), a.call("explodes", vec![])).await;
        assert!(hung.is_err(), "failing implementation must produce no reply");

        let result = a.call("works", vec![]).await.unwrap();
        assert_eq!(result, json!("ok"));
    }

    #[tokio::test]
    async fn test_disconnect_abandons_pending_calls() {
        let (end_a, end_b) = memory_pair();
        let session = Session::new(Arc::new(end_a) as Arc<dyn Transport>, ServiceRegistry::new());
        session.authenticate();
        spawn_pump(&session);

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call("never-answered", vec![]).await })
        };

        // Let the request reach the peer, then sever the connection.
        let _request = end_b.recv().await.unwrap();
        drop(end_b);

        match call.await.unwrap() {
            Err(RpcError::SessionClosed) => {}
            other => panic!("Expected SessionClosed, got {other:?}"),
        }

        // After destruction, new calls fail immediately and locally.
        match session.call("anything", vec![]).await {
            Err(RpcError::BackendUnavailable) => {}
            other => panic!("Expected BackendUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_inbound_dispatch_is_dropped() {
        let registry = ServiceRegistry::new();
        registry.register_fn("secret", |_| async move { Ok(json!("leaked")) });

        let (end_a, end_b) = memory_pair();
        let session = Session::new(Arc::new(end_a) as Arc<dyn Transport>, registry);
        // Deliberately not authenticated.
        spawn_pump(&session);

        end_b
            .emit(
                WireEvent::rpc_request(&RpcRequestPayload {
                    function: "secret".to_string(),
                    arguments: vec![],
                    reply_address: "rpc-reply-1-1".to_string(),
                })
                .unwrap(),
            )
            .await
            .unwrap();

        let reply = timeout(Duration::from_millis(200), end_b.recv()).await;
        assert!(reply.is_err(), "unauthenticated request must not be dispatched");
    }

    #[tokio::test]
    async fn test_unmatched_reply_is_ignored() {
        let (a, b) = linked_sessions(ServiceRegistry::new(), ServiceRegistry::new());

        b.transport()
            .emit(WireEvent::reply("rpc-reply-0-999", json!("stray")))
            .await
            .unwrap();

        // Session A keeps working afterwards.
        let registry = b.registry();
        registry.register_fn("late", |_| async move { Ok(json!("fine")) });
        let result = a.call("late", vec![]).await.unwrap();
        assert_eq!(result, json!("fine"));
    }

    #[tokio::test]
    async fn test_concurrent_inbound_requests_overlap() {
        // A slow call issued first must not block a fast one issued second.
        let registry = ServiceRegistry::new();
        registry.register_fn("slow", |_| async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(json!("slow"))
        });
        registry.register_fn("fast", |_| async move { Ok(json!("fast")) });
        let (a, _b) = linked_sessions(ServiceRegistry::new(), registry);

        let slow = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.call("slow", vec![]).await })
        };
        let fast = timeout(Duration::from_millis(100), a.call("fast", vec![]))
            .await
            .expect("fast call must not wait for the slow one")
            .unwrap();
        assert_eq!(fast, json!("fast"));
        assert_eq!(slow.await.unwrap().unwrap(), json!("slow"));
    }

    #[test]
    fn test_reply_addresses_carry_prefix() {
        let (end_a, _end_b) = memory_pair();
        let session = Session::new(
            Arc::new(end_a) as Arc<dyn Transport>,
            ServiceRegistry::new(),
        );
        let address = session.next_reply_address();
        assert!(address.starts_with(REPLY_ADDRESS_PREFIX));
    }
}
