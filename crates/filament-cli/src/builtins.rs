//! Built-in handler catalog shipped with the daemon.
//!
//! Descriptors can only reference implementations the process compiled in;
//! these are the ones every filament install carries. Embedders that link
//! `filament-server` directly register their own instead.

use filament_backend::HandlerCatalog;
use serde_json::{json, Value};

/// Assemble the daemon's catalog.
pub fn builtin_catalog() -> HandlerCatalog {
    let catalog = HandlerCatalog::new();

    // Host process introspection.
    catalog.register_fn("host_info_impl", |cx, _args| async move {
        Ok(json!({
            "pid": cx.host().pid(),
            "startedAt": cx.host().started_at().to_rfc3339(),
        }))
    });

    // Returns its first argument; handy for extension-side smoke tests.
    catalog.register_fn("echo_impl", |_cx, mut args| async move {
        Ok(if args.is_empty() {
            Value::Null
        } else {
            args.remove(0)
        })
    });

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_backend::{BackendDescriptor, Installer, StaticResolver};
    use filament_rpc::{Service, ServiceRegistry, Session};
    use filament_wire::{memory_pair, Transport};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_builtins_activate_and_answer() {
        let installer = Arc::new(Installer::new(
            Arc::new(builtin_catalog()),
            Arc::new(StaticResolver::new()),
        ));

        let (end, _other) = memory_pair();
        let session = Session::new(Arc::new(end) as Arc<dyn Transport>, ServiceRegistry::new());
        session.authenticate();

        let text = BackendDescriptor::new()
            .rpc("hostInfo", "host_info_impl")
            .rpc("echo", "echo_impl")
            .to_install_text()
            .unwrap();
        installer.activate(&text, &session).await.unwrap();

        let info = session
            .registry()
            .get("hostInfo")
            .unwrap()
            .call(vec![])
            .await
            .unwrap();
        assert_eq!(info["pid"], json!(std::process::id()));

        let echoed = session
            .registry()
            .get("echo")
            .unwrap()
            .call(vec![json!({"round": "trip"})])
            .await
            .unwrap();
        assert_eq!(echoed, json!({"round": "trip"}));
    }
}
