//! Binding the API to a socket

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use sonos_dashboard::SonosService;

use crate::routes;

/// Bind the API on `addr` and return the bound address with the server future
///
/// The server drains in-flight requests and exits once `shutdown` resolves.
pub fn bind(
    service: Arc<SonosService>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()> + Send), warp::Error> {
    warp::serve(routes::api(service)).try_bind_with_graceful_shutdown(addr, shutdown)
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_client::NoRecovery;
    use sonos_dashboard::DashboardConfig;
    use tokio::sync::oneshot;

    struct EmptyProvider;

    impl provider_client::SnapshotSource for EmptyProvider {
        fn zones(&self) -> Result<Vec<provider_client::ZoneDescriptor>, provider_client::ClientError> {
            Ok(Vec::new())
        }
    }

    impl provider_client::CommandSink for EmptyProvider {
        fn send(
            &self,
            _target: &str,
            _action: &provider_client::Action,
        ) -> Result<provider_client::CommandResponse, provider_client::ClientError> {
            Err(provider_client::ClientError::Parse("unused".to_string()))
        }

        fn device_state(&self, _target: &str) -> Result<provider_client::StateBlock, provider_client::ClientError> {
            Err(provider_client::ClientError::Parse("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port_and_shut_down() {
        let service = Arc::new(
            SonosService::with_parts(
                DashboardConfig::immediate(),
                Arc::new(EmptyProvider),
                Arc::new(EmptyProvider),
                Arc::new(NoRecovery),
            )
            .unwrap(),
        );

        let (tx, rx) = oneshot::channel::<()>();
        let (addr, server) = bind(service, ([127, 0, 0, 1], 0).into(), async {
            let _ = rx.await;
        })
        .unwrap();
        assert_ne!(addr.port(), 0);

        let handle = tokio::spawn(server);
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
