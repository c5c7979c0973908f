//! Node server: publish the onion service and serve both APIs.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use pub_core::onion_client::TorHttpClient;
use pub_core::{SelfIdentity, Store, SubscriptionService};
use pub_crypto::rng::SharedRandom;

use crate::api::{private_router, public_router, ApiState};
use crate::config::NodeConfig;
use crate::tor::TorController;

pub struct NodeServer {
    config: NodeConfig,
    service: Arc<SubscriptionService>,
    shutdown_tx: watch::Sender<bool>,
}

impl NodeServer {
    /// Load the self identity from `store` and wire the Tor HTTP client in.
    pub async fn new(config: NodeConfig, store: Arc<dyn Store>, rng: SharedRandom) -> Result<Self> {
        config.validate()?;

        let identity: SelfIdentity = store
            .get_self()
            .await
            .context("no identity in database, run `pub-node create` first")?;

        let client = Arc::new(TorHttpClient::new(
            &config.socks_host,
            config.socks_port,
            config.request_timeout(),
        )?);
        let service = Arc::new(SubscriptionService::new(
            identity,
            store,
            client.clone(),
            client,
            rng,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            service,
            shutdown_tx,
        })
    }

    /// Run until Ctrl-C, SIGTERM or [`NodeServer::shutdown`].
    pub async fn start(&self) -> Result<()> {
        let state = ApiState {
            service: self.service.clone(),
        };

        let public_listener = TcpListener::bind(self.config.public_addr).await?;
        let public_local = public_listener.local_addr()?;
        let private_listener = TcpListener::bind(self.config.private_addr).await?;
        let private_local = private_listener.local_addr()?;

        // Held until shutdown; Tor drops the onion with the connection.
        let _controller = self.publish_onion(public_local).await?;

        info!("public API listening on {}", public_local);
        info!("private API listening on http://{}", private_local);

        let public_app = public_router(state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
        let private_app = private_router(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        let public = axum::serve(public_listener, public_app)
            .with_graceful_shutdown(Self::shutdown_signal(self.shutdown_tx.subscribe()))
            .into_future();
        let private = axum::serve(private_listener, private_app)
            .with_graceful_shutdown(Self::shutdown_signal(self.shutdown_tx.subscribe()))
            .into_future();

        let (public, private) = tokio::join!(public, private);
        public?;
        private?;
        Ok(())
    }

    async fn publish_onion(&self, local: SocketAddr) -> Result<TorController<tokio::net::TcpStream>> {
        let identity = self.service.identity();
        let mut controller = TorController::connect_authenticated(
            &self.config.control_host,
            self.config.control_port,
            &self.config.control_password,
        )
        .await?;

        let key_blob = identity.onion_key_for_transport()?;
        let service_id = controller
            .add_onion(
                identity.scheme().as_str(),
                &key_blob,
                self.config.virtual_port,
                local.port(),
            )
            .await?;

        if service_id != identity.onion() {
            error!(
                expected = %identity.onion(),
                got = %service_id,
                "tor published a different onion address"
            );
            bail!("onion address mismatch: expected {}, tor reported {}", identity.onion(), service_id);
        }

        info!("serving {}.onion", service_id);
        Ok(controller)
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
