//! Client lifecycle: the listening socket, the cancel scope and the
//! running flag, plus the accept loop feeding connections to the relay.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cdn::{build_cdn_configs, split_trimmed, DEFAULT_STUN_URLS, DEFAULT_UTLS_CLIENT_ID};
use crate::manager::TransportManager;
use crate::relay;
use crate::transport::TransportFactory;

/// Construction parameters. Everything except `listen` may be left empty to
/// take the built-in defaults; `front_domains` and `stun_urls` are
/// comma-separated lists.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub listen: String,
    pub broker_url: String,
    pub front_domains: String,
    pub amp_cache_url: String,
    pub stun_urls: String,
    pub utls_client_id: String,
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    cancel: Option<CancellationToken>,
    accept_task: Option<JoinHandle<()>>,
}

/// A relay client instance. Holds all state explicitly so multiple
/// instances can coexist in one process.
pub struct Client {
    listen_addr: String,
    manager: Arc<TransportManager>,
    state: Arc<Mutex<Lifecycle>>,
}

impl Client {
    pub fn new(config: ClientConfig, factory: Box<dyn TransportFactory>) -> Result<Self> {
        if config.listen.is_empty() {
            bail!("listen address is required");
        }
        let stun_urls = if config.stun_urls.is_empty() {
            DEFAULT_STUN_URLS.to_string()
        } else {
            config.stun_urls
        };
        let utls_client_id = if config.utls_client_id.is_empty() {
            DEFAULT_UTLS_CLIENT_ID.to_string()
        } else {
            config.utls_client_id
        };

        let configs = build_cdn_configs(
            &config.broker_url,
            &config.front_domains,
            &config.amp_cache_url,
        );
        let manager = TransportManager::new(
            configs,
            split_trimmed(&stun_urls),
            utls_client_id,
            factory,
        );

        Ok(Client {
            listen_addr: config.listen,
            manager: Arc::new(manager),
            state: Arc::new(Mutex::new(Lifecycle::default())),
        })
    }

    /// Binds the local SOCKS5 listener, brings up the first working CDN and
    /// starts accepting in a background task. Fails without side effects if
    /// the client is already running.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.running {
            bail!("client is already running");
        }

        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .context(format!("Failed to bind address {}", self.listen_addr))?;

        // All CDNs failing is fatal; the listener is rolled back by drop.
        self.manager.init()?;

        let cancel = CancellationToken::new();
        state.running = true;
        state.cancel = Some(cancel.clone());

        let manager = self.manager.clone();
        let state_handle = self.state.clone();
        let accept_task = tokio::spawn(async move {
            if let Err(e) = accept_loop(listener, manager, cancel.clone()).await {
                error!("Accept loop terminated: {:#}", e);
            }
            // A cancelled loop was shut down by stop(), which already
            // cleared the state; a later start() may own it again by now.
            if !cancel.is_cancelled() {
                let mut state = state_handle.lock().await;
                state.running = false;
                state.cancel = None;
            }
        });
        state.accept_task = Some(accept_task);

        info!("Service started on {}", self.listen_addr);
        Ok(())
    }

    /// Idempotent shutdown. Cancels the accept loop and waits for it to
    /// exit, so the listening socket is released before returning.
    /// In-flight relays are left to finish on their own socket errors.
    pub async fn stop(&self) {
        let (cancel, accept_task) = {
            let mut state = self.state.lock().await;
            state.running = false;
            (state.cancel.take(), state.accept_task.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        // Awaited outside the lock: the loop's unexpected-exit cleanup
        // takes the same lock.
        if let Some(accept_task) = accept_task {
            accept_task.await.ok();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

async fn accept_loop(
    listener: TcpListener,
    manager: Arc<TransportManager>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let stream = select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("Inbound connection from {}", addr);
                    stream
                }
                Err(e) if is_transient(&e) => {
                    warn!("Transient accept error: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = relay::handle(stream, manager).await {
                warn!("Relay error: {:#}", e);
            }
        });
    }
}
