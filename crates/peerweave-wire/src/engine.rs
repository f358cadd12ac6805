//! Engine: the TCP accept loop for a peerweave node.
//!
//! An [`Engine`] owns a bound listener and handles each inbound connection
//! in its own task: handshake, one request frame, at most one reply. The
//! number of connections in flight is capped by a semaphore, and every read
//! and write carries the configured deadline.

use crate::auth::{self, Credentials};
use crate::dispatch::{self, Inbound};
use crate::error::WireError;
use crate::message::{read_message_timeout, write_message_timeout, WireMessage, WireMessageKind};
use peerweave_memory::PeerStateStore;
use peerweave_types::config::NodeConfig;
use peerweave_types::connection::{ErrorBody, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Bind the node's listening socket.
pub async fn start_listener(addr: &str) -> Result<TcpListener, WireError> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}

/// The local protocol endpoint.
pub struct Engine {
    identity: String,
    credentials: Credentials,
    state: PeerStateStore,
    local_addr: SocketAddr,
    io_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl Engine {
    /// Bind `config.listen_addr` and start serving.
    pub async fn start(
        config: NodeConfig,
        state: PeerStateStore,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let listener = start_listener(&config.listen_addr).await?;
        Self::serve(config, state, listener).await
    }

    /// Start serving on an already bound listener.
    ///
    /// Fails if no shared secret is configured or the local peer has not been
    /// initialized under `config.identity`.
    pub async fn serve(
        config: NodeConfig,
        state: PeerStateStore,
        listener: TcpListener,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        if config.shared_secret.is_empty() {
            return Err(WireError::HandshakeFailed(
                "peerweave requires shared_secret. Set shared_secret in config.toml".into(),
            ));
        }
        let local = state.load(&config.identity).await?;
        let local_addr = listener.local_addr()?;

        info!(
            listen = %local_addr,
            identity = %config.identity,
            address = %local.address,
            max_connections = config.max_connections,
            "Engine listening"
        );

        let engine = Arc::new(Self {
            credentials: Credentials {
                identity: config.identity.clone(),
                address: local.address,
                shared_secret: config.shared_secret,
            },
            identity: config.identity,
            state,
            local_addr,
            io_timeout: Duration::from_secs(config.io_timeout_secs.max(1)),
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        });

        let engine_clone = Arc::clone(&engine);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, engine_clone).await;
        });

        Ok((engine, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The advertised peer address of this node.
    pub fn address(&self) -> &str {
        &self.credentials.address
    }

    pub fn state(&self) -> &PeerStateStore {
        &self.state
    }

    /// Connections that may still be admitted.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn accept_loop(listener: TcpListener, engine: Arc<Engine>) {
        loop {
            let permit = match Arc::clone(&engine.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Connection semaphore closed, stopping accept loop");
                    return;
                }
            };
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "Accepted connection");
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = engine.handle_inbound(stream, addr).await {
                            debug!(%addr, error = %e, "Inbound connection ended");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Handle one inbound connection from handshake to reply.
    async fn handle_inbound(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), WireError> {
        let (mut reader, mut writer) = stream.into_split();
        let remote = auth::accept(&mut reader, &mut writer, &self.credentials, self.io_timeout).await?;
        debug!(%addr, remote = %remote.identity, "Handshake accepted");

        let msg = read_message_timeout(&mut reader, self.io_timeout).await?;
        let request_id = msg.id.clone();

        let outcome = match dispatch::classify(msg) {
            Inbound::NetworkMessage(message) => {
                dispatch::log_network_message(&message);
                return Ok(());
            }
            Inbound::Foreign { transport } => {
                debug!(%addr, transport = %transport, "Ignoring typed transport frame");
                return Ok(());
            }
            Inbound::Singular { from, data } => {
                let result = dispatch::handle_singular(&self.state, &self.identity, data.as_bytes())
                    .await
                    .map(Response::single);
                (from, result)
            }
            Inbound::Batch { from, events } => {
                let count = events.len();
                let result = dispatch::handle_batch(&self.state, &self.identity, events).await;
                debug!(%addr, events = count, ok = result.is_ok(), "Batch handled");
                (from, result)
            }
            Inbound::Unexpected(kind) => {
                let reply = WireMessage::with_id(
                    request_id,
                    WireMessageKind::Error {
                        code: 400,
                        message: format!("Unexpected {kind} frame"),
                    },
                );
                write_message_timeout(&mut writer, &reply, self.io_timeout).await?;
                return Err(WireError::UnexpectedFrame(kind.to_string()));
            }
        };

        let (from, result) = outcome;
        if from != remote.address {
            warn!(
                %addr,
                claimed = %from,
                authenticated = %remote.address,
                "Initialization peer differs from handshake address"
            );
        }
        let reply = match result {
            Ok(response) => {
                // Only the address proven in the handshake earns contact credit.
                if let Err(e) =
                    dispatch::record_contact(&self.state, &self.identity, &remote.address).await
                {
                    warn!(peer = %remote.address, error = %e, "Failed to record contact");
                }
                WireMessage::with_id(request_id, WireMessageKind::Response(response))
            }
            Err(e) => {
                warn!(%addr, peer = %from, error = %e, "Request failed");
                WireMessage::with_id(request_id, ErrorBody::from(&e).into())
            }
        };
        write_message_timeout(&mut writer, &reply, self.io_timeout).await
    }
}
