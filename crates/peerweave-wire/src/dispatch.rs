//! Inbound frame classification and command dispatch.
//!
//! Handlers work against the local identity's persisted state through
//! [`PeerStateStore`], one gated load-modify-save per step, so every batch
//! event sees whatever earlier events and concurrent connections wrote.

use crate::message::{WireMessage, WireMessageKind};
use peerweave_directory::PeerDirectory;
use peerweave_memory::PeerStateStore;
use peerweave_types::connection::{
    Command, ConnectionBody, ErrorBody, Event, Response, ResponseEntry,
};
use peerweave_types::error::{PeerweaveError, PeerweaveResult};
use peerweave_types::message::{NetworkMessage, Priority};
use peerweave_types::variable::{Payload, Variable};
use tracing::{debug, error, info, warn};

/// Variable type for opaque singular payloads.
pub const CONNECTION_VARIABLE_TYPE: &str = "Connection";

/// What an inbound request frame asks for.
#[derive(Debug)]
pub enum Inbound {
    NetworkMessage(NetworkMessage),
    /// Typed-transport frame, handled elsewhere.
    Foreign { transport: String },
    Singular { from: String, data: Payload },
    Batch { from: String, events: Vec<Event> },
    /// A frame that is never a valid request.
    Unexpected(&'static str),
}

/// Classify a frame that arrived after the handshake.
pub fn classify(msg: WireMessage) -> Inbound {
    let kind = msg.kind_name();
    match msg.kind {
        WireMessageKind::NetworkMessage(message) => Inbound::NetworkMessage(message),
        WireMessageKind::Typed { transport, .. } => Inbound::Foreign { transport },
        WireMessageKind::Connection(conn) => match conn.body {
            ConnectionBody::Data(data) => Inbound::Singular {
                from: conn.initialization_peer,
                data,
            },
            ConnectionBody::Stack(events) => Inbound::Batch {
                from: conn.initialization_peer,
                events,
            },
        },
        _ => Inbound::Unexpected(kind),
    }
}

/// Log a network message on the channel its priority selects.
pub fn log_network_message(message: &NetworkMessage) {
    let priority = message.priority();
    let channel = priority.channel();
    let network = message.network.as_str();
    let message_type = message.message_type.as_str();
    match priority {
        Priority::Critical => error!(channel, network, message_type, "{}", message.message),
        Priority::Warning => warn!(channel, network, message_type, "{}", message.message),
        Priority::Info | Priority::Normal => {
            info!(channel, network, message_type, "{}", message.message)
        }
    }
}

/// Handle a singular payload and return the reply bytes.
///
/// The payload is tried as a directory snapshot, then as a network message,
/// and otherwise stored as an opaque `Connection` variable.
pub async fn handle_singular(
    state: &PeerStateStore,
    identity: &str,
    data: &[u8],
) -> PeerweaveResult<Vec<u8>> {
    if let Ok(directory) = PeerDirectory::from_bytes(data) {
        state
            .update(identity, |local| directory.persist(&mut local.environment))
            .await?;
        info!(
            network = %directory.network_name,
            peers = directory.peers.len(),
            "Stored directory snapshot from remote"
        );
        return directory.to_bytes();
    }

    if let Ok(message) = NetworkMessage::from_bytes(data) {
        log_network_message(&message);
        let bytes = message.to_bytes()?;
        let variable = Variable::new(message.variable_type(), bytes.clone())?;
        state
            .update(identity, |local| {
                local.environment.add_variable(variable);
                Ok(())
            })
            .await?;
        return Ok(bytes);
    }

    let variable = Variable::new(CONNECTION_VARIABLE_TYPE, data)?;
    let bytes = variable.to_bytes()?;
    state
        .update(identity, |local| {
            local.environment.add_variable(variable);
            Ok(())
        })
        .await?;
    debug!(identity, len = data.len(), "Stored opaque connection payload");
    Ok(bytes)
}

/// Run every event in order, one response entry per event.
///
/// Validation and lookup failures become error entries in place. Storage
/// failures abort the whole batch.
pub async fn handle_batch(
    state: &PeerStateStore,
    identity: &str,
    events: Vec<Event>,
) -> PeerweaveResult<Response> {
    let mut val = Vec::with_capacity(events.len());
    for event in events {
        let command = event.command;
        match execute_event(state, identity, event).await {
            Ok(bytes) => val.push(ResponseEntry::Value(bytes.into())),
            Err(e) if e.code() == 500 => return Err(e),
            Err(e) => {
                debug!(identity, %command, error = %e, "Event failed");
                val.push(ResponseEntry::Error(ErrorBody::from(&e)));
            }
        }
    }
    if val.is_empty() {
        return Err(PeerweaveError::EmptyResponse);
    }
    Ok(Response { val })
}

async fn execute_event(
    state: &PeerStateStore,
    identity: &str,
    event: Event,
) -> PeerweaveResult<Vec<u8>> {
    let modifiers = event.modifiers;
    match event.command {
        Command::NewVariable => {
            state.read(identity, |_| Ok(())).await?;
            Variable::new(modifiers.variable_type, modifiers.value)?.to_bytes()
        }
        Command::QueryValue => {
            state
                .read(identity, |local| {
                    local
                        .environment
                        .query_value(modifiers.value.as_bytes())?
                        .to_bytes()
                })
                .await
        }
        Command::QueryType => {
            state
                .read(identity, |local| {
                    local
                        .environment
                        .query_type(&modifiers.variable_type)?
                        .to_bytes()
                })
                .await
        }
        Command::AddVariable => {
            let variable = modifiers.variable.ok_or(PeerweaveError::NilVariable)?;
            if !variable.has_valid_identifier() {
                return Err(PeerweaveError::InvalidVariable(format!(
                    "identifier does not match content of {:?}",
                    variable.variable_type
                )));
            }
            let bytes = variable.to_bytes()?;
            state
                .update(identity, |local| {
                    local.environment.add_variable(variable);
                    Ok(())
                })
                .await?;
            Ok(bytes)
        }
    }
}

/// Refresh `address` in every local directory that lists it.
pub async fn record_contact(
    state: &PeerStateStore,
    identity: &str,
    address: &str,
) -> PeerweaveResult<()> {
    state
        .update(identity, |local| {
            for network in PeerDirectory::networks(&local.environment) {
                let mut directory = PeerDirectory::load(&local.environment, &network)?;
                if directory.touch_peer(address).is_ok() {
                    directory.persist(&mut local.environment)?;
                }
            }
            Ok(())
        })
        .await
}
