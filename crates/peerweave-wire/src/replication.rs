//! Directory replication between peers.
//!
//! Every exchange moves a whole directory snapshot. Whatever arrives is
//! decoded first and only then written over the local copy, so a failed
//! round trip never changes local state. There is no merge: the last
//! snapshot written wins.

use crate::client::{remote_address, PeerClient};
use crate::error::WireError;
use peerweave_directory::{Directories, PeerDirectory};
use peerweave_types::connection::{ErrorBody, Event, ResponseEntry};
use peerweave_types::error::PeerweaveError;
use peerweave_types::message::NetworkMessage;
use peerweave_types::variable::Variable;
use tracing::{info, warn};

/// Replication client for the directories of one local identity.
#[derive(Clone)]
pub struct Replicator {
    client: PeerClient,
    directories: Directories,
}

fn remote_error(body: ErrorBody) -> WireError {
    WireError::Remote {
        code: body.code,
        message: body.message,
    }
}

impl Replicator {
    pub fn new(client: PeerClient, directories: Directories) -> Self {
        Self {
            client,
            directories,
        }
    }

    pub fn client(&self) -> &PeerClient {
        &self.client
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    /// Ask `remote` for its copy of `network_name` without storing it.
    async fn query_remote(
        &self,
        remote: &str,
        network_name: &str,
    ) -> Result<PeerDirectory, WireError> {
        let event = Event::query_type(PeerDirectory::variable_type(network_name));
        let response = self.client.send_events(remote, vec![event]).await?;
        let entry = response
            .val
            .into_iter()
            .next()
            .ok_or(PeerweaveError::EmptyResponse)?;
        let bytes = entry.into_result().map_err(remote_error)?;
        let variable = Variable::from_bytes(&bytes)?;
        Ok(PeerDirectory::from_bytes(variable.payload.as_bytes())?)
    }

    /// Send `directory` to `remote`, which stores it and echoes it back.
    async fn push_remote(
        &self,
        remote: &str,
        directory: &PeerDirectory,
    ) -> Result<PeerDirectory, WireError> {
        let response = self.client.send_data(remote, directory.to_bytes()?).await?;
        match response.val.into_iter().next() {
            Some(ResponseEntry::Value(payload)) => {
                Ok(PeerDirectory::from_bytes(payload.as_bytes())?)
            }
            Some(ResponseEntry::Error(body)) => Err(remote_error(body)),
            None => Err(PeerweaveError::EmptyResponse.into()),
        }
    }

    /// Fetch `network_name` from `remote` and overwrite the local copy.
    pub async fn fetch_remote(
        &self,
        remote: &str,
        network_name: &str,
    ) -> Result<PeerDirectory, WireError> {
        let directory = self.query_remote(remote, network_name).await?;
        self.directories.overwrite(&directory).await?;
        info!(remote, network = network_name, peers = directory.len(), "Fetched directory");
        Ok(directory)
    }

    /// Push the local copy of `network_name` to `remote`, then store the
    /// snapshot it echoes back.
    pub async fn push_update_to_remote(
        &self,
        remote: &str,
        network_name: &str,
    ) -> Result<PeerDirectory, WireError> {
        let local = self.directories.load(network_name).await?;
        let echoed = self.push_remote(remote, &local).await?;
        self.directories.overwrite(&echoed).await?;
        info!(remote, network = network_name, peers = echoed.len(), "Pushed directory");
        Ok(echoed)
    }

    /// Join `network_name` through the peer at `host:port`.
    ///
    /// Fetches the remote directory, adds the local peer to it, pushes it
    /// back, and stores the result locally.
    pub async fn join(
        &self,
        host: &str,
        port: u16,
        network_name: &str,
    ) -> Result<PeerDirectory, WireError> {
        let remote = remote_address(host, port);
        let mut directory = self.query_remote(&remote, network_name).await?;

        let local = self
            .directories
            .state()
            .load(self.directories.identity())
            .await?;
        match directory.add_peer(&local) {
            Ok(()) | Err(PeerweaveError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let echoed = self.push_remote(&remote, &directory).await?;
        self.directories.overwrite(&echoed).await?;
        info!(
            remote = %remote,
            network = network_name,
            peers = echoed.len(),
            "Joined network"
        );
        Ok(echoed)
    }

    /// Send `message` to one peer. No reply is read.
    pub async fn send_network_message(
        &self,
        remote: &str,
        message: &NetworkMessage,
    ) -> Result<(), WireError> {
        self.client.notify(remote, message).await
    }

    /// Send `message` to every peer in its network except ourselves.
    ///
    /// Returns the peers that could not be reached; one failure does not stop
    /// the rest.
    pub async fn broadcast_network_message(
        &self,
        message: &NetworkMessage,
    ) -> Result<Vec<(String, WireError)>, WireError> {
        let directory = self.directories.load(&message.network).await?;
        let mut errors = Vec::new();

        for peer in &directory.peers {
            if peer.address == self.client.address() {
                continue;
            }
            if let Err(e) = self.client.notify(&peer.address, message).await {
                warn!(peer = %peer.address, error = %e, "Network message not delivered");
                errors.push((peer.address.clone(), e));
            }
        }

        Ok(errors)
    }
}
