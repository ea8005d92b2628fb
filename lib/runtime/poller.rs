//! Per-instance occupancy polling.
//!
//! Each live instance gets one background task that periodically asks the
//! in-container agent for `{player_count, max_players}` and pushes the answer
//! into the fleet registry. Instances without the agent simply never answer;
//! every error here is swallowed.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{fleet::FleetState, runtime::DockerCli, LudocoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The fixed internal port the in-container agent listens on. Never exposed
/// externally; reached via the container's bridge address.
pub const AGENT_STATUS_PORT: u16 = 9999;

/// How often each poller wakes.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Per-request timeout for the agent call; also bounds how long cancellation
/// can be delayed by an in-flight request.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The JSON document the agent returns.
#[derive(Debug, Deserialize)]
struct AgentStatus {
    player_count: u32,
    max_players: u32,
}

/// Side table of `instance name -> cancellation handle`, owned by the
/// admission layer. Instances hold no reference to their pollers, which keeps
/// teardown linear: cancel here, then remove from the fleet.
#[derive(Debug, Default)]
pub struct PollerSet {
    cancels: Mutex<HashMap<String, CancellationToken>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PollerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a poller for the named instance, replacing (and cancelling) any
    /// previous one under the same name.
    pub fn start(&self, name: &str, fleet: Arc<FleetState>, docker: DockerCli) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .cancels
            .lock()
            .unwrap()
            .insert(name.to_string(), token.clone())
        {
            previous.cancel();
        }

        tokio::spawn(poll_loop(name.to_string(), fleet, docker, token));
    }

    /// Cancels and forgets the poller for the named instance. Safe to call
    /// for names that have no poller.
    pub fn stop(&self, name: &str) {
        if let Some(token) = self.cancels.lock().unwrap().remove(name) {
            token.cancel();
        }
    }

    /// Returns the number of live pollers.
    pub fn len(&self) -> usize {
        self.cancels.lock().unwrap().len()
    }

    /// Returns whether no pollers are live.
    pub fn is_empty(&self) -> bool {
        self.cancels.lock().unwrap().is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The per-instance poll loop. Exits when the token is cancelled, observing
/// cancellation both between ticks and during the agent call.
async fn poll_loop(name: String, fleet: Arc<FleetState>, docker: DockerCli, token: CancellationToken) {
    let client = match reqwest::Client::builder().timeout(POLL_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("occupancy poller for {} failed to build client: {}", name, e);
            return;
        }
    };

    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval completes immediately; consume it so
    // the container gets a full interval to come up before the first probe.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }

        let status = tokio::select! {
            _ = token.cancelled() => return,
            status = poll_once(&client, &docker, &name) => status,
        };

        match status {
            Ok(status) => {
                // A no-op if the instance has been removed since this tick began.
                fleet.update_occupancy(&name, status.player_count, status.max_players);
            }
            Err(e) => {
                // Agent not installed or server still booting.
                tracing::debug!("occupancy poll for {} skipped: {}", name, e);
            }
        }
    }
}

/// One probe: resolve the bridge address, call the agent, decode the answer.
async fn poll_once(
    client: &reqwest::Client,
    docker: &DockerCli,
    name: &str,
) -> LudocoreResult<AgentStatus> {
    let ip = docker.inspect_address(name).await?;
    let url = format!("http://{}:{}/status", ip, AGENT_STATUS_PORT);

    let status = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<AgentStatus>()
        .await?;

    Ok(status)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poller_set_start_stop() {
        let set = PollerSet::new();
        let fleet = Arc::new(FleetState::new());

        set.start("shadow-dragon", fleet.clone(), DockerCli::new());
        set.start("iron-golem", fleet.clone(), DockerCli::new());
        assert_eq!(set.len(), 2);

        set.stop("shadow-dragon");
        assert_eq!(set.len(), 1);

        // Stopping an unknown name is a no-op.
        set.stop("ghost");
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_poller_set_restart_replaces_handle() {
        let set = PollerSet::new();
        let fleet = Arc::new(FleetState::new());

        set.start("shadow-dragon", fleet.clone(), DockerCli::new());
        set.start("shadow-dragon", fleet, DockerCli::new());
        assert_eq!(set.len(), 1);
    }
}
