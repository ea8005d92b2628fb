//! In-memory registry of running instances.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PORT_SEARCH_SPAN;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One running game-server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// The unique, generated container name.
    pub container_name: String,

    /// The external port reserved for the instance, if any.
    pub port: Option<u16>,

    /// Command override passed to the container, if any. `None` means the
    /// image's entrypoint is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for the command override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// The last player count reported for the instance.
    pub player_count: u32,

    /// The player capacity reported by the in-container agent. 0 means the
    /// agent has not reported yet.
    pub max_players: u32,

    /// When the instance was started.
    pub started_at: DateTime<Utc>,
}

/// Authoritative registry of live instances and their reserved ports.
///
/// All mutation goes through `&self` methods behind one reader/writer lock;
/// the lock is never held across an await point. [`FleetState::list`] returns
/// a defensive copy so callers can iterate without holding the lock.
#[derive(Debug, Default)]
pub struct FleetState {
    inner: RwLock<FleetInner>,
}

#[derive(Debug, Default)]
struct FleetInner {
    instances: HashMap<String, Instance>,
    ports: HashSet<u16>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FleetState {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new instance. Fails if the name or the port is already
    /// taken; on success the port (if any) is reserved atomically with the
    /// registration.
    pub fn add(&self, instance: Instance) -> Result<(), FleetAddError> {
        let mut inner = self.inner.write().unwrap();

        if inner.instances.contains_key(&instance.container_name) {
            return Err(FleetAddError::NameTaken(instance.container_name));
        }
        if let Some(port) = instance.port {
            if inner.ports.contains(&port) {
                return Err(FleetAddError::PortTaken(port));
            }
            inner.ports.insert(port);
        }

        inner
            .instances
            .insert(instance.container_name.clone(), instance);
        Ok(())
    }

    /// Removes an instance and frees its port. Returns the removed instance,
    /// or `None` if no instance with that name exists — under two concurrent
    /// removals of the same name, exactly one caller gets the instance.
    pub fn remove(&self, name: &str) -> Option<Instance> {
        let mut inner = self.inner.write().unwrap();
        let instance = inner.instances.remove(name)?;
        if let Some(port) = instance.port {
            inner.ports.remove(&port);
        }
        Some(instance)
    }

    /// Returns a copy of the named instance.
    pub fn get(&self, name: &str) -> Option<Instance> {
        self.inner.read().unwrap().instances.get(name).cloned()
    }

    /// Returns a snapshot of all live instances. Ordering is unspecified but
    /// stable within a single call.
    pub fn list(&self) -> Vec<Instance> {
        self.inner
            .read()
            .unwrap()
            .instances
            .values()
            .cloned()
            .collect()
    }

    /// Returns the number of live instances.
    pub fn count(&self) -> usize {
        self.inner.read().unwrap().instances.len()
    }

    /// Updates the occupancy reported by the in-container agent. A no-op if
    /// the instance has already been removed.
    pub fn update_occupancy(&self, name: &str, player_count: u32, max_players: u32) {
        let mut inner = self.inner.write().unwrap();
        if let Some(instance) = inner.instances.get_mut(name) {
            instance.player_count = player_count;
            instance.max_players = max_players;
        }
    }

    /// Updates just the player count (heartbeat path). Fails if the instance
    /// is not registered.
    pub fn update_player_count(&self, name: &str, player_count: u32) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.instances.get_mut(name) {
            Some(instance) => {
                instance.player_count = player_count;
                true
            }
            None => false,
        }
    }

    /// Returns whether a port is currently reserved.
    pub fn is_port_used(&self, port: u16) -> bool {
        self.inner.read().unwrap().ports.contains(&port)
    }

    /// Returns the smallest unused port in `[base, base + 1000)`. The result
    /// is advisory: the caller must hold the start-path critical section and
    /// then reserve the port through [`FleetState::add`].
    pub fn next_free_port(&self, base: u16) -> Option<u16> {
        let inner = self.inner.read().unwrap();
        (base..base.saturating_add(PORT_SEARCH_SPAN)).find(|p| !inner.ports.contains(p))
    }
}

/// Why an [`FleetState::add`] was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum FleetAddError {
    /// An instance with this name is already registered.
    NameTaken(String),
    /// This port is already reserved by another instance.
    PortTaken(u16),
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str, port: Option<u16>) -> Instance {
        Instance {
            container_name: name.to_string(),
            port,
            command: None,
            args: vec![],
            player_count: 0,
            max_players: 0,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_remove_keeps_ports_consistent() {
        let fleet = FleetState::new();
        fleet.add(instance("iron-golem", Some(7777))).unwrap();
        fleet.add(instance("void-wyrm", Some(7778))).unwrap();
        fleet.add(instance("pure-sage", None)).unwrap();

        assert!(fleet.is_port_used(7777));
        assert!(fleet.is_port_used(7778));

        // One reserved port per instance that has one.
        let with_ports = fleet.list().iter().filter(|i| i.port.is_some()).count();
        assert_eq!(with_ports, 2);

        fleet.remove("iron-golem").unwrap();
        assert!(!fleet.is_port_used(7777));
        assert!(fleet.is_port_used(7778));

        // Removing an instance without a port frees nothing else.
        fleet.remove("pure-sage").unwrap();
        assert!(fleet.is_port_used(7778));
    }

    #[test]
    fn test_add_rejects_duplicate_name_and_port() {
        let fleet = FleetState::new();
        fleet.add(instance("iron-golem", Some(7777))).unwrap();

        assert_eq!(
            fleet.add(instance("iron-golem", Some(7800))),
            Err(FleetAddError::NameTaken("iron-golem".to_string()))
        );
        assert_eq!(
            fleet.add(instance("void-wyrm", Some(7777))),
            Err(FleetAddError::PortTaken(7777))
        );

        // The failed adds must not have reserved anything.
        assert!(!fleet.is_port_used(7800));
        assert_eq!(fleet.count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent_and_claims_once() {
        let fleet = FleetState::new();
        fleet.add(instance("iron-golem", Some(7777))).unwrap();

        assert!(fleet.remove("iron-golem").is_some());
        assert!(fleet.remove("iron-golem").is_none());
        assert!(fleet.remove("never-existed").is_none());
    }

    #[test]
    fn test_next_free_port_skips_reserved() {
        let fleet = FleetState::new();
        assert_eq!(fleet.next_free_port(7777), Some(7777));

        fleet.add(instance("iron-golem", Some(7777))).unwrap();
        assert_eq!(fleet.next_free_port(7777), Some(7778));

        fleet.add(instance("void-wyrm", Some(7778))).unwrap();
        assert_eq!(fleet.next_free_port(7777), Some(7779));
    }

    #[test]
    fn test_next_free_port_exhausted_range() {
        let fleet = FleetState::new();
        for (i, port) in (7777..7777 + PORT_SEARCH_SPAN).enumerate() {
            fleet.add(instance(&format!("srv-{i}"), Some(port))).unwrap();
        }
        assert_eq!(fleet.next_free_port(7777), None);
    }

    #[test]
    fn test_update_occupancy_missing_instance_is_noop() {
        let fleet = FleetState::new();
        fleet.update_occupancy("ghost", 3, 8);
        assert!(fleet.get("ghost").is_none());
    }

    #[test]
    fn test_update_player_count() {
        let fleet = FleetState::new();
        fleet.add(instance("iron-golem", Some(7777))).unwrap();

        assert!(fleet.update_player_count("iron-golem", 3));
        assert_eq!(fleet.get("iron-golem").unwrap().player_count, 3);
        assert!(!fleet.update_player_count("ghost", 3));
    }
}
