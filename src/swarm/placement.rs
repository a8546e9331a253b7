// ABOUTME: Host selection and slot assignment for scaling a swarm.
// ABOUTME: Decisions are made synchronously, before any task fans out, and take port locks as they go.

use std::collections::{HashSet, VecDeque};

use crate::config::HostConfig;
use crate::model::{Instance, Swarm};
use crate::store::{PortLockGuard, PortLocks};

use super::SwarmError;

/// Hosts ordered least-loaded first: fewest instances of this swarm, then
/// fewest instances overall, then by name. Reverse it for scale-down.
pub fn prioritized_hosts(hosts: &[HostConfig], instances: &[Instance], swarm: &Swarm) -> Vec<HostConfig> {
    let mut ranked: Vec<(usize, usize, &HostConfig)> = hosts
        .iter()
        .map(|host| {
            let owned = instances
                .iter()
                .filter(|i| i.host == host.name && swarm.owns(i))
                .count();
            let total = instances.iter().filter(|i| i.host == host.name).count();
            (owned, total, host)
        })
        .collect();

    ranked.sort_by(|a, b| (a.0, a.1, &a.2.name).cmp(&(b.0, b.1, &b.2.name)));
    ranked.into_iter().map(|(_, _, host)| host.clone()).collect()
}

/// Ports reserved on one host for this pass.
#[derive(Debug)]
pub struct HostSlots {
    pub host: HostConfig,
    pub guards: Vec<PortLockGuard>,
}

impl HostSlots {
    pub fn ports(&self) -> Vec<u16> {
        self.guards.iter().map(PortLockGuard::port).collect()
    }
}

/// First port in the host's range that no instance uses and that we
/// manage to lock.
pub fn next_free_port(host: &HostConfig, instances: &[Instance], locks: &PortLocks) -> Option<PortLockGuard> {
    let used: HashSet<u16> = instances
        .iter()
        .filter(|i| i.host == host.name)
        .map(|i| i.port)
        .collect();

    host.ports
        .iter()
        .filter(|port| !used.contains(port))
        .find_map(|port| locks.try_acquire(&host.name, port))
}

/// Spread `count` new instances round-robin over `hosts` (slot `i` goes to
/// `hosts[i % len]`), locking a port for each. Hosts that get no slot are
/// left out. Returns nothing when `hosts` is empty.
pub fn assign_slots(
    hosts: &[HostConfig],
    instances: &[Instance],
    count: usize,
    locks: &PortLocks,
) -> Result<Vec<HostSlots>, SwarmError> {
    if hosts.is_empty() {
        return Ok(Vec::new());
    }

    let mut slots: Vec<HostSlots> = hosts
        .iter()
        .map(|host| HostSlots {
            host: host.clone(),
            guards: Vec::new(),
        })
        .collect();

    for i in 0..count {
        let slot = &mut slots[i % hosts.len()];
        // On failure the guards taken so far drop with `slots`.
        let guard = next_free_port(&slot.host, instances, locks).ok_or_else(|| {
            SwarmError::NoFreePort {
                host: slot.host.name.clone(),
            }
        })?;
        slot.guards.push(guard);
    }

    slots.retain(|s| !s.guards.is_empty());
    Ok(slots)
}

/// Choose `count` instances to remove, round-robin over `hosts` (already
/// most-loaded first), highest port first within a host. Only `current`
/// instances are ever chosen.
pub fn pick_removals(hosts: &[HostConfig], current: &[Instance], count: usize) -> Vec<Instance> {
    let mut queues: Vec<VecDeque<&Instance>> = hosts
        .iter()
        .map(|host| {
            let mut on_host: Vec<&Instance> =
                current.iter().filter(|i| i.host == host.name).collect();
            on_host.sort_by(|a, b| b.port.cmp(&a.port));
            on_host.into()
        })
        .collect();

    let mut picked = Vec::with_capacity(count);
    while picked.len() < count {
        let before = picked.len();
        for queue in queues.iter_mut() {
            if picked.len() == count {
                break;
            }
            if let Some(instance) = queue.pop_front() {
                picked.push(instance.clone());
            }
        }
        if picked.len() == before {
            break;
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRange;
    use crate::types::{ProcName, ReleaseHash};

    fn swarm() -> Swarm {
        serde_yaml::from_str("id: billing-web\napp: billing\nversion: v3\nproc: web\nsize: 3\n").unwrap()
    }

    fn instance(host: &str, port: u16, app: &str) -> Instance {
        Instance {
            name: format!("{app}-v3-abcd1234-web-{port}"),
            host: host.to_string(),
            port,
            app: crate::types::AppName::new(app).unwrap(),
            version: "v3".to_string(),
            config_name: "default".to_string(),
            proc_name: ProcName::new("web").unwrap(),
            release_hash: ReleaseHash::from_reported("abcd1234"),
        }
    }

    fn hosts(names: &[&str]) -> Vec<HostConfig> {
        names
            .iter()
            .map(|n| HostConfig::new(*n).ports(PortRange::new(5000, 5009).unwrap()))
            .collect()
    }

    #[test]
    fn least_loaded_host_comes_first() {
        let instances = vec![instance("a", 5000, "billing"), instance("b", 5000, "search")];
        let order = prioritized_hosts(&hosts(&["a", "b", "c"]), &instances, &swarm());
        let names: Vec<_> = order.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn slots_round_robin_and_skip_used_ports() {
        let locks = PortLocks::new();
        let instances = vec![instance("a", 5000, "search")];

        let slots = assign_slots(&hosts(&["a", "b"]), &instances, 3, &locks).unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].host.name, "a");
        assert_eq!(slots[0].ports(), vec![5001, 5002]);
        assert_eq!(slots[1].ports(), vec![5000]);
        assert_eq!(locks.held(), 3);
    }

    #[test]
    fn exhausted_host_releases_partial_locks() {
        let locks = PortLocks::new();
        let narrow = vec![HostConfig::new("a").ports(PortRange::new(5000, 5001).unwrap())];

        let err = assign_slots(&narrow, &[], 3, &locks).unwrap_err();

        assert!(matches!(err, SwarmError::NoFreePort { ref host } if host == "a"));
        assert_eq!(locks.held(), 0);
    }

    #[test]
    fn removals_round_robin_over_hosts_with_instances() {
        let current = vec![
            instance("a", 5000, "billing"),
            instance("a", 5001, "billing"),
            instance("a", 5002, "billing"),
            instance("b", 5000, "billing"),
        ];
        let picked = pick_removals(&hosts(&["a", "b", "c"]), &current, 3);
        let nodes: Vec<String> = picked.iter().map(|i| i.node().to_string()).collect();
        assert_eq!(nodes, vec!["a:5002", "b:5000", "a:5001"]);
    }

    #[test]
    fn removals_never_exceed_current() {
        let current = vec![instance("a", 5000, "billing")];
        assert_eq!(pick_removals(&hosts(&["a"]), &current, 5).len(), 1);
    }
}
