// Per-interface byte counters and derived rates

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use sysinfo::Networks;

use crate::error::CollectionResult;
use crate::models::NetworkReading;

/// Interface reported when no real interface qualifies.
pub const NO_TRAFFIC_INTERFACE: &str = "none";

/// Floor for the elapsed time between samples, in seconds.
const MIN_ELAPSED_SECS: f64 = 0.001;

const EXCLUDED_EXACT: [&str; 3] = ["bridge", "awdl", "llw"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl InterfaceCounters {
    pub fn new(name: impl Into<String>, bytes_in: u64, bytes_out: u64) -> Self {
        Self {
            name: name.into(),
            bytes_in,
            bytes_out,
        }
    }
}

/// Counters of every interface seen on the previous call and when it happened.
#[derive(Debug, Clone)]
pub struct NetworkState {
    counters: HashMap<String, (u64, u64)>,
    at: Instant,
}

impl NetworkState {
    pub fn interfaces(&self) -> usize {
        self.counters.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counters.contains_key(name)
    }
}

pub trait InterfaceSource: Send {
    /// Counters in enumeration order; a name may repeat.
    fn counters(&mut self) -> CollectionResult<Vec<InterfaceCounters>>;
}

pub fn is_excluded_interface(name: &str) -> bool {
    name.starts_with("lo") || EXCLUDED_EXACT.contains(&name)
}

fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    if current >= previous {
        ((current - previous) as f64 / elapsed_secs).max(0.0)
    } else {
        0.0
    }
}

/// Rates are computed only against a previous observation of the same interface whose counter
/// did not go backwards; anything else reads 0. The returned state replaces the previous one
/// entirely, so interfaces missing from `current` are forgotten.
pub fn compute_network(
    current: &[InterfaceCounters],
    previous: Option<&NetworkState>,
    at: Instant,
    now: DateTime<Utc>,
) -> (Vec<NetworkReading>, NetworkState) {
    // last occurrence wins; BTreeMap also gives name order
    let mut latest: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for c in current {
        latest.insert(c.name.as_str(), (c.bytes_in, c.bytes_out));
    }

    let elapsed_secs = previous
        .map(|p| at.saturating_duration_since(p.at).as_secs_f64())
        .unwrap_or(1.0)
        .max(MIN_ELAPSED_SECS);

    let mut readings: Vec<NetworkReading> = latest
        .iter()
        .filter(|(name, _)| !is_excluded_interface(name))
        .map(|(name, &(bytes_in, bytes_out))| {
            let prev = previous.and_then(|p| p.counters.get(*name));
            let (in_rate, out_rate) = match prev {
                Some(&(prev_in, prev_out)) => (
                    rate(bytes_in, prev_in, elapsed_secs),
                    rate(bytes_out, prev_out, elapsed_secs),
                ),
                None => (0.0, 0.0),
            };
            NetworkReading {
                interface: name.to_string(),
                bytes_in,
                bytes_out,
                bytes_in_per_sec: in_rate,
                bytes_out_per_sec: out_rate,
                timestamp: now,
            }
        })
        .collect();

    if readings.is_empty() {
        readings.push(NetworkReading {
            interface: NO_TRAFFIC_INTERFACE.into(),
            bytes_in: 0,
            bytes_out: 0,
            bytes_in_per_sec: 0.0,
            bytes_out_per_sec: 0.0,
            timestamp: now,
        });
    }

    let state = NetworkState {
        counters: latest
            .into_iter()
            .map(|(name, counters)| (name.to_string(), counters))
            .collect(),
        at,
    };
    (readings, state)
}

/// Cumulative link-layer counters via sysinfo.
pub struct HostInterfaceSource {
    networks: Networks,
}

impl Default for HostInterfaceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInterfaceSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl InterfaceSource for HostInterfaceSource {
    fn counters(&mut self) -> CollectionResult<Vec<InterfaceCounters>> {
        self.networks.refresh(true);
        Ok(self
            .networks
            .list()
            .iter()
            .map(|(name, data)| {
                InterfaceCounters::new(name.clone(), data.total_received(), data.total_transmitted())
            })
            .collect())
    }
}

pub struct NetworkCollector {
    source: Box<dyn InterfaceSource>,
    state: Option<NetworkState>,
}

impl NetworkCollector {
    pub fn new(source: impl InterfaceSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            state: None,
        }
    }

    pub fn host() -> Self {
        Self::new(HostInterfaceSource::new())
    }

    pub fn sample(&mut self) -> CollectionResult<Vec<NetworkReading>> {
        let counters = self.source.counters()?;
        let (readings, state) =
            compute_network(&counters, self.state.as_ref(), Instant::now(), Utc::now());
        self.state = Some(state);
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn first(counters: &[InterfaceCounters], at: Instant) -> NetworkState {
        compute_network(counters, None, at, Utc::now()).1
    }

    #[test]
    fn first_observation_has_zero_rate() {
        let (out, _) = compute_network(
            &[InterfaceCounters::new("eth0", 5_000, 7_000)],
            None,
            Instant::now(),
            Utc::now(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes_in, 5_000);
        assert_eq!(out[0].bytes_in_per_sec, 0.0);
        assert_eq!(out[0].bytes_out_per_sec, 0.0);
    }

    #[test]
    fn rate_is_delta_over_elapsed() {
        let t0 = Instant::now();
        let prev = first(&[InterfaceCounters::new("eth0", 1_000, 2_000)], t0);
        let (out, _) = compute_network(
            &[InterfaceCounters::new("eth0", 3_000, 2_500)],
            Some(&prev),
            t0 + Duration::from_secs(2),
            Utc::now(),
        );
        assert_eq!(out[0].bytes_in_per_sec, 1_000.0);
        assert_eq!(out[0].bytes_out_per_sec, 250.0);
    }

    #[test]
    fn counter_reset_reads_zero_never_negative() {
        let t0 = Instant::now();
        let prev = first(&[InterfaceCounters::new("eth0", 10_000, 10_000)], t0);
        let (out, _) = compute_network(
            &[InterfaceCounters::new("eth0", 9_999, 0)],
            Some(&prev),
            t0 + Duration::from_secs(1),
            Utc::now(),
        );
        assert_eq!(out[0].bytes_in_per_sec, 0.0);
        assert_eq!(out[0].bytes_out_per_sec, 0.0);
    }

    #[test]
    fn elapsed_is_floored() {
        let t0 = Instant::now();
        let prev = first(&[InterfaceCounters::new("eth0", 0, 0)], t0);
        let (out, _) = compute_network(
            &[InterfaceCounters::new("eth0", 1, 0)],
            Some(&prev),
            t0,
            Utc::now(),
        );
        assert_eq!(out[0].bytes_in_per_sec, 1.0 / MIN_ELAPSED_SECS);
        assert!(out[0].bytes_in_per_sec.is_finite());
    }

    #[test]
    fn duplicate_names_last_occurrence_wins() {
        let (out, state) = compute_network(
            &[
                InterfaceCounters::new("en0", 1, 1),
                InterfaceCounters::new("en0", 50, 60),
            ],
            None,
            Instant::now(),
            Utc::now(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes_in, 50);
        assert_eq!(out[0].bytes_out, 60);
        assert_eq!(state.interfaces(), 1);
    }

    #[test]
    fn loopback_and_virtual_interfaces_are_excluded() {
        let (out, _) = compute_network(
            &[
                InterfaceCounters::new("lo", 1, 1),
                InterfaceCounters::new("lo0", 1, 1),
                InterfaceCounters::new("bridge", 1, 1),
                InterfaceCounters::new("awdl", 1, 1),
                InterfaceCounters::new("llw", 1, 1),
                InterfaceCounters::new("wlan0", 1, 1),
                InterfaceCounters::new("eth0", 1, 1),
            ],
            None,
            Instant::now(),
            Utc::now(),
        );
        let names: Vec<&str> = out.iter().map(|n| n.interface.as_str()).collect();
        assert_eq!(names, vec!["eth0", "wlan0"]);
    }

    #[test]
    fn no_qualifying_interface_yields_synthetic_entry() {
        let (out, _) = compute_network(
            &[InterfaceCounters::new("lo", 100, 100)],
            None,
            Instant::now(),
            Utc::now(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].interface, NO_TRAFFIC_INTERFACE);
        assert_eq!(out[0].bytes_in_per_sec + out[0].bytes_out_per_sec, 0.0);
    }

    #[test]
    fn state_is_replaced_not_merged() {
        let t0 = Instant::now();
        let prev = first(
            &[
                InterfaceCounters::new("eth0", 0, 0),
                InterfaceCounters::new("eth1", 0, 0),
            ],
            t0,
        );
        let (_, state) = compute_network(
            &[InterfaceCounters::new("eth0", 10, 10)],
            Some(&prev),
            t0 + Duration::from_secs(1),
            Utc::now(),
        );
        assert!(state.contains("eth0"));
        assert!(!state.contains("eth1"));

        // eth1 reappearing is a first observation again
        let (out, _) = compute_network(
            &[InterfaceCounters::new("eth1", 500, 500)],
            Some(&state),
            t0 + Duration::from_secs(2),
            Utc::now(),
        );
        assert_eq!(out[0].bytes_in_per_sec, 0.0);
    }
}
