use std::{fmt, net::IpAddr, ops::RangeInclusive, time::Duration};

#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Name of the capture task, included in every log line
    pub task_id: String,
    /// Lowest local UDP port used for host candidates, `None` leaves it unbounded
    pub min_port: Option<u16>,
    /// Highest local UDP port used for host candidates, `None` leaves it unbounded
    pub max_port: Option<u16>,
    /// Local IP addresses to create host candidates for.
    ///
    /// Discovered from the network interfaces when `None`.
    pub local_ips: Option<Vec<IpAddr>>,
    /// Candidate generation of this session. Remote candidates of other generations are ignored.
    pub generation: u32,
    /// Take the controlling ICE role
    pub controlling: bool,
    /// Interval at which components are polled for selected pairs
    pub pair_poll_interval: Duration,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            task_id: "capture".into(),
            min_port: None,
            max_port: None,
            local_ips: None,
            generation: 0,
            controlling: false,
            pair_poll_interval: Duration::from_secs(1),
        }
    }
}

impl NegotiatorConfig {
    /// Create a config from integer port bounds, where any value outside of `1..=65535` (usually `-1`) means unset.
    pub fn from_port_bounds(min_port: i32, max_port: i32) -> Self {
        fn bound(port: i32) -> Option<u16> {
            u16::try_from(port).ok().filter(|port| *port != 0)
        }

        Self {
            min_port: bound(min_port),
            max_port: bound(max_port),
            ..Default::default()
        }
    }

    pub fn port_range(&self) -> PortRange {
        PortRange {
            min: self.min_port,
            max: self.max_port,
        }
    }
}

/// Range of local ports that may be bound while harvesting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub min: Option<u16>,
    pub max: Option<u16>,
}

impl PortRange {
    /// Lowest port used when only an upper bound is configured
    const DEFAULT_MIN: u16 = 1024;

    /// Ports to try in ascending order, `None` if the OS should pick any free port
    pub fn ports(&self) -> Option<RangeInclusive<u16>> {
        match (self.min, self.max) {
            (None, None) => None,
            (min, max) => Some(min.unwrap_or(Self::DEFAULT_MIN)..=max.unwrap_or(u16::MAX)),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ports() {
            Some(ports) => write!(f, "{}-{}", ports.start(), ports.end()),
            None => f.write_str("any"),
        }
    }
}
