use crate::{
    Error,
    candidate::{Candidate, CandidateKind, ComponentId},
    config::{NegotiatorConfig, PortRange},
    session::Component,
};
use std::{
    collections::HashSet,
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    sync::Arc,
};

/// Returns the local IP addresses host candidates are created for
pub(crate) fn local_ips(config: &NegotiatorConfig) -> Result<Vec<IpAddr>, Error> {
    let ips = match &config.local_ips {
        Some(ips) => ips.clone(),
        None => local_ip_address::list_afinet_netifas()?
            .into_iter()
            .map(|(_, ip)| ip)
            .filter(|ip| !ip.is_loopback())
            .collect(),
    };

    let mut seen = HashSet::new();

    Ok(ips
        .into_iter()
        .filter(is_usable)
        .filter(|ip| seen.insert(*ip))
        .collect())
}

fn is_usable(ip: &IpAddr) -> bool {
    if ip.is_unspecified() {
        return false;
    }

    if let IpAddr::V6(v6) = ip
        && (v6.to_ipv4().is_some() || v6.to_ipv4_mapped().is_some())
    {
        return false;
    }

    true
}

/// Bind a UDP socket on the unspecified address of the given family, using the first free port in `range`
pub(crate) fn bind_in_range(ipv4: bool, range: &PortRange) -> Result<UdpSocket, Error> {
    let ip: IpAddr = if ipv4 {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv6Addr::UNSPECIFIED.into()
    };

    let Some(ports) = range.ports() else {
        return UdpSocket::bind(SocketAddr::new(ip, 0)).map_err(|source| Error::Bind {
            range: *range,
            source,
        });
    };

    let mut last_error = None;

    for port in ports {
        match UdpSocket::bind(SocketAddr::new(ip, port)) {
            Ok(socket) => return Ok(socket),
            Err(e) => last_error = Some(e),
        }
    }

    Err(Error::Bind {
        range: *range,
        source: last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "port range is empty")
        }),
    })
}

/// Create a component with one host candidate per local IP address
pub(crate) fn harvest_component(
    id: ComponentId,
    ips: &[IpAddr],
    range: &PortRange,
    generation: u32,
) -> Result<Component, Error> {
    harvest_component_with(id, ips, generation, |ipv4| bind_in_range(ipv4, range))
}

/// Like [`harvest_component`] but with a custom socket factory.
///
/// A family whose socket cannot be bound is skipped as long as another family was bound.
fn harvest_component_with(
    id: ComponentId,
    ips: &[IpAddr],
    generation: u32,
    mut bind: impl FnMut(bool) -> Result<UdpSocket, Error>,
) -> Result<Component, Error> {
    let mut component = Component::new(id);
    let mut bind_error = None;

    for ipv4 in [true, false] {
        let family: Vec<IpAddr> = ips
            .iter()
            .copied()
            .filter(|ip| ip.is_ipv4() == ipv4)
            .collect();

        if family.is_empty() {
            continue;
        }

        let socket = match bind(ipv4) {
            Ok(socket) => socket,
            Err(e) => {
                log::warn!(
                    "failed to bind {} socket for {id:?}, skipping {} address(es): {e}",
                    if ipv4 { "IPv4" } else { "IPv6" },
                    family.len()
                );
                bind_error = Some(e);
                continue;
            }
        };

        let port = socket.local_addr()?.port();

        for ip in family {
            let same_kind_count = component
                .local_candidates
                .iter()
                .filter(|c| c.kind == CandidateKind::Host)
                .count();

            let candidate =
                Candidate::host(id, SocketAddr::new(ip, port), generation, same_kind_count);

            log::debug!("add local candidate {id:?} {candidate}");

            component.local_candidates.push(candidate);
        }

        component.sockets.push(Arc::new(socket));
    }

    match bind_error {
        Some(e) if component.sockets.is_empty() => Err(e),
        _ => Ok(component),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_and_mapped_addresses_are_not_usable() {
        let config = NegotiatorConfig {
            local_ips: Some(vec![
                "0.0.0.0".parse().unwrap(),
                "::ffff:10.0.0.1".parse().unwrap(),
                "127.0.0.1".parse().unwrap(),
                "fe80::1".parse().unwrap(),
            ]),
            ..Default::default()
        };

        let ips = local_ips(&config).unwrap();

        assert_eq!(
            ips,
            vec![
                "127.0.0.1".parse::<IpAddr>().unwrap(),
                "fe80::1".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn empty_range_fails_to_bind() {
        let range = PortRange {
            min: Some(5000),
            max: Some(4999),
        };

        assert!(matches!(
            bind_in_range(true, &range),
            Err(Error::Bind { .. })
        ));
    }

    #[test]
    fn occupied_port_fails_to_bind() {
        let taken = UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let range = PortRange {
            min: Some(port),
            max: Some(port),
        };

        assert!(bind_in_range(true, &range).is_err());
    }

    #[test]
    fn component_gets_host_candidate_per_ip() {
        let ips: Vec<IpAddr> = vec!["127.0.0.1".parse().unwrap(), "127.0.0.2".parse().unwrap()];

        let range = PortRange {
            min: None,
            max: None,
        };

        let component = harvest_component(ComponentId::Rtcp, &ips, &range, 3).unwrap();

        assert_eq!(component.sockets.len(), 1);
        assert_eq!(component.local_candidates.len(), 2);
        assert!(component.local_candidates.iter().all(|c| c.generation == 3));
        assert_ne!(
            component.local_candidates[0].priority,
            component.local_candidates[1].priority
        );
        assert_eq!(
            component.local_candidates[0].address.addr.port(),
            component.local_candidates[1].address.addr.port()
        );
    }

    #[test]
    fn repeated_local_ips_keep_first_occurrence() {
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        let config = NegotiatorConfig {
            local_ips: Some(vec![a, b, a, b]),
            ..Default::default()
        };

        assert_eq!(local_ips(&config).unwrap(), vec![a, b]);
    }

    #[test]
    fn family_failing_to_bind_is_skipped() {
        let ips: Vec<IpAddr> = vec!["127.0.0.1".parse().unwrap(), "fe80::1".parse().unwrap()];

        let component = harvest_component_with(ComponentId::Rtp, &ips, 0, |ipv4| {
            if ipv4 {
                Ok(UdpSocket::bind("127.0.0.1:0")?)
            } else {
                Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "no IPv6").into())
            }
        })
        .unwrap();

        assert_eq!(component.sockets.len(), 1);
        assert_eq!(component.local_candidates.len(), 1);
        assert!(component.local_candidates[0].address.addr.is_ipv4());
    }

    #[test]
    fn harvest_fails_when_no_family_binds() {
        let ips: Vec<IpAddr> = vec!["127.0.0.1".parse().unwrap(), "fe80::1".parse().unwrap()];

        let result = harvest_component_with(ComponentId::Rtp, &ips, 0, |_| {
            Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "no socket").into())
        });

        assert!(matches!(result, Err(Error::Io(_))));
    }
}
