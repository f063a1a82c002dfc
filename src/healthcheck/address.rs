//! Classification of listening addresses against an expected port.
//!
//! A process passes when it listens on a wildcard interface (`0.0.0.0` or
//! `::`) on the expected port. Otherwise the first address that does not
//! match explains what is wrong: the interface, the port, or both.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

const WILDCARD_V4: &str = "0.0.0.0";
const WILDCARD_V6: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some() => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    fn wildcard(&self) -> &'static str {
        match self {
            Family::V4 => WILDCARD_V4,
            Family::V6 => WILDCARD_V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error(
        "container listening on expected port ({port}) with unexpected {family} interface: expected={} actual={actual}",
        .family.wildcard()
    )]
    UnexpectedInterface {
        family: Family,
        port: u16,
        actual: String,
    },
    #[error(
        "container listening on expected {family} interface with an unexpected port: expected={expected} actual={actual}"
    )]
    UnexpectedPort {
        family: Family,
        expected: u16,
        actual: u16,
    },
    #[error(
        "container listening on unexpected {family} interface with an unexpected port: expected={}:{expected} actual={actual}",
        .family.wildcard()
    )]
    UnexpectedInterfaceAndPort {
        family: Family,
        expected: u16,
        actual: String,
    },
    #[error("invalid listening address: '{0}'")]
    InvalidAddress(String),
}

/// Checks `addresses` (as `ip:port` strings) against `expected_port`.
///
/// An empty set passes: there is nothing bound to the wrong place.
/// Addresses are examined in sorted order so the diagnostic is stable.
pub fn classify(addresses: &BTreeSet<String>, expected_port: u16) -> Result<(), AddressError> {
    let accepted = [WILDCARD_V4, WILDCARD_V6].map(|ip| format!("{ip}:{expected_port}"));
    if accepted.iter().any(|a| addresses.contains(a)) {
        return Ok(());
    }

    match addresses.iter().next() {
        Some(address) => Err(diagnose(address, expected_port)),
        None => Ok(()),
    }
}

fn diagnose(address: &str, expected_port: u16) -> AddressError {
    let invalid = || AddressError::InvalidAddress(address.to_string());
    let Some((raw_ip, raw_port)) = address.rsplit_once(':') else {
        return invalid();
    };
    let (Ok(ip), Ok(port)) = (raw_ip.parse::<IpAddr>(), raw_port.parse::<u16>()) else {
        return invalid();
    };
    let family = Family::of(&ip);
    let wildcard = raw_ip == WILDCARD_V4 || raw_ip == WILDCARD_V6;

    if port == expected_port {
        AddressError::UnexpectedInterface {
            family,
            port,
            actual: raw_ip.to_string(),
        }
    } else if wildcard {
        AddressError::UnexpectedPort {
            family,
            expected: expected_port,
            actual: port,
        }
    } else {
        AddressError::UnexpectedInterfaceAndPort {
            family,
            expected: expected_port,
            actual: address.to_string(),
        }
    }
}

/// Local addresses of every `LISTEN` line in `netstat -plant` output.
pub fn parse_listening(netstat: &str) -> BTreeSet<String> {
    netstat
        .lines()
        .filter(|line| line.contains("LISTEN"))
        .filter_map(|line| line.split_whitespace().nth(3))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn set(addresses: &[&str]) -> BTreeSet<String> {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_ipv4_wildcard_passes() {
        assert_eq!(classify(&set(&["0.0.0.0:5000"]), 5000), Ok(()));
    }

    #[test]
    fn test_empty_set_passes() {
        assert_eq!(classify(&set(&[]), 5000), Ok(()));
    }

    #[test]
    fn test_ipv6_wildcard_passes() {
        assert_eq!(classify(&set(&[":::5000"]), 5000), Ok(()));
    }

    #[test]
    fn test_wildcard_among_others_passes() {
        assert_eq!(
            classify(&set(&["127.0.0.1:5000", "0.0.0.0:5000", "::1:6000"]), 5000),
            Ok(())
        );
    }

    #[test]
    fn test_unexpected_ipv4_interface() {
        let err = classify(&set(&["127.0.0.1:5000"]), 5000).unwrap_err();
        assert_eq!(
            err,
            AddressError::UnexpectedInterface {
                family: Family::V4,
                port: 5000,
                actual: "127.0.0.1".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "container listening on expected port (5000) with unexpected IPv4 interface: expected=0.0.0.0 actual=127.0.0.1"
        );
    }

    #[test]
    fn test_unexpected_ipv6_interface() {
        let err = classify(&set(&["::1:5000"]), 5000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "container listening on expected port (5000) with unexpected IPv6 interface: expected=:: actual=::1"
        );
    }

    #[test]
    fn test_unexpected_port_on_wildcard() {
        let err = classify(&set(&["0.0.0.0:4999"]), 5000).unwrap_err();
        assert_eq!(
            err,
            AddressError::UnexpectedPort {
                family: Family::V4,
                expected: 5000,
                actual: 4999,
            }
        );
        assert_eq!(
            err.to_string(),
            "container listening on expected IPv4 interface with an unexpected port: expected=5000 actual=4999"
        );
    }

    #[test]
    fn test_unexpected_port_on_ipv6_wildcard() {
        let err = classify(&set(&[":::8080"]), 5000).unwrap_err();
        assert!(matches!(
            err,
            AddressError::UnexpectedPort {
                family: Family::V6,
                ..
            }
        ));
    }

    #[test]
    fn test_unexpected_interface_and_port() {
        let err = classify(&set(&["127.0.0.1:8080"]), 5000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "container listening on unexpected IPv4 interface with an unexpected port: expected=0.0.0.0:5000 actual=127.0.0.1:8080"
        );

        let err = classify(&set(&["fe80::1:8080"]), 5000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "container listening on unexpected IPv6 interface with an unexpected port: expected=:::5000 actual=fe80::1:8080"
        );
    }

    #[test]
    fn test_invalid_address() {
        for address in ["localhost:5000", "0.0.0.0:http", "nonsense", "1.2.3.4:99999"] {
            let err = classify(&set(&[address]), 5000).unwrap_err();
            assert_eq!(err, AddressError::InvalidAddress(address.to_string()));
        }
    }

    #[test]
    fn test_parse_listening_netstat_output() {
        let output = "\
Active Internet connections (servers and established)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 0.0.0.0:5000            0.0.0.0:*               LISTEN      1/python
tcp        0      0 172.17.0.2:5000         172.17.0.1:40000        ESTABLISHED 1/python
tcp6       0      0 :::8080                 :::*                    LISTEN      7/node
";
        assert_eq!(parse_listening(output), set(&["0.0.0.0:5000", ":::8080"]));
    }

    #[quickcheck]
    fn prop_wildcards_always_pass(port: u16, others: Vec<u16>) -> bool {
        let mut addresses: BTreeSet<String> =
            others.iter().map(|p| format!("127.0.0.1:{p}")).collect();
        addresses.insert(format!("0.0.0.0:{port}"));
        classify(&addresses, port).is_ok()
    }
}
