//! Validated healthcheck definitions.
//!
//! A [`Healthcheck`] is built once from an app.json [`HealthcheckEntry`] by
//! [`Healthcheck::from_entry`]. The entry's optional kind fields collapse into a
//! single [`ProbeKind`], and every default is resolved through
//! [`ProbeDefaults`], so probes only ever see concrete values.

use std::str::FromStr;
use std::time::Duration;

use base64::Engine;

use crate::appjson::{HealthcheckEntry, OnFailure};

pub mod address;
pub mod on_failure;
pub mod probe;
pub mod retry;

/// Defaults applied to fields an entry leaves out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDefaults {
    pub attempts: u32,
    pub wait: Duration,
    pub timeout: Duration,
    pub initial_delay: Duration,
    /// Port used by path and listening checks that do not set one.
    pub port: u16,
    pub path: String,
    pub scheme: Scheme,
}

impl Default for ProbeDefaults {
    fn default() -> Self {
        Self {
            attempts: 3,
            wait: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            initial_delay: Duration::ZERO,
            port: 5000,
            path: "/".to_string(),
            scheme: Scheme::Http,
        }
    }
}

impl ProbeDefaults {
    /// Attempts to make; values of zero or below fall back to the default.
    pub fn attempts_for(&self, entry: &HealthcheckEntry) -> u32 {
        match entry.attempts {
            Some(attempts) if attempts > 0 => u32::try_from(attempts).unwrap_or(u32::MAX),
            _ => self.attempts.max(1),
        }
    }

    pub fn wait_for(&self, entry: &HealthcheckEntry) -> Duration {
        seconds_or(entry.wait, self.wait)
    }

    /// Per-attempt deadline. An explicit `0` disables it.
    pub fn timeout_for(&self, entry: &HealthcheckEntry) -> Option<Duration> {
        match entry.timeout {
            Some(0) => None,
            timeout => Some(seconds_or(timeout, self.timeout)),
        }
    }

    pub fn initial_delay_for(&self, entry: &HealthcheckEntry) -> Duration {
        seconds_or(entry.initial_delay, self.initial_delay)
    }
}

fn seconds_or(value: Option<i64>, default: Duration) -> Duration {
    match value {
        Some(seconds) if seconds >= 0 => Duration::from_secs(seconds as u64),
        _ => default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl FromStr for Scheme {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(DefinitionError::InvalidScheme(s.to_string())),
        }
    }
}

/// What a healthcheck probes. Exactly one per definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    Command {
        argv: Vec<String>,
    },
    Path {
        path: String,
        port: u16,
        scheme: Scheme,
        content: Option<String>,
        headers: Vec<(String, String)>,
    },
    Listening {
        port: u16,
    },
    Uptime {
        seconds: u64,
    },
}

impl ProbeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeKind::Command { .. } => "command",
            ProbeKind::Path { .. } => "path",
            ProbeKind::Listening { .. } => "listening",
            ProbeKind::Uptime { .. } => "uptime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Healthcheck {
    pub name: String,
    pub kind: ProbeKind,
    pub attempts: u32,
    pub wait: Duration,
    pub timeout: Option<Duration>,
    pub initial_delay: Duration,
    pub warn_only: bool,
    pub on_failure: Option<OnFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("healthcheck name='{name}' cannot contain both {first} and {second}")]
    ConflictingKinds {
        name: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("invalid scheme specified, must be either http or https: '{0}'")]
    InvalidScheme(String),
    #[error("invalid header, must be delimited by ':' (colon) character: '{0}'")]
    InvalidHeader(String),
    #[error("inspect container: container '{container}' not connected to network '{network}'")]
    UnknownNetwork { container: String, network: String },
}

impl Healthcheck {
    pub fn from_entry(
        entry: &HealthcheckEntry,
        defaults: &ProbeDefaults,
    ) -> Result<Self, DefinitionError> {
        validate(entry)?;

        let kind = if !entry.command.is_empty() {
            ProbeKind::Command {
                argv: entry.command.clone(),
            }
        } else if !entry.path.is_empty() {
            let scheme = match entry.scheme.as_str() {
                "" => defaults.scheme,
                scheme => scheme.parse()?,
            };
            ProbeKind::Path {
                path: entry.path.clone(),
                port: entry.port.unwrap_or(defaults.port),
                scheme,
                content: Some(entry.content.clone()).filter(|c| !c.is_empty()),
                headers: entry
                    .http_headers
                    .iter()
                    .map(|h| (h.name.clone(), h.value.clone()))
                    .collect(),
            }
        } else if entry.listening {
            ProbeKind::Listening {
                port: entry.port.unwrap_or(defaults.port),
            }
        } else {
            // No kind field at all still verifies the container is up.
            ProbeKind::Uptime {
                seconds: entry.uptime.unwrap_or(0).max(0) as u64,
            }
        };

        Ok(Self {
            name: derive_name(entry),
            kind,
            attempts: defaults.attempts_for(entry),
            wait: defaults.wait_for(entry),
            timeout: defaults.timeout_for(entry),
            initial_delay: defaults.initial_delay_for(entry),
            warn_only: entry.warn,
            on_failure: entry.on_failure.clone(),
        })
    }

    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// The entry's name, or base64 of its JSON form when it has none.
///
/// Structurally identical unnamed entries always get the same name.
pub fn derive_name(entry: &HealthcheckEntry) -> String {
    if !entry.name.is_empty() {
        return entry.name.clone();
    }
    let encoded = serde_json::to_vec(entry).unwrap_or_default();
    base64::prelude::BASE64_STANDARD.encode(encoded)
}

/// Rejects entries that set more than one kind field.
///
/// The pair reported is the first two set fields in the order
/// command, path, uptime, listening.
pub fn validate(entry: &HealthcheckEntry) -> Result<(), DefinitionError> {
    let set = [
        (!entry.command.is_empty(), "a container 'command' to execute"),
        (!entry.path.is_empty(), "an http 'path' to check"),
        (entry.uptime.is_some_and(|u| u > 0), "an 'uptime' seconds value"),
        (entry.listening, "a 'listening' true value"),
    ];
    let mut conflicting = set.iter().filter(|(is_set, _)| *is_set).map(|(_, d)| *d);

    match (conflicting.next(), conflicting.next()) {
        (Some(first), Some(second)) => Err(DefinitionError::ConflictingKinds {
            name: derive_name(entry),
            first,
            second,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appjson::HttpHeader;
    use quickcheck_macros::quickcheck;

    fn entry() -> HealthcheckEntry {
        HealthcheckEntry::default()
    }

    #[test]
    fn test_defaults_apply() {
        let defaults = ProbeDefaults::default();
        let check = Healthcheck::from_entry(&entry(), &defaults).unwrap();
        assert_eq!(check.attempts, 3);
        assert_eq!(check.retries(), 2);
        assert_eq!(check.wait, Duration::from_secs(5));
        assert_eq!(check.timeout, Some(Duration::from_secs(5)));
        assert_eq!(check.initial_delay, Duration::ZERO);
        assert_eq!(check.kind, ProbeKind::Uptime { seconds: 0 });
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let defaults = ProbeDefaults::default();
        let e = HealthcheckEntry {
            timeout: Some(0),
            wait: Some(0),
            ..entry()
        };
        assert_eq!(defaults.timeout_for(&e), None);
        assert_eq!(defaults.wait_for(&e), Duration::ZERO);

        let e = HealthcheckEntry {
            timeout: Some(-4),
            wait: Some(-1),
            ..entry()
        };
        assert_eq!(defaults.timeout_for(&e), Some(Duration::from_secs(5)));
        assert_eq!(defaults.wait_for(&e), Duration::from_secs(5));
    }

    #[test]
    fn test_path_kind() {
        let e = HealthcheckEntry {
            path: "/health".to_string(),
            scheme: "HTTPS".to_string(),
            content: "ok".to_string(),
            http_headers: vec![HttpHeader {
                name: "Host".to_string(),
                value: "example.com".to_string(),
            }],
            ..entry()
        };
        let check = Healthcheck::from_entry(&e, &ProbeDefaults::default()).unwrap();
        assert_eq!(
            check.kind,
            ProbeKind::Path {
                path: "/health".to_string(),
                port: 5000,
                scheme: Scheme::Https,
                content: Some("ok".to_string()),
                headers: vec![("Host".to_string(), "example.com".to_string())],
            }
        );
    }

    #[test]
    fn test_invalid_scheme_is_rejected() {
        let e = HealthcheckEntry {
            path: "/".to_string(),
            scheme: "ftp".to_string(),
            ..entry()
        };
        let res = Healthcheck::from_entry(&e, &ProbeDefaults::default());
        assert!(matches!(res, Err(DefinitionError::InvalidScheme(_))), "{:?}", res);
    }

    #[test]
    fn test_listening_uses_default_port() {
        let e = HealthcheckEntry {
            listening: true,
            ..entry()
        };
        let defaults = ProbeDefaults {
            port: 8080,
            ..Default::default()
        };
        let check = Healthcheck::from_entry(&e, &defaults).unwrap();
        assert_eq!(check.kind, ProbeKind::Listening { port: 8080 });
    }

    #[test]
    fn test_conflicting_kinds_name_first_two_fields() {
        let cases = [
            (
                HealthcheckEntry {
                    command: vec!["true".to_string()],
                    path: "/".to_string(),
                    listening: true,
                    ..entry()
                },
                ("a container 'command' to execute", "an http 'path' to check"),
            ),
            (
                HealthcheckEntry {
                    command: vec!["true".to_string()],
                    listening: true,
                    ..entry()
                },
                ("a container 'command' to execute", "a 'listening' true value"),
            ),
            (
                HealthcheckEntry {
                    path: "/".to_string(),
                    uptime: Some(3),
                    listening: true,
                    ..entry()
                },
                ("an http 'path' to check", "an 'uptime' seconds value"),
            ),
            (
                HealthcheckEntry {
                    uptime: Some(3),
                    listening: true,
                    ..entry()
                },
                ("an 'uptime' seconds value", "a 'listening' true value"),
            ),
        ];

        for (e, (first_expected, second_expected)) in cases {
            match validate(&e) {
                Err(DefinitionError::ConflictingKinds {
                    name,
                    first,
                    second,
                }) => {
                    assert_eq!(name, derive_name(&e));
                    assert_eq!(first, first_expected);
                    assert_eq!(second, second_expected);
                }
                other => panic!("expected conflict, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_conflict_message_names_healthcheck() {
        let e = HealthcheckEntry {
            name: "web".to_string(),
            path: "/".to_string(),
            listening: true,
            ..entry()
        };
        let err = validate(&e).unwrap_err();
        assert_eq!(
            err.to_string(),
            "healthcheck name='web' cannot contain both an http 'path' to check and a 'listening' true value"
        );
    }

    #[test]
    fn test_zero_uptime_does_not_conflict() {
        let e = HealthcheckEntry {
            uptime: Some(0),
            listening: true,
            ..entry()
        };
        assert!(validate(&e).is_ok());
    }

    #[test]
    fn test_explicit_name_wins() {
        let e = HealthcheckEntry {
            name: "custom".to_string(),
            uptime: Some(1),
            ..entry()
        };
        assert_eq!(derive_name(&e), "custom");
    }

    #[test]
    fn test_derived_name_is_base64_json() {
        let e = HealthcheckEntry {
            uptime: Some(1),
            ..entry()
        };
        let decoded = base64::prelude::BASE64_STANDARD
            .decode(derive_name(&e))
            .unwrap();
        assert_eq!(decoded, br#"{"uptime":1}"#);
    }

    #[quickcheck]
    fn prop_derived_name_is_stable(path: String, port: Option<u16>, attempts: Option<i64>) -> bool {
        let a = HealthcheckEntry {
            path: path.clone(),
            port,
            attempts,
            ..entry()
        };
        let b = a.clone();
        derive_name(&a) == derive_name(&b)
    }

    #[quickcheck]
    fn prop_derived_name_tracks_fields(port_a: u16, port_b: u16) -> bool {
        let a = HealthcheckEntry {
            port: Some(port_a),
            ..entry()
        };
        let b = HealthcheckEntry {
            port: Some(port_b),
            ..entry()
        };
        (port_a == port_b) == (derive_name(&a) == derive_name(&b))
    }

    #[quickcheck]
    fn prop_retries_are_attempts_minus_one(attempts: Option<i64>) -> bool {
        let defaults = ProbeDefaults::default();
        let e = HealthcheckEntry {
            attempts,
            ..entry()
        };
        let effective = defaults.attempts_for(&e);
        let expected = match attempts {
            Some(a) if a > 0 => effective as i64 == a.min(u32::MAX as i64),
            _ => effective == 3,
        };
        let check = Healthcheck::from_entry(&e, &defaults).unwrap();
        expected && check.retries() == effective - 1
    }
}
