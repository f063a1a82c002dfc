//! Parser for legacy `CHECKS` files.
//!
//! Each non-comment line is either a setting (`ATTEMPTS=`, `TIMEOUT=`,
//! `WAIT=`) that applies to every check, or `<path> [expected content]`.
//! A path may carry a scheme and host, e.g. `https://example.com/health`.

use crate::appjson::{HealthcheckEntry, HttpHeader};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("error parsing {setting} value at line {line}: {value:?}")]
    InvalidSetting {
        setting: &'static str,
        line: usize,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Check {
    path: String,
    content: String,
    host: String,
    scheme: &'static str,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChecksFile {
    checks: Vec<Check>,
    attempts: i64,
    timeout: i64,
    wait: i64,
}

impl ChecksFile {
    pub fn parse(contents: &str) -> Result<Self, ConvertError> {
        let mut file = Self::default();
        for (index, raw) in contents.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            if let Some(value) = line.strip_prefix("ATTEMPTS=") {
                file.attempts = parse_setting("ATTEMPTS", index + 1, value)?;
            } else if let Some(value) = line.strip_prefix("TIMEOUT=") {
                file.timeout = parse_setting("TIMEOUT", index + 1, value)?;
            } else if let Some(value) = line.strip_prefix("WAIT=") {
                file.wait = parse_setting("WAIT", index + 1, value)?;
            } else {
                file.checks.push(parse_check(line));
            }
        }
        Ok(file)
    }

    /// Startup path checks named `check-1`, `check-2`, ... in file order.
    pub fn to_healthchecks(&self) -> Vec<HealthcheckEntry> {
        let setting = |value: i64| (value != 0).then_some(value);
        self.checks
            .iter()
            .enumerate()
            .map(|(index, check)| {
                let mut http_headers = Vec::new();
                if !check.host.is_empty() {
                    http_headers.push(HttpHeader {
                        name: "Host".to_string(),
                        value: check.host.clone(),
                    });
                }

                HealthcheckEntry {
                    attempts: setting(self.attempts),
                    content: check.content.clone(),
                    http_headers,
                    name: format!("check-{}", index + 1),
                    path: check.path.clone(),
                    scheme: match check.scheme {
                        "http" => String::new(),
                        other => other.to_string(),
                    },
                    timeout: setting(self.timeout),
                    check_type: "startup".to_string(),
                    wait: setting(self.wait),
                    ..Default::default()
                }
            })
            .collect()
    }
}

fn parse_setting(setting: &'static str, line: usize, value: &str) -> Result<i64, ConvertError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConvertError::InvalidSetting {
            setting,
            line,
            value: value.to_string(),
        })
}

fn parse_check(line: &str) -> Check {
    let (target, content) = line.split_once(' ').unwrap_or((line, ""));

    let (scheme, target) = if target.starts_with("https://") {
        ("https", &target["https:".len()..])
    } else if target.starts_with("http://") {
        ("http", &target["http:".len()..])
    } else {
        ("http", target)
    };

    let (host, path) = match target.strip_prefix("//") {
        Some(rest) => {
            let end = rest.find(['/', '?']).unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        }
        None => ("", target),
    };

    Check {
        path: path.to_string(),
        content: content.to_string(),
        host: host.to_string(),
        scheme,
    }
}
