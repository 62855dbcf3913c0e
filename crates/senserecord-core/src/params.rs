//! Driver connection settings
//!
//! Every recognized setting is a named field. Unknown keys are rejected both
//! when deserializing (`deny_unknown_fields`) and when building from loose
//! key/value pairs such as query strings or `-p key=value` CLI flags.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Transport used by network-attached boards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpProtocol {
    None,
    Udp,
    Tcp,
}

impl FromStr for IpProtocol {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(SessionError::InvalidParameter(format!(
                "ip_protocol must be one of none, udp, tcp (got {other})"
            ))),
        }
    }
}

/// Connection overrides passed to the board driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_protocol: Option<IpProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_info: Option<String>,
    /// Discovery timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ConnectionParams {
    /// Build from loose key/value pairs, rejecting unrecognized keys
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.set(key.as_ref(), value.as_ref())?;
        }
        Ok(params)
    }

    /// Set one field by name
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        let value = value.trim();
        match key {
            "serial_port" => self.serial_port = Some(value.to_string()),
            "mac_address" => self.mac_address = Some(value.to_string()),
            "ip_address" => self.ip_address = Some(value.to_string()),
            "ip_port" => self.ip_port = Some(parse_number(key, value)?),
            "ip_protocol" => self.ip_protocol = Some(value.parse()?),
            "other_info" => self.other_info = Some(value.to_string()),
            "timeout" => self.timeout = Some(parse_number(key, value)?),
            "serial_number" => self.serial_number = Some(value.to_string()),
            "file" => self.file = Some(value.to_string()),
            unknown => {
                return Err(SessionError::InvalidParameter(format!(
                    "unrecognized board parameter '{unknown}'"
                )))
            }
        }
        Ok(())
    }

    /// Parse a `key=value` CLI argument
    pub fn parse_assignment(arg: &str) -> Result<(String, String), SessionError> {
        arg.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .ok_or_else(|| {
                SessionError::InvalidParameter(format!("expected key=value, got '{arg}'"))
            })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, SessionError> {
    value.parse().map_err(|_| {
        SessionError::InvalidParameter(format!("{key} must be a number (got '{value}')"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_sets_named_fields() {
        let params = ConnectionParams::from_pairs([
            ("serial_port", "/dev/ttyUSB0"),
            ("ip_port", "6677"),
            ("ip_protocol", "TCP"),
            ("timeout", "15"),
        ])
        .unwrap();
        assert_eq!(params.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(params.ip_port, Some(6677));
        assert_eq!(params.ip_protocol, Some(IpProtocol::Tcp));
        assert_eq!(params.timeout, Some(15));
        assert!(!params.is_empty());
    }

    #[test]
    fn test_from_pairs_rejects_unknown_key() {
        let err = ConnectionParams::from_pairs([("serialport", "/dev/ttyUSB0")]).unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter(_)));
        assert!(err.to_string().contains("serialport"));
    }

    #[test]
    fn test_from_pairs_rejects_bad_number() {
        assert!(ConnectionParams::from_pairs([("ip_port", "abc")]).is_err());
        assert!(ConnectionParams::from_pairs([("ip_port", "70000")]).is_err());
    }

    #[test]
    fn test_deserialize_rejects_unknown_key() {
        let result: Result<ConnectionParams, _> =
            serde_json::from_str(r#"{"serial_port": "COM3", "baud": 9600}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_json_is_default() {
        let params: ConnectionParams = serde_json::from_str("{}").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_assignment() {
        let (k, v) = ConnectionParams::parse_assignment("mac_address=aa:bb:cc").unwrap();
        assert_eq!(k, "mac_address");
        assert_eq!(v, "aa:bb:cc");
        assert!(ConnectionParams::parse_assignment("mac_address").is_err());
    }
}
