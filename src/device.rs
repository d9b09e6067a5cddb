//! Managed device records.
//!
//! A [`Device`] is the identity and credentials for one host. Its serialized
//! form uses the field names `name`, `ip`, `user`, `password` and `os`, which is
//! the persisted layout shared with existing inventory files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// A required attribute was empty.
    #[error("Device field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// One managed host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    /// Unique name within the registry.
    pub name: String,
    /// IPv4/IPv6 literal or hostname.
    #[serde(rename = "ip")]
    pub address: String,
    /// Login username.
    #[serde(rename = "user")]
    pub username: String,
    /// Login password, kept in plaintext once decrypted.
    pub password: String,
    /// Vendor/OS profile, e.g. `cisco_ios`.
    #[serde(rename = "os")]
    pub os_type: String,
}

impl Device {
    /// Creates a device, rejecting empty attributes.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        os_type: impl Into<String>,
    ) -> Result<Self, DeviceError> {
        let device = Self {
            name: name.into(),
            address: address.into(),
            username: username.into(),
            password: password.into(),
            os_type: os_type.into(),
        };
        device.validate()?;
        Ok(device)
    }

    /// Checks that every attribute is present.
    pub fn validate(&self) -> Result<(), DeviceError> {
        let fields = [
            ("name", &self.name),
            ("ip", &self.address),
            ("user", &self.username),
            ("password", &self.password),
            ("os", &self.os_type),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(DeviceError::EmptyField(field));
            }
        }
        Ok(())
    }

    /// Returns the SSH dialect selected by this device's OS type.
    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        // Parsing never fails; unknown names become `Other`.
        match self.os_type.parse() {
            Ok(device_type) => device_type,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"********")
            .field("os_type", &self.os_type)
            .finish()
    }
}

/// SSH dialect / vendor profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Cisco IOS.
    CiscoIos,
    /// Cisco IOS-XE.
    CiscoXe,
    /// Cisco NX-OS.
    CiscoNxos,
    /// Cisco ASA.
    CiscoAsa,
    /// Juniper Junos.
    JuniperJunos,
    /// Arista EOS.
    AristaEos,
    /// HP ProCurve.
    HpProcurve,
    /// Generic Linux/Unix host.
    Linux,
    /// Any other profile, kept verbatim.
    Other(String),
}

impl DeviceType {
    /// Returns the dialect token handed to the SSH client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CiscoIos => "cisco_ios",
            Self::CiscoXe => "cisco_xe",
            Self::CiscoNxos => "cisco_nxos",
            Self::CiscoAsa => "cisco_asa",
            Self::JuniperJunos => "juniper_junos",
            Self::AristaEos => "arista_eos",
            Self::HpProcurve => "hp_procurve",
            Self::Linux => "linux",
            Self::Other(name) => name,
        }
    }

    /// Returns true for network operating systems driven through an interactive CLI.
    #[must_use]
    pub fn is_network_cli(&self) -> bool {
        !matches!(self, Self::Linux | Self::Other(_))
    }

    /// Command that turns off output paging on this dialect, if any.
    #[must_use]
    pub fn paging_command(&self) -> Option<&'static str> {
        match self {
            Self::CiscoIos | Self::CiscoXe | Self::CiscoNxos | Self::AristaEos => {
                Some("terminal length 0")
            }
            Self::CiscoAsa => Some("terminal pager 0"),
            Self::JuniperJunos => Some("set cli screen-length 0"),
            Self::HpProcurve => Some("no page"),
            Self::Linux | Self::Other(_) => None,
        }
    }
}

impl FromStr for DeviceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "cisco_ios" | "ios" => Self::CiscoIos,
            "cisco_xe" | "ios_xe" => Self::CiscoXe,
            "cisco_nxos" | "nxos" => Self::CiscoNxos,
            "cisco_asa" | "asa" => Self::CiscoAsa,
            "juniper_junos" | "juniper" | "junos" => Self::JuniperJunos,
            "arista_eos" | "eos" => Self::AristaEos,
            "hp_procurve" | "procurve" => Self::HpProcurve,
            "linux" => Self::Linux,
            _ => Self::Other(s.trim().to_string()),
        })
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
