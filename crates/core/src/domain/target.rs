// Target Domain Model
// The remote entity (device or server) a step acts upon. Owned by the job engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Target descriptor handed to a runner by reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "FQDN", default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,

    #[serde(rename = "PrimaryIPv4", default, skip_serializing_if = "Option::is_none")]
    pub primary_ipv4: Option<Ipv4Addr>,

    #[serde(rename = "PrimaryIPv6", default, skip_serializing_if = "Option::is_none")]
    pub primary_ipv6: Option<Ipv6Addr>,
}

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fqdn: None,
            primary_ipv4: None,
            primary_ipv6: None,
        }
    }

    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = Some(fqdn.into());
        self
    }

    pub fn with_ipv4(mut self, addr: Ipv4Addr) -> Self {
        self.primary_ipv4 = Some(addr);
        self
    }

    /// Look up an attribute by its template field name (`ID`, `FQDN`, ...)
    pub fn attribute(&self, field: &str) -> Option<String> {
        match field {
            "ID" => Some(self.id.clone()),
            "FQDN" => self.fqdn.clone(),
            "PrimaryIPv4" => self.primary_ipv4.map(|a| a.to_string()),
            "PrimaryIPv6" => self.primary_ipv6.map(|a| a.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target{{ID: {:?}", self.id)?;
        if let Some(fqdn) = &self.fqdn {
            write!(f, ", FQDN: {:?}", fqdn)?;
        }
        write!(f, "}}")
    }
}
