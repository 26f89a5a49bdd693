//! Load balancer and member models

use serde::{Deserialize, Serialize};

/// The only protocol Concerto load balancers speak
pub const PROTOCOL_TCP: &str = "tcp";

/// A Concerto TCP load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Assigned by Concerto on creation; empty before that
    #[serde(default, alias = "Id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fqdn: String,
    /// Port exposed by the load balancer
    #[serde(default)]
    pub port: u16,
    /// Port on each backend node the traffic is sent to
    #[serde(default, rename = "nodeport")]
    pub node_port: u16,
    #[serde(default)]
    pub protocol: String,
}

impl LoadBalancer {
    /// A load balancer ready to be created, named and addressed by `name`
    pub fn new(name: impl Into<String>, port: u16, node_port: u16) -> Self {
        let name = name.into();
        Self {
            id: String::new(),
            fqdn: name.clone(),
            name,
            port,
            node_port,
            protocol: PROTOCOL_TCP.to_string(),
        }
    }

    /// Externally visible status
    pub fn status(&self) -> LoadBalancerStatus {
        LoadBalancerStatus {
            ingress: vec![LoadBalancerIngress {
                hostname: self.fqdn.clone(),
            }],
        }
    }

    /// Overwrite every field the remote sent back, keep the others
    pub(crate) fn merge(&mut self, record: LoadBalancerRecord) {
        if let Some(id) = record.id {
            self.id = id;
        }
        if let Some(name) = record.name {
            self.name = name;
        }
        if let Some(fqdn) = record.fqdn {
            self.fqdn = fqdn;
        }
        if let Some(port) = record.port {
            self.port = port;
        }
        if let Some(node_port) = record.node_port {
            self.node_port = node_port;
        }
        if let Some(protocol) = record.protocol {
            self.protocol = protocol;
        }
    }
}

/// Partial load balancer as returned by the create call
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LoadBalancerRecord {
    #[serde(alias = "Id")]
    id: Option<String>,
    name: Option<String>,
    fqdn: Option<String>,
    port: Option<u16>,
    #[serde(rename = "nodeport")]
    node_port: Option<u16>,
    protocol: Option<String>,
}

/// One backend node registered with a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Node id assigned by Concerto; never sent on registration
    #[serde(default, alias = "ID", alias = "Id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "public_ip", default)]
    pub address: String,
}

impl Member {
    /// A member record registering `address`
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            address: address.into(),
        }
    }
}

/// Status reported to the orchestrator for a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadBalancerStatus {
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerIngress {
    pub hostname: String,
}

impl LoadBalancerStatus {
    /// First ingress hostname, if any
    pub fn hostname(&self) -> Option<&str> {
        self.ingress.first().map(|i| i.hostname.as_str())
    }
}
