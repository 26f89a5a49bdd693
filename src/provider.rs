//! Orchestrator-facing provider
//!
//! [`ConcertoCloud`] answers the orchestrator's instance and TCP load balancer
//! questions. Hosts obtain one through a [`ProviderFactory`] instead of a
//! global registry.

use std::collections::BTreeSet;
use std::net::IpAddr;

use regex::Regex;
use tracing::{debug, info};

use crate::client::{CloudApi, RestCloudApi};
use crate::config::ProviderConfig;
use crate::models::{Instance, LoadBalancerStatus};
use crate::reconciler::{
    check_capabilities, EnsureRequest, LoadBalancerReconciler, MembershipDiff, SessionAffinity,
};
use crate::rest::HttpTransport;
use crate::{Capability, Error, Result};

/// Name the provider is known by
pub const PROVIDER_NAME: &str = "concerto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    ExternalIp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub kind: AddressKind,
    pub address: IpAddr,
}

/// Capacity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeResources {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

/// One port of a service exposed through a load balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePort {
    pub port: u16,
    pub node_port: u16,
}

/// Concerto cloud provider
pub struct ConcertoCloud<A = RestCloudApi<HttpTransport>> {
    reconciler: LoadBalancerReconciler<A>,
}

impl ConcertoCloud {
    /// Provider talking HTTPS to the configured endpoint
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let api = RestCloudApi::from_config(&config.connection)?;
        info!(endpoint = %config.connection.api_endpoint, "Concerto provider initialized");
        Ok(Self::new(api))
    }
}

impl<A: CloudApi> ConcertoCloud<A> {
    pub fn new(api: A) -> Self {
        Self {
            reconciler: LoadBalancerReconciler::new(api),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    pub fn api(&self) -> &A {
        self.reconciler.api()
    }

    /// Full instance record for a host name
    pub fn instance(&self, name: &str) -> Result<Instance> {
        self.api().find_instance_by_name(name)
    }

    pub fn node_addresses(&self, name: &str) -> Result<Vec<NodeAddress>> {
        debug!(instance = %name, "Node addresses requested");
        let instance = self.instance(name)?;
        let address = instance.address.parse::<IpAddr>().map_err(|_| {
            Error::InvalidAddress(format!("'{}' of instance {}", instance.address, name))
        })?;

        Ok(vec![NodeAddress {
            kind: AddressKind::ExternalIp,
            address,
        }])
    }

    pub fn instance_id(&self, name: &str) -> Result<String> {
        Ok(self.instance(name)?.id)
    }

    /// Same as [`instance_id`](Self::instance_id)
    pub fn external_id(&self, name: &str) -> Result<String> {
        self.instance_id(name)
    }

    /// Instances whose whole name matches the regular expression `filter`
    ///
    /// The expression is anchored at both ends, so `web` does not match
    /// `web-1`. This is stricter than an unanchored search on purpose.
    /// Lists the instances once.
    pub fn instances(&self, filter: &str) -> Result<Vec<Instance>> {
        let pattern = Regex::new(&format!("^(?:{})$", filter))?;

        let instances: Vec<Instance> = self
            .api()
            .list_instances()?
            .into_iter()
            .filter(|i| pattern.is_match(&i.name))
            .collect();

        debug!(filter = %filter, count = instances.len(), "Listed instances");
        Ok(instances)
    }

    /// Names of instances whose whole name matches the regular expression `filter`
    ///
    /// Substring matches do not count; see [`instances`](Self::instances).
    pub fn list(&self, filter: &str) -> Result<Vec<String>> {
        Ok(self.instances(filter)?.into_iter().map(|i| i.name).collect())
    }

    pub fn node_resources(&self, name: &str) -> Result<NodeResources> {
        let instance = self.instance(name)?;
        Ok(NodeResources {
            cpu_millicores: instance.cpu_millicores(),
            memory_bytes: instance.memory_bytes,
        })
    }

    /// Concerto node names are host names
    pub fn current_node_name(&self, hostname: &str) -> Result<String> {
        Ok(hostname.to_string())
    }

    pub fn add_ssh_key_to_all_instances(&self, _user: &str, _key: &[u8]) -> Result<()> {
        Err(Error::Unsupported(Capability::Operation(
            "add_ssh_key_to_all_instances",
        )))
    }

    pub fn get_tcp_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerStatus>> {
        self.reconciler.get(name)
    }

    /// Create or converge a single-port TCP load balancer over `hosts`
    pub fn ensure_tcp_load_balancer(
        &self,
        name: &str,
        external_ip: Option<IpAddr>,
        ports: &[ServicePort],
        hosts: &[String],
        affinity: SessionAffinity,
    ) -> Result<LoadBalancerStatus> {
        check_capabilities(affinity, external_ip)?;
        let [port] = ports else {
            return Err(Error::Unsupported(Capability::MultiplePorts));
        };

        let request = EnsureRequest::builder()
            .name(name)
            .port(port.port)
            .node_port(port.node_port)
            .affinity(affinity)
            .external_ip(external_ip)
            .hosts(hosts.iter().cloned())
            .build();

        self.reconciler.ensure(&request)
    }

    pub fn update_tcp_load_balancer(&self, name: &str, hosts: &[String]) -> Result<MembershipDiff> {
        let hosts: BTreeSet<String> = hosts.iter().cloned().collect();
        self.reconciler.update(name, &hosts)
    }

    pub fn ensure_tcp_load_balancer_deleted(&self, name: &str) -> Result<()> {
        self.reconciler.ensure_deleted(name)
    }
}

/// Builds providers from their configuration text
pub trait ProviderFactory {
    type Provider;

    fn provider_name(&self) -> &'static str;

    fn create(&self, config: &str) -> Result<Self::Provider>;
}

/// Factory for [`ConcertoCloud`] from a TOML configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcertoProviderFactory;

impl ProviderFactory for ConcertoProviderFactory {
    type Provider = ConcertoCloud;

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn create(&self, config: &str) -> Result<ConcertoCloud> {
        let config = ProviderConfig::from_toml(config)?;
        ConcertoCloud::from_config(&config)
    }
}
