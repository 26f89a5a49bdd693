//! Load balancer reconciliation
//!
//! [`LoadBalancerReconciler`] converges a load balancer's registered backends
//! onto a desired set of hosts. It keeps no state between calls: every
//! operation looks the load balancer up by name and re-lists its members, so a
//! call interrupted halfway is repaired by the next one.
//!
//! Membership changes are applied removals first, then additions, one call at
//! a time. The first failure stops the run and is returned as is; nothing is
//! rolled back.

use std::collections::BTreeSet;
use std::net::IpAddr;

use tracing::{debug, error, info};

use crate::client::CloudApi;
use crate::models::{LoadBalancer, LoadBalancerStatus};
use crate::resolver::AddressResolver;
use crate::{Capability, Error, Result};

/// Session affinity requested for a load balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionAffinity {
    #[default]
    None,
    ClientIp,
}

/// Desired state of one TCP load balancer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureRequest {
    pub name: String,
    pub port: u16,
    pub node_port: u16,
    pub affinity: SessionAffinity,
    pub external_ip: Option<IpAddr>,
    /// Host names whose instances should be registered
    pub hosts: BTreeSet<String>,
}

impl EnsureRequest {
    pub fn builder() -> EnsureRequestBuilder {
        EnsureRequestBuilder::default()
    }
}

#[derive(Default)]
pub struct EnsureRequestBuilder {
    name: String,
    port: u16,
    node_port: u16,
    affinity: SessionAffinity,
    external_ip: Option<IpAddr>,
    hosts: BTreeSet<String>,
}

impl EnsureRequestBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn node_port(mut self, node_port: u16) -> Self {
        self.node_port = node_port;
        self
    }

    pub fn affinity(mut self, affinity: SessionAffinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn external_ip(mut self, ip: impl Into<Option<IpAddr>>) -> Self {
        self.external_ip = ip.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.insert(host.into());
        self
    }

    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> EnsureRequest {
        EnsureRequest {
            name: self.name,
            port: self.port,
            node_port: self.node_port,
            affinity: self.affinity,
            external_ip: self.external_ip,
            hosts: self.hosts,
        }
    }
}

/// Reject options Concerto load balancers cannot honor
pub(crate) fn check_capabilities(
    affinity: SessionAffinity,
    external_ip: Option<IpAddr>,
) -> Result<()> {
    if affinity != SessionAffinity::None {
        return Err(Error::Unsupported(Capability::SessionAffinity));
    }
    if external_ip.is_some() {
        return Err(Error::Unsupported(Capability::ExternalIp));
    }
    Ok(())
}

/// Register/deregister plan between actual and desired addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_remove: BTreeSet<String>,
    pub to_add: BTreeSet<String>,
}

impl MembershipDiff {
    pub fn between(actual: &BTreeSet<String>, desired: &BTreeSet<String>) -> Self {
        Self {
            to_remove: actual.difference(desired).cloned().collect(),
            to_add: desired.difference(actual).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    /// Number of mutating calls the plan needs
    pub fn len(&self) -> usize {
        self.to_remove.len() + self.to_add.len()
    }
}

/// Converges load balancers on a [`CloudApi`]
pub struct LoadBalancerReconciler<A> {
    api: A,
}

impl<A: CloudApi> LoadBalancerReconciler<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Status of the named load balancer, `None` if it does not exist
    pub fn get(&self, name: &str) -> Result<Option<LoadBalancerStatus>> {
        Ok(self
            .api
            .find_load_balancer_by_name(name)?
            .map(|lb| lb.status()))
    }

    /// Create the load balancer or bring its members in line with `request`
    pub fn ensure(&self, request: &EnsureRequest) -> Result<LoadBalancerStatus> {
        check_capabilities(request.affinity, request.external_ip)?;

        let lb = match self.api.find_load_balancer_by_name(&request.name)? {
            Some(lb) => {
                debug!(load_balancer = %request.name, id = %lb.id, "Load balancer exists, updating");
                self.update(&request.name, &request.hosts)?;
                lb
            }
            None => self.create(request)?,
        };

        Ok(lb.status())
    }

    fn create(&self, request: &EnsureRequest) -> Result<LoadBalancer> {
        let lb = self
            .api
            .create_load_balancer(&request.name, request.port, request.node_port)?;

        let addresses = AddressResolver::new(&self.api).resolve(&request.hosts)?;
        for address in &addresses {
            self.api.add_member(&lb.id, address).map_err(|e| {
                error!(load_balancer = %request.name, address = %address, error = %e, "Failed to register node on new load balancer");
                e
            })?;
        }

        info!(load_balancer = %request.name, id = %lb.id, nodes = addresses.len(), "Load balancer provisioned");
        Ok(lb)
    }

    /// Register and deregister nodes until the members match `hosts`
    ///
    /// Returns the plan that was applied.
    pub fn update(&self, name: &str, hosts: &BTreeSet<String>) -> Result<MembershipDiff> {
        let lb = self
            .api
            .find_load_balancer_by_name(name)?
            .ok_or_else(|| Error::NotFound(format!("load balancer {}", name)))?;

        let actual: BTreeSet<String> = self
            .api
            .list_members(&lb.id)?
            .into_iter()
            .map(|m| m.address)
            .collect();
        let desired = AddressResolver::new(&self.api).resolve(hosts)?;

        let diff = MembershipDiff::between(&actual, &desired);
        if diff.is_empty() {
            debug!(load_balancer = %name, nodes = actual.len(), "Load balancer members up to date");
        } else {
            info!(
                load_balancer = %name,
                remove = ?diff.to_remove,
                add = ?diff.to_add,
                "Reconciling load balancer members"
            );
        }

        for address in &diff.to_remove {
            self.api.remove_member(&lb.id, address).map_err(|e| {
                error!(load_balancer = %name, address = %address, error = %e, "Failed to deregister node");
                e
            })?;
        }
        for address in &diff.to_add {
            self.api.add_member(&lb.id, address).map_err(|e| {
                error!(load_balancer = %name, address = %address, error = %e, "Failed to register node");
                e
            })?;
        }

        Ok(diff)
    }

    /// Delete the named load balancer; a missing one is not an error
    pub fn ensure_deleted(&self, name: &str) -> Result<()> {
        match self.api.find_load_balancer_by_name(name)? {
            Some(lb) => {
                self.api.delete_load_balancer(&lb.id)?;
                info!(load_balancer = %name, id = %lb.id, "Load balancer removed");
            }
            None => debug!(load_balancer = %name, "Load balancer already absent"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCloudApi;
    use crate::models::{Instance, Member};
    use crate::RemoteOperation;
    use mockall::Sequence;

    fn instance(name: &str, address: &str) -> Instance {
        Instance {
            id: format!("id-{}", name),
            name: name.to_string(),
            address: address.to_string(),
            cpus: 2.0,
            memory_bytes: 0,
            storage_bytes: 0,
        }
    }

    fn fleet() -> Vec<Instance> {
        vec![
            instance("node-a", "1.2.3.4"),
            instance("node-b", "5.6.7.8"),
            instance("node-c", "9.9.9.9"),
        ]
    }

    fn existing(name: &str) -> LoadBalancer {
        let mut lb = LoadBalancer::new(name, 80, 30080);
        lb.id = "lb-1".to_string();
        lb.fqdn = format!("{}.lb.example.com", name);
        lb
    }

    fn member(id: &str, address: &str) -> Member {
        Member {
            id: id.to_string(),
            address: address.to_string(),
        }
    }

    fn hosts(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_diff_between() {
        let actual = hosts(&["1.2.3.4", "5.6.7.8"]);
        let desired = hosts(&["5.6.7.8", "9.9.9.9"]);

        let diff = MembershipDiff::between(&actual, &desired);
        assert_eq!(diff.to_remove, hosts(&["1.2.3.4"]));
        assert_eq!(diff.to_add, hosts(&["9.9.9.9"]));
        assert_eq!(diff.len(), 2);
        assert!(MembershipDiff::between(&desired, &desired).is_empty());
    }

    #[test]
    fn test_ensure_rejects_affinity_without_remote_calls() {
        let reconciler = LoadBalancerReconciler::new(MockCloudApi::new());
        let request = EnsureRequest::builder()
            .name("web")
            .port(80)
            .node_port(30080)
            .affinity(SessionAffinity::ClientIp)
            .build();

        let err = reconciler.ensure(&request).unwrap_err();
        assert!(matches!(err, Error::Unsupported(Capability::SessionAffinity)));
    }

    #[test]
    fn test_ensure_rejects_external_ip_without_remote_calls() {
        let reconciler = LoadBalancerReconciler::new(MockCloudApi::new());
        let request = EnsureRequest::builder()
            .name("web")
            .external_ip("10.0.0.9".parse::<IpAddr>().unwrap())
            .build();

        let err = reconciler.ensure(&request).unwrap_err();
        assert!(matches!(err, Error::Unsupported(Capability::ExternalIp)));
    }

    #[test]
    fn test_ensure_creates_and_registers_hosts() {
        let mut api = MockCloudApi::new();
        let mut seq = Sequence::new();
        api.expect_find_load_balancer_by_name()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        api.expect_create_load_balancer()
            .withf(|name, port, node_port| name == "web" && *port == 80 && *node_port == 30080)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, _, _| Ok(existing(name)));
        api.expect_list_instances()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(fleet()));
        api.expect_add_member()
            .withf(|id, address| id == "lb-1" && address == "1.2.3.4")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_add_member()
            .withf(|id, address| id == "lb-1" && address == "5.6.7.8")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let reconciler = LoadBalancerReconciler::new(api);
        let request = EnsureRequest::builder()
            .name("web")
            .port(80)
            .node_port(30080)
            .hosts(["node-a", "node-b"])
            .build();

        let status = reconciler.ensure(&request).unwrap();
        assert_eq!(status.hostname(), Some("web.lb.example.com"));
    }

    #[test]
    fn test_ensure_create_without_hosts_skips_listing() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name().returning(|_| Ok(None));
        api.expect_create_load_balancer()
            .times(1)
            .returning(|name, _, _| Ok(existing(name)));
        api.expect_list_instances().times(0);
        api.expect_add_member().times(0);

        let reconciler = LoadBalancerReconciler::new(api);
        let request = EnsureRequest::builder().name("web").port(80).node_port(30080).build();
        assert!(reconciler.ensure(&request).is_ok());
    }

    #[test]
    fn test_ensure_existing_updates_members() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name()
            .times(2)
            .returning(|name| Ok(Some(existing(name))));
        api.expect_list_members()
            .returning(|_| Ok(vec![member("n1", "1.2.3.4")]));
        api.expect_list_instances().returning(|| Ok(fleet()));
        api.expect_create_load_balancer().times(0);
        api.expect_remove_member().times(0);
        api.expect_add_member()
            .withf(|_, address| address == "5.6.7.8")
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = LoadBalancerReconciler::new(api);
        let request = EnsureRequest::builder()
            .name("web")
            .port(80)
            .node_port(30080)
            .hosts(["node-a", "node-b"])
            .build();

        let status = reconciler.ensure(&request).unwrap();
        assert_eq!(status.hostname(), Some("web.lb.example.com"));
    }

    #[test]
    fn test_update_removes_before_adding() {
        let mut api = MockCloudApi::new();
        let mut seq = Sequence::new();
        api.expect_find_load_balancer_by_name()
            .returning(|name| Ok(Some(existing(name))));
        api.expect_list_members()
            .withf(|id| id == "lb-1")
            .returning(|_| Ok(vec![member("n1", "1.2.3.4"), member("n2", "5.6.7.8")]));
        api.expect_list_instances().returning(|| Ok(fleet()));
        api.expect_remove_member()
            .withf(|id, address| id == "lb-1" && address == "1.2.3.4")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_add_member()
            .withf(|id, address| id == "lb-1" && address == "9.9.9.9")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let reconciler = LoadBalancerReconciler::new(api);
        let diff = reconciler.update("web", &hosts(&["node-b", "node-c"])).unwrap();

        assert_eq!(diff.to_remove, hosts(&["1.2.3.4"]));
        assert_eq!(diff.to_add, hosts(&["9.9.9.9"]));
    }

    #[test]
    fn test_update_in_sync_makes_no_mutations() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name()
            .returning(|name| Ok(Some(existing(name))));
        api.expect_list_members()
            .returning(|_| Ok(vec![member("n1", "1.2.3.4"), member("n2", "5.6.7.8")]));
        api.expect_list_instances().returning(|| Ok(fleet()));
        api.expect_add_member().times(0);
        api.expect_remove_member().times(0);

        let reconciler = LoadBalancerReconciler::new(api);
        let diff = reconciler.update("web", &hosts(&["node-a", "node-b"])).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_update_aborts_on_first_failure() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name()
            .returning(|name| Ok(Some(existing(name))));
        api.expect_list_members().returning(|_| {
            Ok(vec![member("n1", "1.2.3.4"), member("n2", "5.6.7.8")])
        });
        api.expect_list_instances().returning(|| Ok(fleet()));
        api.expect_remove_member()
            .withf(|_, address| address == "1.2.3.4")
            .times(1)
            .returning(|_, _| {
                Err(Error::remote(
                    RemoteOperation::DeregisterInstance,
                    500,
                    "/kaas/load_balancers/lb-1/nodes/n1",
                ))
            });
        api.expect_remove_member()
            .withf(|_, address| address == "5.6.7.8")
            .times(0);
        api.expect_add_member().times(0);

        let reconciler = LoadBalancerReconciler::new(api);
        let err = reconciler.update("web", &hosts(&["node-c"])).unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_update_missing_load_balancer() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name().returning(|_| Ok(None));
        api.expect_list_members().times(0);

        let reconciler = LoadBalancerReconciler::new(api);
        let err = reconciler.update("web", &hosts(&["node-a"])).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "load balancer web not found");
    }

    #[test]
    fn test_update_unknown_host_makes_no_mutations() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name()
            .returning(|name| Ok(Some(existing(name))));
        api.expect_list_members().returning(|_| Ok(vec![member("n1", "1.2.3.4")]));
        api.expect_list_instances().returning(|| Ok(fleet()));
        api.expect_add_member().times(0);
        api.expect_remove_member().times(0);

        let reconciler = LoadBalancerReconciler::new(api);
        let err = reconciler.update("web", &hosts(&["node-x"])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ensure_deleted() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name()
            .returning(|name| Ok(Some(existing(name))));
        api.expect_delete_load_balancer()
            .withf(|id| id == "lb-1")
            .times(1)
            .returning(|_| Ok(()));

        let reconciler = LoadBalancerReconciler::new(api);
        reconciler.ensure_deleted("web").unwrap();
    }

    #[test]
    fn test_ensure_deleted_absent() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name().returning(|_| Ok(None));
        api.expect_delete_load_balancer().times(0);

        let reconciler = LoadBalancerReconciler::new(api);
        reconciler.ensure_deleted("web").unwrap();
    }

    #[test]
    fn test_get() {
        let mut api = MockCloudApi::new();
        api.expect_find_load_balancer_by_name()
            .returning(|name| Ok((name == "web").then(|| existing(name))));

        let reconciler = LoadBalancerReconciler::new(api);
        let status = reconciler.get("web").unwrap().unwrap();
        assert_eq!(status.hostname(), Some("web.lb.example.com"));
        assert_eq!(reconciler.get("api").unwrap(), None);
    }
}
