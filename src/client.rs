//! Typed access to the Concerto KaaS resources
//!
//! [`CloudApi`] is everything the provider needs from Concerto. [`RestCloudApi`]
//! implements it over any [`RestTransport`], encoding bodies as JSON and mapping
//! HTTP statuses onto [`Error`] variants. Each listing endpoint has its own
//! notion of absence: an empty instance listing comes back as 404, while a 404
//! on a load balancer's node listing means the load balancer is gone.

#[cfg(test)]
use mockall::automock;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::config::ConnectionConfig;
use crate::models::{Instance, LoadBalancer, LoadBalancerRecord, Member, Ship};
use crate::rest::{HttpTransport, RestResponse, RestTransport};
use crate::{Error, RemoteOperation, Result};

const SHIPS_PATH: &str = "/kaas/ships";
const LOAD_BALANCERS_PATH: &str = "/kaas/load_balancers";

fn load_balancer_path(id: &str) -> String {
    format!("{}/{}", LOAD_BALANCERS_PATH, id)
}

fn members_path(load_balancer_id: &str) -> String {
    format!("{}/{}/nodes", LOAD_BALANCERS_PATH, load_balancer_id)
}

fn member_path(load_balancer_id: &str, node_id: &str) -> String {
    format!("{}/{}/nodes/{}", LOAD_BALANCERS_PATH, load_balancer_id, node_id)
}

/// Operations on Concerto instances and load balancers
#[cfg_attr(test, automock)]
pub trait CloudApi {
    /// All instances; an empty listing is not an error
    fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Instance whose name is exactly `name`
    fn find_instance_by_name(&self, name: &str) -> Result<Instance>;

    /// Instance whose public address is exactly `address`
    fn find_instance_by_address(&self, address: &str) -> Result<Instance>;

    fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>>;

    /// `None` when no load balancer carries `name`
    fn find_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>>;

    /// Create a TCP load balancer and return it with its assigned id
    fn create_load_balancer(&self, name: &str, port: u16, node_port: u16) -> Result<LoadBalancer>;

    fn delete_load_balancer(&self, id: &str) -> Result<()>;

    /// Nodes currently registered with the load balancer
    fn list_members(&self, load_balancer_id: &str) -> Result<Vec<Member>>;

    /// Register the instance owning `address` with the load balancer
    fn add_member(&self, load_balancer_id: &str, address: &str) -> Result<()>;

    /// Deregister the node registered under `address`
    fn remove_member(&self, load_balancer_id: &str, address: &str) -> Result<()>;
}

/// [`CloudApi`] over the Concerto REST API
pub struct RestCloudApi<T> {
    transport: T,
}

impl RestCloudApi<HttpTransport> {
    /// Connect to the endpoint in `config` over HTTPS
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?))
    }
}

impl<T: RestTransport> RestCloudApi<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: RestTransport> CloudApi for RestCloudApi<T> {
    fn list_instances(&self) -> Result<Vec<Instance>> {
        let response = self.transport.get(SHIPS_PATH)?;

        // Concerto answers 404 when there are no ships yet
        if response.status == 404 {
            debug!("No instances registered");
            return Ok(Vec::new());
        }
        check_status(&response, RemoteOperation::ListInstances, SHIPS_PATH)?;

        let ships: Vec<Ship> = decode_list(&response)?;
        let instances: Vec<Instance> = ships.into_iter().map(Instance::from).collect();
        debug!(count = instances.len(), "Listed instances");
        Ok(instances)
    }

    fn find_instance_by_name(&self, name: &str) -> Result<Instance> {
        self.list_instances()?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| {
                debug!(instance = %name, "Instance not found");
                Error::NotFound(format!("instance {}", name))
            })
    }

    fn find_instance_by_address(&self, address: &str) -> Result<Instance> {
        self.list_instances()?
            .into_iter()
            .find(|i| i.address == address)
            .ok_or_else(|| {
                debug!(address = %address, "No instance owns address");
                Error::NotFound(format!("instance with address {}", address))
            })
    }

    fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>> {
        let response = self.transport.get(LOAD_BALANCERS_PATH)?;
        check_status(&response, RemoteOperation::ListLoadBalancers, LOAD_BALANCERS_PATH)?;

        let load_balancers: Vec<LoadBalancer> = decode_list(&response).map_err(|e| {
            error!(body = %response.body_text(), "Unreadable load balancer listing");
            e
        })?;
        debug!(count = load_balancers.len(), "Listed load balancers");
        Ok(load_balancers)
    }

    fn find_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let found = self
            .list_load_balancers()?
            .into_iter()
            .find(|lb| lb.name == name);

        if found.is_none() {
            debug!(load_balancer = %name, "Load balancer not found");
        }
        Ok(found)
    }

    fn create_load_balancer(&self, name: &str, port: u16, node_port: u16) -> Result<LoadBalancer> {
        let mut load_balancer = LoadBalancer::new(name, port, node_port);
        let body = serde_json::to_vec(&load_balancer)?;

        let response = self.transport.post(LOAD_BALANCERS_PATH, &body)?;
        if response.status != 201 {
            error!(load_balancer = %name, status = response.status, body = %response.body_text(), "Load balancer creation rejected");
            return Err(Error::remote(
                RemoteOperation::CreateLoadBalancer,
                response.status,
                LOAD_BALANCERS_PATH,
            ));
        }

        let record: LoadBalancerRecord = serde_json::from_slice(&response.body)?;
        load_balancer.merge(record);

        info!(load_balancer = %name, id = %load_balancer.id, port, node_port, "Load balancer created");
        Ok(load_balancer)
    }

    fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let path = load_balancer_path(id);
        let response = self.transport.delete(&path)?;

        match response.status {
            200 | 204 => {
                info!(id = %id, "Load balancer deleted");
                Ok(())
            }
            status => Err(Error::remote(RemoteOperation::DeleteLoadBalancer, status, path)),
        }
    }

    fn list_members(&self, load_balancer_id: &str) -> Result<Vec<Member>> {
        let path = members_path(load_balancer_id);
        let response = self.transport.get(&path)?;

        if response.status == 404 {
            return Err(Error::NotFound(format!("load balancer {}", load_balancer_id)));
        }
        check_status(&response, RemoteOperation::ListMembers, &path)?;

        let members: Vec<Member> = decode_list(&response)?;
        debug!(id = %load_balancer_id, count = members.len(), "Listed load balancer nodes");
        Ok(members)
    }

    fn add_member(&self, load_balancer_id: &str, address: &str) -> Result<()> {
        let instance = self.find_instance_by_address(address)?;
        let body = serde_json::to_vec(&Member::for_address(instance.address))?;

        let path = members_path(load_balancer_id);
        let response = self.transport.post(&path, &body)?;
        if response.status != 201 {
            error!(id = %load_balancer_id, address = %address, status = response.status, body = %response.body_text(), "Node registration rejected");
            return Err(Error::remote(RemoteOperation::RegisterInstance, response.status, path));
        }

        info!(id = %load_balancer_id, address = %address, "Node registered");
        Ok(())
    }

    fn remove_member(&self, load_balancer_id: &str, address: &str) -> Result<()> {
        let member = self
            .list_members(load_balancer_id)?
            .into_iter()
            .find(|m| m.address == address)
            .ok_or_else(|| {
                Error::NotFound(format!("node {} in load balancer {}", address, load_balancer_id))
            })?;

        let path = member_path(load_balancer_id, &member.id);
        let response = self.transport.delete(&path)?;

        match response.status {
            200 | 204 => {
                info!(id = %load_balancer_id, address = %address, "Node deregistered");
                Ok(())
            }
            status => Err(Error::remote(RemoteOperation::DeregisterInstance, status, path)),
        }
    }
}

fn check_status(response: &RestResponse, operation: RemoteOperation, path: &str) -> Result<()> {
    if response.status >= 400 {
        error!(path, status = response.status, "Unexpected HTTP status");
        return Err(Error::remote(operation, response.status, path));
    }
    Ok(())
}

/// Decode a JSON array; `null` reads as empty
fn decode_list<D: DeserializeOwned>(response: &RestResponse) -> Result<Vec<D>> {
    let items: Option<Vec<D>> = serde_json::from_slice(&response.body)?;
    Ok(items.unwrap_or_default())
}
