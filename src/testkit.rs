//! Test doubles for the REST boundary
//!
//! [`RecordingTransport`] replays scripted responses and records every call.
//! [`InMemoryCloud`] is a small stateful Concerto that answers the KaaS paths
//! the resource client uses, so reconciliation can be driven end to end.

use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{LoadBalancer, Member, Ship};
use crate::rest::{RestResponse, RestTransport};
use crate::{Error, Result};

enum Scripted {
    Response(RestResponse),
    Failure(String),
}

/// Transport that answers from a script and records `METHOD path [body]`
#[derive(Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<RestResponse>,
    calls: Mutex<Vec<String>>,
}

impl RecordingTransport {
    /// Empty script; any call fails with a transport error
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with the same response once the script runs out
    pub fn always(status: u16, body: &str) -> Self {
        Self {
            fallback: Some(RestResponse::new(status, body)),
            ..Self::default()
        }
    }

    pub fn with_response(self, status: u16, body: &str) -> Self {
        self.script
            .lock()
            .push_back(Scripted::Response(RestResponse::new(status, body)));
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.script
            .lock()
            .push_back(Scripted::Failure(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Recorded POST and DELETE calls
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !c.starts_with("GET "))
            .cloned()
            .collect()
    }

    fn answer(&self, call: String) -> Result<RestResponse> {
        self.calls.lock().push(call);

        match self.script.lock().pop_front() {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Failure(message)) => Err(Error::transport(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::transport("no scripted response left")),
        }
    }
}

impl RestTransport for RecordingTransport {
    fn get(&self, path: &str) -> Result<RestResponse> {
        self.answer(format!("GET {}", path))
    }

    fn post(&self, path: &str, body: &[u8]) -> Result<RestResponse> {
        self.answer(format!("POST {} {}", path, String::from_utf8_lossy(body)))
    }

    fn delete(&self, path: &str) -> Result<RestResponse> {
        self.answer(format!("DELETE {}", path))
    }
}

struct Fault {
    method: &'static str,
    fragment: String,
    status: u16,
}

#[derive(Default)]
struct CloudState {
    ships: Vec<Ship>,
    load_balancers: Vec<LoadBalancer>,
    members: HashMap<String, Vec<Member>>,
    faults: Vec<Fault>,
    calls: Vec<String>,
}

impl CloudState {
    fn load_balancer_id(&self, name: &str) -> Option<String> {
        self.load_balancers
            .iter()
            .find(|lb| lb.name == name)
            .map(|lb| lb.id.clone())
    }

    fn fault(&self, method: &str, path: &str) -> Option<u16> {
        self.faults
            .iter()
            .find(|f| f.method == method && path.contains(&f.fragment))
            .map(|f| f.status)
    }
}

/// In-memory Concerto speaking the KaaS REST paths
#[derive(Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance with 2 CPUs, 4 GiB RAM and 40 GiB disk; returns its id
    pub fn add_instance(&self, name: &str, address: &str) -> String {
        let id = format!("ship-{}", Uuid::new_v4());
        self.state.lock().ships.push(Ship {
            id: id.clone(),
            fqdn: name.to_string(),
            name: name.to_string(),
            public_ip: address.to_string(),
            cpus: 2.0,
            memory: 4096,
            storage: 40,
            ..Ship::default()
        });
        id
    }

    pub fn add_load_balancer(&self, name: &str, port: u16, node_port: u16) -> LoadBalancer {
        let mut lb = LoadBalancer::new(name, port, node_port);
        lb.id = format!("lb-{}", Uuid::new_v4());
        let mut state = self.state.lock();
        state.members.insert(lb.id.clone(), Vec::new());
        state.load_balancers.push(lb.clone());
        lb
    }

    /// Register `address` directly, bypassing the instance lookup
    pub fn add_member(&self, load_balancer: &str, address: &str) {
        let mut state = self.state.lock();
        if let Some(id) = state.load_balancer_id(load_balancer) {
            let member = Member {
                id: format!("node-{}", Uuid::new_v4()),
                address: address.to_string(),
            };
            state.members.entry(id).or_default().push(member);
        }
    }

    pub fn load_balancer(&self, name: &str) -> Option<LoadBalancer> {
        self.state
            .lock()
            .load_balancers
            .iter()
            .find(|lb| lb.name == name)
            .cloned()
    }

    /// Addresses registered with the named load balancer
    pub fn members(&self, load_balancer: &str) -> BTreeSet<String> {
        let state = self.state.lock();
        state
            .load_balancer_id(load_balancer)
            .and_then(|id| state.members.get(&id))
            .map(|members| members.iter().map(|m| m.address.clone()).collect())
            .unwrap_or_default()
    }

    /// Answer `status` to every `method` call whose path contains `fragment`
    pub fn inject_fault(&self, method: &'static str, fragment: &str, status: u16) {
        self.state.lock().faults.push(Fault {
            method,
            fragment: fragment.to_string(),
            status,
        });
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Recorded POST and DELETE calls
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("GET "))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn handle(&self, method: &'static str, path: &str, body: &[u8]) -> Result<RestResponse> {
        let mut state = self.state.lock();
        state.calls.push(format!("{} {}", method, path));

        if let Some(status) = state.fault(method, path) {
            return Ok(RestResponse::new(status, ""));
        }

        let segments: Vec<&str> = path
            .trim_start_matches("/kaas/")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (method, segments.as_slice()) {
            ("GET", ["ships"]) if state.ships.is_empty() => Ok(not_found()),
            ("GET", ["ships"]) => json(200, &state.ships),
            ("GET", ["load_balancers"]) => json(200, &state.load_balancers),
            ("POST", ["load_balancers"]) => {
                let mut lb: LoadBalancer = serde_json::from_slice(body)?;
                lb.id = format!("lb-{}", Uuid::new_v4());
                state.members.insert(lb.id.clone(), Vec::new());
                state.load_balancers.push(lb.clone());
                json(201, &lb)
            }
            ("DELETE", ["load_balancers", id]) => {
                let before = state.load_balancers.len();
                state.load_balancers.retain(|lb| lb.id != *id);
                if state.load_balancers.len() == before {
                    return Ok(not_found());
                }
                state.members.remove(*id);
                Ok(RestResponse::new(204, ""))
            }
            ("GET", ["load_balancers", id, "nodes"]) => match state.members.get(*id) {
                Some(members) => json(200, members),
                None => Ok(not_found()),
            },
            ("POST", ["load_balancers", id, "nodes"]) => {
                let mut member: Member = serde_json::from_slice(body)?;
                member.id = format!("node-{}", Uuid::new_v4());
                match state.members.get_mut(*id) {
                    Some(members) => {
                        members.push(member.clone());
                        json(201, &member)
                    }
                    None => Ok(not_found()),
                }
            }
            ("DELETE", ["load_balancers", id, "nodes", node_id]) => {
                let Some(members) = state.members.get_mut(*id) else {
                    return Ok(not_found());
                };
                let before = members.len();
                members.retain(|m| m.id != *node_id);
                if members.len() == before {
                    return Ok(not_found());
                }
                Ok(RestResponse::new(204, ""))
            }
            _ => Ok(not_found()),
        }
    }
}

impl RestTransport for InMemoryCloud {
    fn get(&self, path: &str) -> Result<RestResponse> {
        self.handle("GET", path, &[])
    }

    fn post(&self, path: &str, body: &[u8]) -> Result<RestResponse> {
        self.handle("POST", path, body)
    }

    fn delete(&self, path: &str) -> Result<RestResponse> {
        self.handle("DELETE", path, &[])
    }
}

fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<RestResponse> {
    Ok(RestResponse::new(status, serde_json::to_vec(value)?))
}

fn not_found() -> RestResponse {
    RestResponse::new(404, r#"{"error":"not found"}"#)
}
