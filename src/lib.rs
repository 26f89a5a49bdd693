//! Concerto Cloud Provider
//!
//! A Rust library that lets a cluster orchestrator manage compute instances
//! and TCP load balancers hosted by Flexiant Concerto, through the KaaS REST
//! API.
//!
//! # Key Features
//!
//! - **Reconciliation** - converge load balancer members onto a desired host set
//! - **Idempotent** - re-applying the same state makes no mutating calls
//! - **Pluggable transport** - the REST boundary is a trait with test doubles
//! - **Client certificates** - HTTPS with a TLS client identity
//!
//! # Example
//!
//! ```no_run
//! use concerto_cloud::{ConcertoCloud, ProviderConfig, ServicePort, SessionAffinity};
//!
//! let config = ProviderConfig::load("/etc/concerto/concerto-cloud.toml")?;
//! let cloud = ConcertoCloud::from_config(&config)?;
//!
//! let ports = [ServicePort { port: 80, node_port: 30080 }];
//! let hosts = vec!["node-1.example.com".to_string()];
//!
//! let status = cloud.ensure_tcp_load_balancer("web", None, &ports, &hosts, SessionAffinity::None)?;
//! println!("ingress: {:?}", status.hostname());
//!
//! cloud.ensure_tcp_load_balancer_deleted("web")?;
//! # Ok::<(), concerto_cloud::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod reconciler;
pub mod resolver;
pub mod rest;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use client::{CloudApi, RestCloudApi};
pub use config::{ConnectionConfig, LogFormat, LoggingConfig, ProviderConfig};
pub use error::{Capability, Error, RemoteOperation, Result};
pub use models::{Instance, LoadBalancer, LoadBalancerStatus, Member};
pub use provider::{
    AddressKind, ConcertoCloud, ConcertoProviderFactory, NodeAddress, NodeResources,
    ProviderFactory, ServicePort, PROVIDER_NAME,
};
pub use reconciler::{EnsureRequest, LoadBalancerReconciler, MembershipDiff, SessionAffinity};
pub use resolver::AddressResolver;
pub use rest::{HttpTransport, RestResponse, RestTransport};
