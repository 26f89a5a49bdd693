//! Error types for the Concerto cloud provider

use std::fmt;

use thiserror::Error;

/// Boxed error returned by a transport implementation
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(Capability),

    #[error("{operation}: HTTP {status} from '{path}'")]
    Remote {
        operation: RemoteOperation,
        status: u16,
        path: String,
    },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid instance filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if the request asked for something the provider cannot do
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// HTTP status of a failed remote operation, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn transport(err: impl Into<TransportError>) -> Self {
        Error::Transport(err.into())
    }

    pub(crate) fn remote(operation: RemoteOperation, status: u16, path: impl Into<String>) -> Self {
        Error::Remote {
            operation,
            status,
            path: path.into(),
        }
    }
}

/// Capabilities a Concerto load balancer does not offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Session affinity other than none
    SessionAffinity,
    /// A caller-chosen external IP for the load balancer
    ExternalIp,
    /// More than one exposed port
    MultiplePorts,
    /// A provider operation Concerto has no equivalent for
    Operation(&'static str),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SessionAffinity => write!(f, "load balancer session affinity"),
            Capability::ExternalIp => {
                write!(f, "external IP cannot be specified for a Concerto load balancer")
            }
            Capability::MultiplePorts => {
                write!(f, "Concerto load balancers only support one single port")
            }
            Capability::Operation(op) => write!(f, "operation {}", op),
        }
    }
}

/// Remote calls whose HTTP status is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    ListInstances,
    ListLoadBalancers,
    CreateLoadBalancer,
    DeleteLoadBalancer,
    ListMembers,
    RegisterInstance,
    DeregisterInstance,
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOperation::ListInstances => write!(f, "could not list instances"),
            RemoteOperation::ListLoadBalancers => write!(f, "could not list load balancers"),
            RemoteOperation::CreateLoadBalancer => write!(f, "could not create load balancer"),
            RemoteOperation::DeleteLoadBalancer => write!(f, "could not delete load balancer"),
            RemoteOperation::ListMembers => write!(f, "could not list load balancer nodes"),
            RemoteOperation::RegisterInstance => {
                write!(f, "could not register instance with load balancer")
            }
            RemoteOperation::DeregisterInstance => {
                write!(f, "could not deregister instance from load balancer")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_keeps_context() {
        let err = Error::remote(RemoteOperation::DeleteLoadBalancer, 500, "/kaas/load_balancers/42");
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.to_string(),
            "could not delete load balancer: HTTP 500 from '/kaas/load_balancers/42'"
        );
    }

    #[test]
    fn test_predicates() {
        assert!(Error::NotFound("instance web-1".into()).is_not_found());
        assert!(Error::Unsupported(Capability::ExternalIp).is_unsupported());
        assert!(!Error::Config("x".into()).is_not_found());
        assert_eq!(Error::NotFound("instance web-1".into()).to_string(), "instance web-1 not found");
    }
}
