//! Host name to address resolution

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::client::CloudApi;
use crate::{Error, Result};

/// Maps orchestrator host names to instance public addresses
pub struct AddressResolver<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A: CloudApi + ?Sized> AddressResolver<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Resolve every name against a single instance listing
    ///
    /// Fails with `NotFound` naming the first unknown host. No names means no
    /// remote call at all.
    pub fn resolve<I, S>(&self, names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = names.into_iter().peekable();
        if names.peek().is_none() {
            return Ok(BTreeSet::new());
        }

        // duplicate names resolve to the first listed instance
        let mut by_name: HashMap<String, String> = HashMap::new();
        for instance in self.api.list_instances()? {
            by_name.entry(instance.name).or_insert(instance.address);
        }

        let mut addresses = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let address = by_name
                .get(name)
                .ok_or_else(|| Error::NotFound(format!("instance {}", name)))?;
            addresses.insert(address.clone());
        }

        debug!(count = addresses.len(), "Resolved host addresses");
        Ok(addresses)
    }
}
