//! Bounded, keyed set of loaded networks.
//!
//! Nothing is evicted: inserting into a full pool fails, and a network only
//! leaves through `remove`, which unloads it once no search holds it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{error, info};

use crate::network::{NetworkError, NetworkModel};

pub type SharedNetwork = Arc<RwLock<Box<dyn NetworkModel>>>;

pub const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Pool is full ({0} networks)")]
    Full(usize),

    #[error("Network {0} is already loaded")]
    Duplicate(String),

    #[error("Network {0} not found")]
    NotFound(String),

    #[error("Network {name} failed to load: {source}")]
    Load {
        name: String,
        #[source]
        source: NetworkError,
    },
}

pub struct NetworkPool {
    capacity: usize,
    networks: RwLock<HashMap<String, SharedNetwork>>,
}

impl Default for NetworkPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NetworkPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            networks: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.networks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<SharedNetwork> {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Adds an already loaded network under its own name
    pub fn insert(&self, network: Box<dyn NetworkModel>) -> Result<SharedNetwork, PoolError> {
        let mut networks = self.networks.write().unwrap_or_else(PoisonError::into_inner);
        let name = network.name().to_string();
        if networks.contains_key(&name) {
            return Err(PoolError::Duplicate(name));
        }
        if networks.len() >= self.capacity {
            return Err(PoolError::Full(self.capacity));
        }

        let shared: SharedNetwork = Arc::new(RwLock::new(network));
        networks.insert(name.clone(), Arc::clone(&shared));
        info!("network {} added to pool ({}/{})", name, networks.len(), self.capacity);
        Ok(shared)
    }

    /// Parses and preprocesses `network` from `source`, then inserts it
    pub fn load(&self, mut network: Box<dyn NetworkModel>, source: &Path) -> Result<SharedNetwork, PoolError> {
        let name = network.name().to_string();
        {
            let networks = self.networks.read().unwrap_or_else(PoisonError::into_inner);
            if networks.contains_key(&name) {
                return Err(PoolError::Duplicate(name));
            }
            if networks.len() >= self.capacity {
                return Err(PoolError::Full(self.capacity));
            }
        }

        let loaded = network.parse(source).and_then(|()| network.preprocess());
        if let Err(e) = loaded {
            error!("network {} failed to load from {}: {}", name, source.display(), e);
            network.unload();
            return Err(PoolError::Load { name, source: e });
        }
        self.insert(network)
    }

    /// Takes a network out of the pool and unloads it.
    ///
    /// Blocks until searches still holding the network release it.
    pub fn remove(&self, name: &str) -> Result<(), PoolError> {
        let shared = self
            .networks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| PoolError::NotFound(name.to_string()))?;

        shared.write().unwrap_or_else(PoisonError::into_inner).unload();
        info!("network {} removed from pool", name);
        Ok(())
    }

    /// Removes the network with the same name, if any, and inserts `network`
    pub fn replace(&self, network: Box<dyn NetworkModel>) -> Result<SharedNetwork, PoolError> {
        match self.remove(network.name()) {
            Ok(()) | Err(PoolError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.insert(network)
    }
}
