//! Vehicle registry
//!
//! Bookkeeping from caller-chosen ids to [`Vehicle`] orchestrators sharing one
//! [`ClientContext`]. Replacing or removing an entry discards that vehicle's
//! sessions; callers still holding the old `Arc` keep a working orchestrator.

use crate::context::ClientContext;
use crate::error::RegistryError;
use crate::vehicle::Vehicle;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Vehicles known to one client
#[derive(Debug)]
pub struct VehicleRegistry {
    context: Arc<ClientContext>,
    vehicles: RwLock<HashMap<String, Arc<Vehicle>>>,
}

impl VehicleRegistry {
    /// Create an empty registry
    pub fn new(context: Arc<ClientContext>) -> Self {
        Self {
            context,
            vehicles: RwLock::new(HashMap::new()),
        }
    }

    /// The context new vehicles are created with
    pub fn context(&self) -> &Arc<ClientContext> {
        &self.context
    }

    fn create(&self, id: &str, vin: &str) -> Arc<Vehicle> {
        Arc::new(Vehicle::new(id, vin, self.context.clone()))
    }

    /// Insert a new vehicle, failing if `id` is taken
    pub async fn add_vehicle(&self, id: &str, vin: &str) -> Result<Arc<Vehicle>, RegistryError> {
        let mut vehicles = self.vehicles.write().await;
        match vehicles.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::already_exists(id, vin)),
            Entry::Vacant(slot) => {
                debug!(id, vin, "Vehicle added");
                Ok(slot.insert(self.create(id, vin)).clone())
            }
        }
    }

    /// Return the vehicle for `id`, creating it if absent
    ///
    /// An existing entry is returned as is, even if `vin` differs.
    pub async fn ensure_vehicle(&self, id: &str, vin: &str) -> Arc<Vehicle> {
        if let Some(vehicle) = self.vehicles.read().await.get(id) {
            return vehicle.clone();
        }
        let mut vehicles = self.vehicles.write().await;
        vehicles
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(id, vin, "Vehicle added");
                self.create(id, vin)
            })
            .clone()
    }

    /// Insert a vehicle for `id`, discarding any previous one
    pub async fn override_vehicle(&self, id: &str, vin: &str) -> Arc<Vehicle> {
        let vehicle = self.create(id, vin);
        let previous = self
            .vehicles
            .write()
            .await
            .insert(id.to_string(), vehicle.clone());
        if previous.is_some() {
            debug!(id, vin, "Vehicle replaced");
        }
        vehicle
    }

    /// Look up the vehicle for `id`
    pub async fn get_vehicle(&self, id: &str) -> Result<Arc<Vehicle>, RegistryError> {
        self.vehicles
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::does_not_exist(id))
    }

    /// Remove and return the vehicle for `id`
    pub async fn remove_vehicle(&self, id: &str) -> Result<Arc<Vehicle>, RegistryError> {
        let removed = self.vehicles.write().await.remove(id);
        match removed {
            Some(vehicle) => {
                debug!(id, "Vehicle removed");
                Ok(vehicle)
            }
            None => Err(RegistryError::does_not_exist(id)),
        }
    }

    /// True when `id` is registered
    pub async fn contains_vehicle(&self, id: &str) -> bool {
        self.vehicles.read().await.contains_key(id)
    }

    /// Number of registered vehicles
    pub async fn count(&self) -> usize {
        self.vehicles.read().await.len()
    }
}
