//! Device inventory.
//!
//! The registry is the in-memory source of truth for which devices exist. It is
//! only synchronised with disk when [`DeviceRegistry::load`] or
//! [`DeviceRegistry::save`] is called; mutations are not persisted on their own.

use thiserror::Error;
use tracing::info;

use crate::crypto::{EncryptedStore, StoreError};
use crate::device::{Device, DeviceError};

/// Dataset name of the device file inside the store.
pub const DEVICES_FILE: &str = "devices";

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Encrypted storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A device with this name already exists.
    #[error("Device '{0}' already exists")]
    DuplicateName(String),

    /// A device record is missing required data.
    #[error("Invalid device '{name}': {source}")]
    InvalidDevice {
        /// Name of the offending record (may be empty).
        name: String,
        /// What was wrong with it.
        source: DeviceError,
    },

    /// No device with this name exists.
    #[error("Device '{0}' not found")]
    NotFound(String),
}

/// Ordered collection of devices keyed by name.
#[derive(Debug)]
pub struct DeviceRegistry {
    store: EncryptedStore,
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Creates an empty registry backed by `store`.
    #[must_use]
    pub fn new(store: EncryptedStore) -> Self {
        Self {
            store,
            devices: Vec::new(),
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &EncryptedStore {
        &self.store
    }

    /// Merges the persisted devices into the registry.
    ///
    /// A missing device file leaves the registry unchanged. Loaded records
    /// replace in-memory entries of the same name; when the file itself holds
    /// duplicates, the last one wins.
    pub fn load(&mut self) -> Result<(), RegistryError> {
        if !self.store.exists(DEVICES_FILE) {
            info!("No devices to get from file");
            return Ok(());
        }

        let records: Vec<Device> = match self.store.read(DEVICES_FILE) {
            Ok(records) => records,
            Err(StoreError::NotFound(_)) => {
                info!("No devices to get from file");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for record in &records {
            record
                .validate()
                .map_err(|source| RegistryError::InvalidDevice {
                    name: record.name.clone(),
                    source,
                })?;
        }

        let count = records.len();
        for device in records {
            self.upsert(device);
        }

        info!("Got {} device(s) from file", count);
        Ok(())
    }

    /// Replaces the device file with every device currently held.
    pub fn save(&self) -> Result<(), RegistryError> {
        self.store.write(DEVICES_FILE, &self.devices)?;
        info!("Saved {} device(s) to file", self.devices.len());
        Ok(())
    }

    /// Looks up a device by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Adds a new device.
    pub fn add(&mut self, device: Device) -> Result<(), RegistryError> {
        device
            .validate()
            .map_err(|source| RegistryError::InvalidDevice {
                name: device.name.clone(),
                source,
            })?;

        if self.contains(&device.name) {
            return Err(RegistryError::DuplicateName(device.name));
        }

        self.devices.push(device);
        Ok(())
    }

    /// Removes a device by name, returning it.
    pub fn remove(&mut self, name: &str) -> Result<Device, RegistryError> {
        let index = self
            .devices
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(self.devices.remove(index))
    }

    /// Returns true if a device with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates devices in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Returns all device names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.name.as_str()).collect()
    }

    /// Returns the number of devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if the registry holds no devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Inserts or replaces by name, keeping the original position on replace.
    fn upsert(&mut self, device: Device) {
        match self.devices.iter_mut().find(|d| d.name == device.name) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }
}
