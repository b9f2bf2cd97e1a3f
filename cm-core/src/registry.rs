//! Address-keyed registry of attached CPLD clients

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::cpld::CpldDevice;
use crate::error::{CpldError, Result};

/// Live devices by bus address.
///
/// The registry lock only guards the map. It is always released before a
/// device lock is taken, so a slow bus access never blocks lookups of other
/// devices.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<u16, Arc<CpldDevice>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `device` under its address. A live entry at the same address is
    /// an error.
    pub fn register(&self, device: Arc<CpldDevice>) -> Result<()> {
        let address = device.address();
        let mut clients = self.clients.lock();
        if clients.contains_key(&address) {
            return Err(CpldError::AddressInUse(address));
        }
        clients.insert(address, device);
        info!("Registered CPLD client at 0x{:02x}", address);
        Ok(())
    }

    pub fn unregister(&self, address: u16) -> Result<Arc<CpldDevice>> {
        let removed = self.clients.lock().remove(&address);
        match removed {
            Some(device) => {
                info!("Unregistered CPLD client at 0x{:02x}", address);
                Ok(device)
            }
            None => Err(CpldError::UnknownAddress(address)),
        }
    }

    pub fn lookup(&self, address: u16) -> Result<Arc<CpldDevice>> {
        self.clients
            .lock()
            .get(&address)
            .cloned()
            .ok_or(CpldError::UnknownAddress(address))
    }

    /// Registered addresses in ascending order
    pub fn addresses(&self) -> Vec<u16> {
        let mut addresses: Vec<u16> = self.clients.lock().keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    pub fn read_register(&self, address: u16, register: u8) -> Result<u8> {
        let device = self.lookup(address)?;
        device.read_register(register)
    }

    pub fn write_register(&self, address: u16, register: u8, value: u8) -> Result<()> {
        let device = self.lookup(address)?;
        device.write_register(register, value)
    }
}
