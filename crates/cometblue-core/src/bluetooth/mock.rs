//! In-memory transport that behaves like a valve.
//!
//! Registers are plain byte vectors keyed by characteristic UUID. Writes to
//! the temperature and settings characteristics honour the `0x80`
//! "unchanged" marker the way the firmware does. Clones share state, so a
//! test can keep a handle while the client owns the transport.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use super::{BluetoothError, BluetoothResult, GattTransport};
use crate::protocol::UNCHANGED_VALUE;
use crate::uuids;

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    registers: HashMap<Uuid, Vec<u8>>,
    writes: Vec<(Uuid, Vec<u8>)>,
    connect_calls: u32,
    failing_connects: u32,
    missing_service_connects: u32,
    connect_delay: Option<Duration>,
    failing_writes: HashSet<Uuid>,
}

/// Shared-state mock of a valve's GATT server.
#[derive(Debug, Clone)]
pub struct MockTransport {
    address: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A disconnected valve with no registers.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder form of [`MockTransport::set_register`].
    #[must_use]
    pub fn with_register(self, characteristic: Uuid, value: impl Into<Vec<u8>>) -> Self {
        self.set_register(characteristic, value);
        self
    }

    /// Replace the contents of a register.
    pub fn set_register(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) {
        self.state().registers.insert(characteristic, value.into());
    }

    /// Current contents of a register.
    #[must_use]
    pub fn register(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        self.state().registers.get(&characteristic).cloned()
    }

    /// Every write so far, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state().writes.clone()
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state().failing_connects = count;
    }

    /// Make the next `count` connection attempts bring the link up but fail
    /// to find the Comet Blue service, leaving the link open.
    pub fn fail_next_service_lookups(&self, count: u32) {
        self.state().missing_service_connects = count;
    }

    /// Delay every connection attempt by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = Some(delay);
    }

    /// Reject writes to `characteristic`.
    pub fn fail_writes_to(&self, characteristic: Uuid) {
        self.state().failing_writes.insert(characteristic);
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn connect_calls(&self) -> u32 {
        self.state().connect_calls
    }

    /// Whether the link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }
}

fn merge_unchanged(current: &mut [u8], update: &[u8]) {
    for (old, new) in current.iter_mut().zip(update) {
        if *new != UNCHANGED_VALUE {
            *old = *new;
        }
    }
}

impl GattTransport for MockTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&mut self) -> BluetoothResult<()> {
        let delay = {
            let mut state = self.state();
            state.connect_calls += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BluetoothError::ConnectFailed {
                address: self.address.clone(),
                message: "simulated connection failure".to_string(),
            });
        }
        state.connected = true;
        if state.missing_service_connects > 0 {
            state.missing_service_connects -= 1;
            return Err(BluetoothError::ServiceNotFound {
                address: self.address.clone(),
            });
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> BluetoothResult<()> {
        self.state().connected = false;
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> BluetoothResult<Vec<u8>> {
        let state = self.state();
        if !state.connected {
            return Err(BluetoothError::NotConnected);
        }
        state
            .registers
            .get(&characteristic)
            .cloned()
            .ok_or(BluetoothError::CharacteristicNotFound {
                uuid: characteristic,
            })
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> BluetoothResult<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(BluetoothError::NotConnected);
        }
        if state.failing_writes.contains(&characteristic) {
            return Err(BluetoothError::Gatt {
                operation: "write",
                characteristic: uuids::name_of(characteristic),
                message: "simulated write failure".to_string(),
            });
        }

        state.writes.push((characteristic, value.to_vec()));
        if characteristic == uuids::PIN {
            return Ok(());
        }

        let merges = (characteristic == uuids::TEMPERATURE || characteristic == uuids::SETTINGS)
            && state
                .registers
                .get(&characteristic)
                .is_some_and(|current| current.len() == value.len());
        if merges {
            if let Some(current) = state.registers.get_mut(&characteristic) {
                merge_unchanged(current, value);
            }
        } else {
            state.registers.insert(characteristic, value.to_vec());
        }
        debug!(characteristic = uuids::name_of(characteristic), "mock register updated");
        Ok(())
    }
}
