//! BlueZ backend built on `bluer`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport};
use futures::StreamExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{is_comet_blue, BluetoothError, BluetoothResult, DiscoveredDevice, GattTransport};
use crate::config::is_valid_mac_address;
use crate::uuids;

/// Poll interval while BlueZ resolves GATT services after connecting.
const SERVICES_RESOLVED_POLL: Duration = Duration::from_millis(100);

/// Open a BlueZ session and return a powered adapter.
///
/// Uses the adapter named `name` (e.g. `hci0`) or the default adapter.
///
/// # Errors
///
/// Returns [`BluetoothError::SessionInitFailed`] if bluetoothd is unreachable,
/// [`BluetoothError::AdapterNotFound`] or [`BluetoothError::AdapterPoweredOff`].
pub async fn open_adapter(name: Option<&str>) -> BluetoothResult<Adapter> {
    let session = bluer::Session::new()
        .await
        .map_err(|e| BluetoothError::SessionInitFailed {
            message: e.to_string(),
        })?;

    let adapter = match name {
        Some(name) => session.adapter(name),
        None => session.default_adapter().await,
    }
    .map_err(|e| {
        debug!(error = %e, "no usable adapter");
        BluetoothError::AdapterNotFound
    })?;

    let powered = adapter
        .is_powered()
        .await
        .map_err(|_| BluetoothError::AdapterNotFound)?;
    if !powered {
        return Err(BluetoothError::AdapterPoweredOff);
    }

    debug!(adapter = adapter.name(), "using Bluetooth adapter");
    Ok(adapter)
}

/// Scan for `timeout` and return the valves that advertise the Comet Blue service.
///
/// # Errors
///
/// Returns [`BluetoothError::DiscoveryFailed`] if BlueZ refuses to scan.
#[instrument(skip(adapter), fields(adapter = adapter.name()))]
pub async fn discover(adapter: &Adapter, timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>> {
    let failed = |e: bluer::Error| BluetoothError::DiscoveryFailed {
        message: e.to_string(),
    };

    let mut filter = DiscoveryFilter::default();
    filter.transport = DiscoveryTransport::Le;
    filter.uuids = HashSet::from([uuids::SERVICE]);
    adapter.set_discovery_filter(filter).await.map_err(failed)?;

    let mut seen = HashSet::new();
    {
        let events = adapter.discover_devices().await.map_err(failed)?;
        tokio::pin!(events);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        seen.insert(address);
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        // Dropping the event stream stops discovery.
    }

    let mut found = Vec::new();
    for address in seen {
        let device = adapter.device(address).map_err(failed)?;
        let advertised = device.uuids().await.map_err(failed)?.unwrap_or_default();
        if !is_comet_blue(&advertised) {
            continue;
        }
        found.push(DiscoveredDevice {
            address: address.to_string(),
            name: device.name().await.map_err(failed)?,
            rssi: device.rssi().await.map_err(failed)?,
        });
    }
    found.sort_by(|a, b| a.address.cmp(&b.address));

    info!(count = found.len(), "discovery finished");
    Ok(found)
}

/// GATT link to one valve over BlueZ.
pub struct BluerTransport {
    address: String,
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
}

impl BluerTransport {
    /// Bind to the device at `address` on `adapter`. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::InvalidAddress`] for malformed addresses and
    /// [`BluetoothError::DeviceNotFound`] if BlueZ cannot create a handle.
    pub fn new(adapter: &Adapter, address: &str) -> BluetoothResult<Self> {
        let invalid = || BluetoothError::InvalidAddress {
            address: address.to_string(),
        };
        if !is_valid_mac_address(address) {
            return Err(invalid());
        }
        let parsed: Address = address.parse().map_err(|_| invalid())?;
        let device = adapter
            .device(parsed)
            .map_err(|_| BluetoothError::DeviceNotFound {
                address: address.to_string(),
            })?;

        Ok(Self {
            address: parsed.to_string(),
            device,
            characteristics: HashMap::new(),
        })
    }

    /// Open the configured adapter and bind to `address`.
    ///
    /// # Errors
    ///
    /// See [`open_adapter`] and [`BluerTransport::new`].
    pub async fn open(adapter_name: Option<&str>, address: &str) -> BluetoothResult<Self> {
        let adapter = open_adapter(adapter_name).await?;
        Self::new(&adapter, address)
    }

    fn connect_failed(&self, e: &bluer::Error) -> BluetoothError {
        BluetoothError::ConnectFailed {
            address: self.address.clone(),
            message: e.to_string(),
        }
    }

    fn characteristic(&self, uuid: Uuid) -> BluetoothResult<&Characteristic> {
        if self.characteristics.is_empty() {
            return Err(BluetoothError::NotConnected);
        }
        self.characteristics
            .get(&uuid)
            .ok_or(BluetoothError::CharacteristicNotFound { uuid })
    }

    async fn wait_for_services(&self) -> BluetoothResult<()> {
        while !self
            .device
            .is_services_resolved()
            .await
            .map_err(|e| self.connect_failed(&e))?
        {
            tokio::time::sleep(SERVICES_RESOLVED_POLL).await;
        }
        Ok(())
    }

    async fn resolve_characteristics(&mut self) -> BluetoothResult<()> {
        let mut found = HashMap::new();
        let services = self
            .device
            .services()
            .await
            .map_err(|e| self.connect_failed(&e))?;

        for service in services {
            if service.uuid().await.map_err(|e| self.connect_failed(&e))? != uuids::SERVICE {
                continue;
            }
            for characteristic in service
                .characteristics()
                .await
                .map_err(|e| self.connect_failed(&e))?
            {
                let uuid = characteristic
                    .uuid()
                    .await
                    .map_err(|e| self.connect_failed(&e))?;
                found.insert(uuid, characteristic);
            }
        }

        if found.is_empty() {
            return Err(BluetoothError::ServiceNotFound {
                address: self.address.clone(),
            });
        }
        debug!(count = found.len(), "resolved characteristics");
        self.characteristics = found;
        Ok(())
    }
}

impl GattTransport for BluerTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&mut self) -> BluetoothResult<()> {
        let connected = self
            .device
            .is_connected()
            .await
            .map_err(|e| self.connect_failed(&e))?;
        if !connected {
            self.device
                .connect()
                .await
                .map_err(|e| self.connect_failed(&e))?;
        }
        self.wait_for_services().await?;
        self.resolve_characteristics().await
    }

    async fn disconnect(&mut self) -> BluetoothResult<()> {
        self.characteristics.clear();
        self.device
            .disconnect()
            .await
            .map_err(|e| BluetoothError::ConnectFailed {
                address: self.address.clone(),
                message: e.to_string(),
            })
    }

    async fn read(&self, characteristic: Uuid) -> BluetoothResult<Vec<u8>> {
        self.characteristic(characteristic)?
            .read()
            .await
            .map_err(|e| BluetoothError::Gatt {
                operation: "read",
                characteristic: uuids::name_of(characteristic),
                message: e.to_string(),
            })
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> BluetoothResult<()> {
        let mut request = CharacteristicWriteRequest::default();
        request.op_type = WriteOp::Request;

        self.characteristic(characteristic)?
            .write_ext(value, &request)
            .await
            .map_err(|e| BluetoothError::Gatt {
                operation: "write",
                characteristic: uuids::name_of(characteristic),
                message: e.to_string(),
            })
    }
}
