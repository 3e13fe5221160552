//! Raw bulk USB printer transport
//!
//! Talks to printer-class USB devices through libusb. Discovery walks the
//! active configuration descriptor of every attached device looking for
//! printer-class interfaces with a bulk-OUT endpoint; printing claims that
//! interface and writes the whole payload in one bulk transfer.
//!
//! libusb calls block, so everything runs under `spawn_blocking`.

use crate::error::{PrintError, PrintResult};
use crate::tcp::Printer;
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// USB printer interface class
const USB_CLASS_PRINTER: u8 = 0x07;

/// Bulk-OUT transfer timeout
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for string-descriptor reads during discovery
const STRING_TIMEOUT: Duration = Duration::from_millis(200);

/// A printable interface on a discovered device
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbInterfaceRecord {
    pub interface_number: u8,
    pub out_endpoint: u8,
}

/// One USB device with at least one printer-class bulk-OUT interface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDeviceRecord {
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub bus_number: u8,
    pub device_address: u8,
    pub interfaces: Vec<UsbInterfaceRecord>,
}

/// Which device and endpoint to print through
#[derive(Debug, Clone)]
pub struct UsbTargetSpec {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Narrow the match to one physical port when several identical
    /// printers are attached
    pub bus_number: Option<u8>,
    pub device_address: Option<u8>,
    pub interface_number: u8,
    pub out_endpoint: u8,
}

/// Enumerate attached printer-class USB devices
///
/// Devices without a printer-class bulk-OUT interface are omitted.
pub async fn discover_usb() -> PrintResult<Vec<UsbDeviceRecord>> {
    tokio::task::spawn_blocking(discover_blocking)
        .await
        .map_err(|e| PrintError::Io(std::io::Error::other(e)))?
}

/// A printer addressed over raw bulk USB
#[derive(Debug, Clone)]
pub struct UsbPrinter {
    spec: UsbTargetSpec,
}

impl UsbPrinter {
    pub fn new(spec: UsbTargetSpec) -> Self {
        Self { spec }
    }
}

impl Printer for UsbPrinter {
    #[instrument(
        skip(self, data),
        fields(
            vid = self.spec.vendor_id,
            pid = self.spec.product_id,
            bytes = data.len(),
        )
    )]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let spec = self.spec.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || print_blocking(&spec, &data))
            .await
            .map_err(|e| PrintError::Io(std::io::Error::other(e)))?
    }
}

fn discover_blocking() -> PrintResult<Vec<UsbDeviceRecord>> {
    let context =
        Context::new().map_err(|e| PrintError::LibusbUnavailable(e.to_string()))?;

    let mut records = Vec::new();
    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        let interfaces = match printable_interfaces(&device) {
            Some(list) if !list.is_empty() => list,
            _ => continue,
        };

        let (vendor_name, product_name, serial_number) = read_strings(&device, &descriptor);

        debug!(
            "Found USB printer {:04x}:{:04x} (bus {}, address {})",
            descriptor.vendor_id(),
            descriptor.product_id(),
            device.bus_number(),
            device.address(),
        );

        records.push(UsbDeviceRecord {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            vendor_name,
            product_name,
            serial_number,
            bus_number: device.bus_number(),
            device_address: device.address(),
            interfaces,
        });
    }

    Ok(records)
}

/// Printer-class interfaces and their first bulk-OUT endpoint
fn printable_interfaces<T: UsbContext>(device: &Device<T>) -> Option<Vec<UsbInterfaceRecord>> {
    let config = device.active_config_descriptor().ok()?;

    let mut found = Vec::new();
    for interface in config.interfaces() {
        for alt in interface.descriptors() {
            if alt.class_code() != USB_CLASS_PRINTER {
                continue;
            }
            let endpoint = alt.endpoint_descriptors().find(|ep| {
                ep.direction() == Direction::Out && ep.transfer_type() == TransferType::Bulk
            });
            if let Some(ep) = endpoint {
                found.push(UsbInterfaceRecord {
                    interface_number: alt.interface_number(),
                    out_endpoint: ep.address(),
                });
                break;
            }
        }
    }
    Some(found)
}

/// Best-effort string descriptors; requires opening the device
fn read_strings<T: UsbContext>(
    device: &Device<T>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>, Option<String>) {
    let handle = match device.open() {
        Ok(h) => h,
        Err(_) => return (None, None, None),
    };
    if handle.read_languages(STRING_TIMEOUT).is_err() {
        return (None, None, None);
    }
    (
        handle.read_manufacturer_string_ascii(descriptor).ok(),
        handle.read_product_string_ascii(descriptor).ok(),
        handle.read_serial_number_string_ascii(descriptor).ok(),
    )
}

fn print_blocking(spec: &UsbTargetSpec, data: &[u8]) -> PrintResult<()> {
    let context =
        Context::new().map_err(|e| PrintError::LibusbUnavailable(e.to_string()))?;

    let mut selected: Option<Device<Context>> = None;
    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        if selector_matches(
            spec,
            descriptor.vendor_id(),
            descriptor.product_id(),
            device.bus_number(),
            device.address(),
        ) {
            selected = Some(device);
            break;
        }
    }

    let device = selected.ok_or(PrintError::DeviceNotFound)?;
    let mut handle = device.open().map_err(|e| match e {
        rusb::Error::Busy | rusb::Error::Access => PrintError::DeviceBusy,
        other => PrintError::Usb(other),
    })?;

    let iface = spec.interface_number;

    // Prefer libusb's automatic detach; fall back to doing it by hand
    if handle.set_auto_detach_kernel_driver(true).is_err()
        && handle.kernel_driver_active(iface).unwrap_or(false)
    {
        let _ = handle.detach_kernel_driver(iface);
    }

    // already-configured is fine; a busy device will surface at claim time
    let _ = handle.set_active_configuration(1);

    if let Err(e) = handle.claim_interface(iface) {
        let _ = handle.attach_kernel_driver(iface);
        return Err(match e {
            rusb::Error::Busy => PrintError::DeviceBusy,
            other => PrintError::ClaimFailed(other.to_string()),
        });
    }

    let result = handle.write_bulk(spec.out_endpoint, data, TRANSFER_TIMEOUT);

    let _ = handle.release_interface(iface);
    let _ = handle.attach_kernel_driver(iface);
    drop(handle);

    match result {
        Ok(written) if written == data.len() => {
            info!(written, "Bulk transfer complete");
            Ok(())
        }
        Ok(written) => {
            warn!(written, total = data.len(), "Short bulk transfer");
            Err(PrintError::PartialTransfer {
                written,
                total: data.len(),
            })
        }
        Err(e) => Err(PrintError::BulkTransfer(e)),
    }
}

/// VID/PID must match; bus and address only narrow the match when supplied
fn selector_matches(spec: &UsbTargetSpec, vid: u16, pid: u16, bus: u8, address: u8) -> bool {
    spec.vendor_id == vid
        && spec.product_id == pid
        && spec.bus_number.is_none_or(|b| b == bus)
        && spec.device_address.is_none_or(|a| a == address)
}
