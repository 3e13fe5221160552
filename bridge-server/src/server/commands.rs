//! Command dispatch
//!
//! Every inbound frame is a JSON object carrying an integer `id` and a
//! string `type`. Replies echo the `id` and carry `ok:true` plus
//! command-specific fields, or `ok:false` with an error string. Frames that
//! do not meet the contract are dropped without a reply.

use crate::error::{BridgeError, BridgeResult};
use crate::server::AppState;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bridge_printer::{
    NetworkPrinter, OsPrinter, Printer, UsbPrinter, UsbTargetSpec, discover_os_printers,
    discover_usb, scan_port,
};
use serde_json::{Value, json};
use tracing::debug;

/// Handle one inbound frame; `None` means no reply is owed
pub async fn handle_frame(state: &AppState, text: &str) -> Option<String> {
    let frame: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            debug!("Dropping non-JSON frame");
            return None;
        }
    };
    let Some(id) = frame.get("id").and_then(Value::as_i64) else {
        debug!("Dropping frame without integer id");
        return None;
    };
    let command = frame
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    debug!(command, id, "Dispatching command");
    let reply = match dispatch(state, command, &frame).await {
        Ok(extra) => ok_reply(id, extra),
        Err(e) => json!({ "id": id, "ok": false, "error": e.to_string() }),
    };
    Some(reply.to_string())
}

async fn dispatch(state: &AppState, command: &str, frame: &Value) -> BridgeResult<Value> {
    match command {
        "ping" => Ok(json!({})),
        "getInfo" => get_info(state).await,
        "setRestaurantId" => set_restaurant_id(state, frame).await,
        "clearConfig" => {
            state.supervisor.clear_config().await;
            Ok(json!({}))
        }
        "printRawTcp" => print_raw_tcp(frame).await,
        "discoverTcp9100" => discover_tcp_9100(frame).await,
        "discoverUsb" => discover_usb_devices().await,
        "printRawUsb" => print_raw_usb(frame).await,
        "discoverOsPrinters" => discover_os().await,
        "printOs" => print_os(frame).await,
        _ => Err(BridgeError::invalid("unknown type")),
    }
}

async fn get_info(state: &AppState) -> BridgeResult<Value> {
    // Re-detected on every call: the host may have changed networks
    let local_ip = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let cfg = state.supervisor.runtime_config().await;
    let mut info = json!({ "localIp": local_ip, "port": state.port });
    if !cfg.restaurant_id.is_empty() {
        info["restaurantId"] = Value::from(cfg.restaurant_id);
    }
    if !cfg.device_name.is_empty() {
        info["deviceName"] = Value::from(cfg.device_name);
    }
    Ok(info)
}

async fn set_restaurant_id(state: &AppState, frame: &Value) -> BridgeResult<Value> {
    let restaurant_id = match frame.get("restaurantId").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(BridgeError::invalid("restaurantId is required")),
    };
    let device_name = frame
        .get("deviceName")
        .and_then(Value::as_str)
        .map(str::to_string);

    state
        .supervisor
        .set_restaurant_id(restaurant_id, device_name)
        .await?;
    Ok(json!({}))
}

async fn print_raw_tcp(frame: &Value) -> BridgeResult<Value> {
    let ip = require_str(frame, "ip")?;
    let port: u16 = optional_number(frame, "port")?.unwrap_or(9100);
    let data = decode_payload(frame)?;

    NetworkPrinter::new(ip, port)?.print(&data).await?;
    Ok(json!({}))
}

async fn discover_tcp_9100(frame: &Value) -> BridgeResult<Value> {
    let port: u16 = optional_number(frame, "port")?.unwrap_or(9100);
    let result = scan_port(port).await?;
    Ok(json!({ "prefix": result.prefix, "ips": result.hits }))
}

async fn discover_usb_devices() -> BridgeResult<Value> {
    let devices = discover_usb().await?;
    Ok(json!({ "devices": devices }))
}

async fn print_raw_usb(frame: &Value) -> BridgeResult<Value> {
    let spec = UsbTargetSpec {
        vendor_id: require_number(frame, "vendorId")?,
        product_id: require_number(frame, "productId")?,
        bus_number: optional_number(frame, "busNumber")?,
        device_address: optional_number(frame, "deviceAddress")?,
        interface_number: optional_number(frame, "interface")?.unwrap_or(0),
        out_endpoint: require_number(frame, "outEndpoint")?,
    };
    let data = decode_payload(frame)?;

    UsbPrinter::new(spec).print(&data).await?;
    Ok(json!({}))
}

async fn discover_os() -> BridgeResult<Value> {
    Ok(json!({ "printers": discover_os_printers().await }))
}

async fn print_os(frame: &Value) -> BridgeResult<Value> {
    let name = require_str(frame, "printerName")?;
    let data = decode_payload(frame)?;

    OsPrinter::new(name).print(&data).await?;
    Ok(json!({}))
}

fn ok_reply(id: i64, extra: Value) -> Value {
    let mut reply = json!({ "id": id, "ok": true });
    if let (Some(target), Value::Object(extra)) = (reply.as_object_mut(), extra) {
        target.extend(extra);
    }
    reply
}

/// Present, non-empty string field
fn require_str<'a>(frame: &'a Value, key: &str) -> BridgeResult<&'a str> {
    match frame.get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(BridgeError::invalid(format!("{key} is required"))),
    }
}

/// Present integer field, converted to the target width
fn require_number<T: TryFrom<u64>>(frame: &Value, key: &str) -> BridgeResult<T> {
    let raw = frame
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| BridgeError::invalid(format!("{key} is required")))?;
    T::try_from(raw).map_err(|_| BridgeError::invalid(format!("{key} is out of range")))
}

/// Absent fields are fine; present fields must be valid integers
fn optional_number<T: TryFrom<u64>>(frame: &Value, key: &str) -> BridgeResult<Option<T>> {
    match frame.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let raw = value
                .as_u64()
                .ok_or_else(|| BridgeError::invalid(format!("{key} must be an integer")))?;
            T::try_from(raw)
                .map(Some)
                .map_err(|_| BridgeError::invalid(format!("{key} is out of range")))
        }
    }
}

/// The payload is mandatory but may decode to zero bytes
fn decode_payload(frame: &Value) -> BridgeResult<Vec<u8>> {
    let raw = frame
        .get("dataB64")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::invalid("dataB64 is required"))?;
    STANDARD
        .decode(raw)
        .map_err(|_| BridgeError::invalid("invalid base64 in dataB64"))
}
