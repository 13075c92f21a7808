//! Output rendering
//!
//! Text output is a fixed-width table meant for people; JSON output is a
//! pretty-printed array meant for scripts.

use crate::core::gateway::{ErrorReport, UnitReport};
use clap::ValueEnum;
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

/// CLI output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for scripting
    Json,
}

fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Render unit reports
pub fn format_units(units: &[UnitReport], format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return json(units);
    }
    if units.is_empty() {
        return Ok("No units present.".to_string());
    }

    let mut out = format!(
        "{:<6} {:<4} {:<10} {:>6} {:>6} {:<12} {:<6} {}",
        "UNIT", "PWR", "MODE", "SET", "ROOM", "FAN", "LOUVRE", "FLAGS"
    );
    for unit in units {
        let mut flags = Vec::new();
        if unit.filter_warning {
            flags.push("filter");
        }
        if unit.defrost {
            flags.push("defrost");
        }
        if unit.thermo {
            flags.push("thermo");
        }
        if unit.holding_dirty {
            flags.push("pending");
        }
        let mode = unit
            .mode
            .map_or_else(|| format!("?{}", unit.mode_code), |m| m.to_string());
        out.push('\n');
        out.push_str(&format!(
            "{:<6} {:<4} {:<10} {:>6.1} {:>6.1} {:<12} {:<6} {}",
            unit.id,
            if unit.power { "on" } else { "off" },
            mode,
            unit.setpoint,
            unit.room_temperature,
            or_dash(unit.fan_speed),
            or_dash(unit.fan_direction),
            flags.join(",")
        ));
    }
    Ok(out)
}

/// Render error reports
pub fn format_errors(errors: &[ErrorReport], format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return json(errors);
    }
    if errors.is_empty() {
        return Ok("No units present.".to_string());
    }

    let mut lines = Vec::with_capacity(errors.len());
    for report in errors {
        if report.is_active() {
            let mut kinds = Vec::new();
            if report.error {
                kinds.push("error");
            }
            if report.alarm {
                kinds.push("alarm");
            }
            if report.warning {
                kinds.push("warning");
            }
            lines.push(format!(
                "{:<6} {} code={}-{:02} unit={}",
                report.id,
                kinds.join("+"),
                if report.code.is_empty() { "--" } else { &report.code },
                report.sub_code,
                report.unit_number
            ));
        } else {
            lines.push(format!("{:<6} ok", report.id));
        }
    }
    Ok(lines.join("\n"))
}

#[derive(Serialize)]
struct PortRow<'a> {
    name: &'a str,
    kind: String,
}

fn port_kind(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => match &usb.product {
            Some(product) => format!("usb {:04x}:{:04x} {}", usb.vid, usb.pid, product),
            None => format!("usb {:04x}:{:04x}", usb.vid, usb.pid),
        },
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// Render serial port list
pub fn format_ports(ports: &[SerialPortInfo], format: OutputFormat) -> serde_json::Result<String> {
    let rows: Vec<PortRow<'_>> = ports
        .iter()
        .map(|p| PortRow {
            name: &p.port_name,
            kind: port_kind(p),
        })
        .collect();

    match format {
        OutputFormat::Json => json(&rows),
        OutputFormat::Text if rows.is_empty() => Ok("No serial ports found.".to_string()),
        OutputFormat::Text => Ok(rows
            .iter()
            .map(|r| format!("{:<20} {}", r.name, r.kind))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}
