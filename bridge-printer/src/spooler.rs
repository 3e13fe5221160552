//! OS spooler transport
//!
//! Submits raw byte blobs to printers installed in the operating system's
//! print system, and enumerates those printers. Everything goes through
//! subprocesses (CUPS tools on unix, the spooler CLI on Windows); both
//! output streams are always drained and temp files removed on every exit
//! path.

use crate::error::{PrintError, PrintResult};
use crate::tcp::Printer;
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// One printer known to the OS print system
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsPrinterRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_default: bool,
}

/// Enumerate printers registered with the OS
///
/// Discovery is advisory: every failure (missing tool, parse error) is
/// swallowed into an empty list.
pub async fn discover_os_printers() -> Vec<OsPrinterRecord> {
    match platform::discover().await {
        Ok(printers) => printers,
        Err(e) => {
            warn!(error = %e, "OS printer discovery failed");
            Vec::new()
        }
    }
}

/// A printer addressed by its OS spooler name
#[derive(Debug, Clone)]
pub struct OsPrinter {
    name: String,
}

impl OsPrinter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Printer for OsPrinter {
    #[instrument(skip(self, data), fields(printer = %self.name, bytes = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        platform::print(&self.name, data).await
    }
}

#[cfg(unix)]
mod platform {
    use super::*;
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    /// CUPS discovery via `lpstat -p -d`
    pub async fn discover() -> PrintResult<Vec<OsPrinterRecord>> {
        let output = Command::new("lpstat").args(["-p", "-d"]).output().await?;
        Ok(parse_lpstat(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Submit raw bytes through `lp`, streaming the payload on stdin
    pub async fn print(name: &str, data: &[u8]) -> PrintResult<()> {
        let mut child = Command::new("lp")
            .args(["-d", name, "-o", "raw", "-s"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data).await?;
            // Closing stdin tells lp the job is complete
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            debug!(printer = name, "Spooler accepted job");
            return Ok(());
        }

        let mut diag = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diag.is_empty() {
            diag = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Err(PrintError::Spooler(format!(
            "lp exited with {}: {diag}",
            output.status
        )))
    }

    /// Parse `lpstat -p -d` output
    ///
    /// Expected lines:
    ///   `printer Kitchen is idle.  enabled since ...`
    ///   `system default destination: Kitchen`
    pub(super) fn parse_lpstat(text: &str) -> Vec<OsPrinterRecord> {
        let mut printers: Vec<OsPrinterRecord> = Vec::new();
        let mut default_name: Option<&str> = None;

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("printer ") {
                let Some((name, after)) = rest.split_once(" is ") else {
                    continue;
                };
                let state = after
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_end_matches('.');
                let description = match state {
                    "idle" => "Ready",
                    "printing" => "Printing",
                    _ => "Unknown",
                };
                printers.push(OsPrinterRecord {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    is_default: false,
                });
            } else if let Some(rest) = line.strip_prefix("system default destination: ") {
                default_name = Some(rest.trim());
            }
        }

        if let Some(default) = default_name {
            for printer in &mut printers {
                printer.is_default = printer.name == default;
            }
        }

        printers
    }
}

#[cfg(windows)]
mod platform {
    use super::*;
    use std::io::Write;
    use tokio::process::Command;

    /// Spooler enumeration via PowerShell, falling back to WMIC
    pub async fn discover() -> PrintResult<Vec<OsPrinterRecord>> {
        let output = Command::new("powershell")
            .args([
                "-NoProfile",
                "-Command",
                "Get-CimInstance Win32_Printer | ForEach-Object { \
                 \"$($_.Name)|$($_.Default)|$($_.PrinterStatus)\" }",
            ])
            .output()
            .await?;

        let printers = parse_pipe_list(&String::from_utf8_lossy(&output.stdout));
        if !printers.is_empty() {
            return Ok(printers);
        }

        // Older hosts without CIM cmdlets
        let output = Command::new("wmic")
            .args(["printer", "get", "Name,Default", "/format:csv"])
            .output()
            .await?;
        Ok(parse_wmic_csv(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Raw submission: spool file on disk, handed to the spooler CLI
    pub async fn print(name: &str, data: &[u8]) -> PrintResult<()> {
        let mut spool = tempfile::NamedTempFile::new()?;
        spool.write_all(data)?;
        spool.flush()?;

        let output = Command::new("print")
            .arg(format!("/D:{name}"))
            .arg(spool.path())
            .output()
            .await;

        // NamedTempFile removes the spool file when dropped, on every path
        let output = output?;
        if output.status.success() {
            debug!(printer = name, "Spooler accepted job");
            return Ok(());
        }

        let mut diag = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diag.is_empty() {
            diag = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Err(PrintError::Spooler(format!(
            "print exited with {}: {diag}",
            output.status
        )))
    }

    /// `Name|Default|Status` lines from PowerShell
    fn parse_pipe_list(text: &str) -> Vec<OsPrinterRecord> {
        text.lines()
            .filter_map(|line| {
                let mut parts = line.trim().splitn(3, '|');
                let name = parts.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                let is_default = parts.next().is_some_and(|d| d.trim() == "True");
                let description = match parts.next().map(str::trim) {
                    Some("3") => Some("Ready".to_string()),
                    Some("4") => Some("Printing".to_string()),
                    _ => Some("Unknown".to_string()),
                };
                Some(OsPrinterRecord {
                    name: name.to_string(),
                    description,
                    is_default,
                })
            })
            .collect()
    }

    /// WMIC CSV fallback: `Node,Default,Name`
    fn parse_wmic_csv(text: &str) -> Vec<OsPrinterRecord> {
        text.lines()
            .skip(1)
            .filter_map(|line| {
                let fields: Vec<&str> = line.trim().split(',').collect();
                if fields.len() < 3 || fields[2].is_empty() {
                    return None;
                }
                Some(OsPrinterRecord {
                    name: fields[2].to_string(),
                    description: None,
                    is_default: fields[1] == "TRUE",
                })
            })
            .collect()
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use super::*;

    pub async fn discover() -> PrintResult<Vec<OsPrinterRecord>> {
        Ok(Vec::new())
    }

    pub async fn print(_name: &str, _data: &[u8]) -> PrintResult<()> {
        Err(PrintError::Unsupported)
    }
}
