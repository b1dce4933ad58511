//! macOS implementation backed by the stock system utilities

use super::probes::{self, Probes, FALLBACK_INTERFACE};
use super::{Device, DeviceError, NOT_CONNECTED, UNKNOWN_APP, ZERO};
use crate::mqtt::codec::{decode_bool, encode_bool};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

const OSASCRIPT: &str = "/usr/bin/osascript";
const PMSET: &str = "/usr/bin/pmset";
const SYSCTL: &str = "/usr/sbin/sysctl";
const NETWORKSETUP: &str = "/usr/sbin/networksetup";
const IPCONFIG: &str = "/usr/sbin/ipconfig";
const SYSTEM_PROFILER: &str = "/usr/sbin/system_profiler";
const SWIFT: &str = "/usr/bin/swift";

const AIRPORT_VERSIONS: &str = "/System/Library/PrivateFrameworks/Apple80211.framework/Versions";
const AIRPORT_BINARY: &str = "Resources/airport";

const COREWLAN_SNIPPET: &str = r#"
import CoreWLAN
if let iface = CWWiFiClient.shared().interface() {
    if let ssid = iface.ssid() {
        print("SSID:\(ssid)")
    }
    print("RSSI:\(iface.rssiValue())")
}
"#;

pub struct MacOsDevice {
    probes: Probes,
    debug: bool,
    wifi_interface: String,
    airport: Option<PathBuf>,
    swift_cache: Option<TempDir>,
    ssid_note: Once,
}

impl MacOsDevice {
    /// Resolves the Wi-Fi interface, the airport utility and the Swift module
    /// cache once; they do not change while the process runs.
    pub async fn probe(debug: bool) -> Result<Self, regex::Error> {
        let probes = Probes::new()?;

        let wifi_interface = match output(NETWORKSETUP, &["-listallhardwareports"]).await {
            Ok(listing) => probes::wifi_interface(&listing),
            Err(e) => {
                if debug {
                    warn!("Failed to list hardware ports: {}", e);
                }
                None
            }
        }
        .unwrap_or_else(|| FALLBACK_INTERFACE.to_string());
        debug!("Wi-Fi interface: {}", wifi_interface);

        let airport = find_airport(Path::new(AIRPORT_VERSIONS));
        match &airport {
            Some(path) => debug!("airport utility at {}", path.display()),
            None => debug!("airport utility not found"),
        }

        let swift_cache = match tempfile::Builder::new()
            .prefix("mac2mqtt-swiftcache")
            .tempdir()
        {
            Ok(dir) => Some(dir),
            Err(e) => {
                if debug {
                    warn!("Unable to create Swift cache dir: {}", e);
                }
                None
            }
        };

        Ok(Self {
            probes,
            debug,
            wifi_interface,
            airport,
            swift_cache,
            ssid_note: Once::new(),
        })
    }

    async fn osascript(&self, script: &str) -> Result<String, DeviceError> {
        output(OSASCRIPT, &["-e", script]).await
    }

    /// Probe output, or `None` with a warning in debug mode
    async fn optional(&self, program: &str, args: &[&str]) -> Option<String> {
        match output(program, args).await {
            Ok(out) => Some(out),
            Err(e) => {
                if self.debug {
                    warn!("{}", e);
                }
                None
            }
        }
    }

    fn candidates(&self) -> Vec<String> {
        probes::interface_candidates(&self.wifi_interface)
    }

    async fn airport_info(&self) -> Option<String> {
        let path = self.airport.as_ref()?;
        match output(&path.to_string_lossy(), &["-I"]).await {
            Ok(out) => Some(out),
            Err(e) => {
                warn!("Failed to run {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn ssid_from_networksetup(&self) -> Option<String> {
        for (i, iface) in self.candidates().iter().enumerate() {
            // networksetup reports "not associated" with a zero exit code
            let out = match combined_output(NETWORKSETUP, &["-getairportnetwork", iface]).await {
                Ok(out) => out,
                Err(e) => {
                    if self.debug && i == 0 {
                        warn!("networksetup -getairportnetwork {} failed: {}", iface, e);
                    }
                    continue;
                }
            };
            if let Some(ssid) = self.probes.network_ssid(&out) {
                return Some(ssid);
            }
        }
        None
    }

    async fn ssid_from_ipconfig(&self) -> Option<String> {
        for (i, iface) in self.candidates().iter().enumerate() {
            match output(IPCONFIG, &["getsummary", iface]).await {
                Ok(out) => {
                    if let Some(ssid) = self.probes.summary_ssid(&out) {
                        return Some(ssid);
                    }
                }
                Err(e) => {
                    if self.debug && i == 0 {
                        warn!("ipconfig getsummary {} failed: {}", iface, e);
                    }
                }
            }
        }
        None
    }

    async fn corewlan(&self) -> (Option<String>, Option<String>) {
        let mut command = Command::new(SWIFT);
        command.args(["-e", COREWLAN_SNIPPET]);
        if let Some(cache) = &self.swift_cache {
            command
                .env("SWIFT_MODULE_CACHE_PATH", cache.path())
                .env("CLANG_MODULE_CACHE_PATH", cache.path());
        }

        match command.output().await {
            Ok(out) if out.status.success() => {
                self.probes.swift_wifi(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                if self.debug {
                    warn!(
                        "swift CoreWLAN SSID/RSSI failed: {} ({})",
                        out.status,
                        String::from_utf8_lossy(&out.stderr).trim()
                    );
                }
                (None, None)
            }
            Err(e) => {
                if self.debug {
                    warn!("swift CoreWLAN SSID/RSSI failed: {}", e);
                }
                (None, None)
            }
        }
    }
}

#[async_trait]
impl Device for MacOsDevice {
    async fn volume(&self) -> u8 {
        match self.osascript("output volume of (get volume settings)").await {
            Ok(out) => out.parse::<u8>().map(|v| v.min(100)).unwrap_or(0),
            Err(e) => {
                warn!("Failed to read volume: {}", e);
                0
            }
        }
    }

    async fn set_volume(&self, volume: u8) -> Result<(), DeviceError> {
        self.osascript(&format!("set volume output volume {}", volume))
            .await
            .map(|_| ())
    }

    async fn muted(&self) -> bool {
        match self.osascript("output muted of (get volume settings)").await {
            Ok(out) => decode_bool(&out).unwrap_or(false),
            Err(e) => {
                warn!("Failed to read mute state: {}", e);
                false
            }
        }
    }

    async fn set_mute(&self, muted: bool) -> Result<(), DeviceError> {
        self.osascript(&format!("set volume output muted {}", encode_bool(muted)))
            .await
            .map(|_| ())
    }

    async fn sleep(&self) -> Result<(), DeviceError> {
        output(PMSET, &["sleepnow"]).await.map(|_| ())
    }

    async fn display_sleep(&self) -> Result<(), DeviceError> {
        output(PMSET, &["displaysleepnow"]).await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), DeviceError> {
        if is_root() {
            output("shutdown", &["-h", "now"]).await.map(|_| ())
        } else {
            // May be refused while another user is logged in
            self.osascript("tell app \"System Events\" to shut down")
                .await
                .map(|_| ())
        }
    }

    async fn battery_percent(&self) -> String {
        self.optional(PMSET, &["-g", "batt"])
            .await
            .and_then(|out| self.probes.battery(&out))
            .unwrap_or_else(|| ZERO.to_string())
    }

    async fn active_app(&self) -> String {
        self.osascript(
            "tell application \"System Events\" to get name of first application process whose frontmost is true",
        )
        .await
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_APP.to_string())
    }

    async fn wifi_ssid(&self) -> String {
        if let Some(ssid) = self.ssid_from_networksetup().await {
            return ssid;
        }
        if let Some(ssid) = self.ssid_from_ipconfig().await {
            return ssid;
        }
        if let (Some(ssid), _) = self.corewlan().await {
            return ssid;
        }
        if let Some(ssid) = self
            .airport_info()
            .await
            .and_then(|out| self.probes.airport_ssid(&out))
        {
            return ssid;
        }

        self.ssid_note.call_once(|| {
            info!(
                "Note: Wi-Fi SSID unavailable. Modern macOS versions require Location Services \
                 permission to access SSID. Signal strength and IP address will continue to work."
            )
        });
        NOT_CONNECTED.to_string()
    }

    async fn wifi_signal(&self) -> String {
        if let Some(rssi) = self
            .airport_info()
            .await
            .and_then(|out| self.probes.airport_rssi(&out))
        {
            return rssi;
        }
        if let Some(rssi) = self
            .optional(SYSTEM_PROFILER, &["-detailLevel", "mini", "SPAirPortDataType"])
            .await
            .and_then(|out| self.probes.profiler_rssi(&out))
        {
            return rssi;
        }
        if let (_, Some(rssi)) = self.corewlan().await {
            return rssi;
        }
        ZERO.to_string()
    }

    async fn wifi_ip(&self) -> String {
        // ipconfig exits non-zero when the interface has no address
        match output(IPCONFIG, &["getifaddr", &self.wifi_interface]).await {
            Ok(ip) if !ip.is_empty() => ip,
            _ => NOT_CONNECTED.to_string(),
        }
    }

    async fn uptime_seconds(&self) -> String {
        self.optional(SYSCTL, &["-n", "kern.boottime"])
            .await
            .and_then(|out| self.probes.uptime(&out, chrono::Utc::now().timestamp()))
            .unwrap_or_else(|| ZERO.to_string())
    }
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn find_airport(versions: &Path) -> Option<PathBuf> {
    let preferred = ["Current", "A"]
        .into_iter()
        .map(|v| versions.join(v).join(AIRPORT_BINARY));

    let mut others: Vec<PathBuf> = std::fs::read_dir(versions)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path().join(AIRPORT_BINARY))
                .collect()
        })
        .unwrap_or_default();
    others.sort();

    preferred.chain(others).find(|path| path.exists())
}

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stdout of a successful run, trailing newline removed
async fn output(program: &str, args: &[&str]) -> Result<String, DeviceError> {
    let out = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| DeviceError::Spawn {
            command: describe(program, args),
            source,
        })?;

    if !out.status.success() {
        return Err(DeviceError::Failed {
            command: describe(program, args),
            status: out.status,
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&out.stdout)
        .trim_end_matches('\n')
        .to_string())
}

/// Stdout and stderr together, regardless of the exit status
async fn combined_output(program: &str, args: &[&str]) -> Result<String, DeviceError> {
    let out = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| DeviceError::Spawn {
            command: describe(program, args),
            source,
        })?;

    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(text)
}
