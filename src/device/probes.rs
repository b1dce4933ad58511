//! Parsers for the output of the macOS system utilities
//!
//! Kept free of process spawning so they can be exercised with captured output.

use regex::Regex;

pub const FALLBACK_INTERFACE: &str = "en0";
const COMMON_INTERFACES: [&str; 4] = ["en0", "en1", "en2", "en3"];

pub struct Probes {
    battery: Regex,
    boot_time: Regex,
    network: Regex,
    airport_ssid: Regex,
    airport_rssi: Regex,
    profiler_rssi: Regex,
    summary_ssid: Regex,
    swift_ssid: Regex,
    swift_rssi: Regex,
}

impl Probes {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            battery: Regex::new(r"(\d+)%")?,
            boot_time: Regex::new(r"sec = (\d+)")?,
            network: Regex::new(r"Current Wi-Fi Network: (.+)")?,
            airport_ssid: Regex::new(r"\s+SSID: (.+)")?,
            airport_rssi: Regex::new(r"\s+agrCtlRSSI: (-?\d+)")?,
            profiler_rssi: Regex::new(r"\s+RSSI: (-?\d+)")?,
            summary_ssid: Regex::new(r"(?m)^\s*SSID\s*:\s*(.+)$")?,
            swift_ssid: Regex::new(r"(?m)^SSID:(.+)$")?,
            swift_rssi: Regex::new(r"(?m)^RSSI:([-0-9]+)$")?,
        })
    }

    /// `pmset -g batt`
    pub fn battery(&self, output: &str) -> Option<String> {
        capture(&self.battery, output)
    }

    /// `sysctl -n kern.boottime`, relative to `now` in unix seconds
    pub fn uptime(&self, output: &str, now: i64) -> Option<String> {
        let boot: i64 = capture(&self.boot_time, output)?.parse().ok()?;
        Some((now - boot).max(0).to_string())
    }

    /// `networksetup -getairportnetwork <iface>`
    pub fn network_ssid(&self, output: &str) -> Option<String> {
        capture(&self.network, output)
    }

    /// `airport -I`
    pub fn airport_ssid(&self, output: &str) -> Option<String> {
        capture(&self.airport_ssid, output)
    }

    pub fn airport_rssi(&self, output: &str) -> Option<String> {
        capture(&self.airport_rssi, output)
    }

    /// `system_profiler SPAirPortDataType`
    pub fn profiler_rssi(&self, output: &str) -> Option<String> {
        capture(&self.profiler_rssi, output)
    }

    /// `ipconfig getsummary <iface>`
    pub fn summary_ssid(&self, output: &str) -> Option<String> {
        capture(&self.summary_ssid, output)
    }

    /// Output of the CoreWLAN snippet: `(ssid, rssi)`, either may be missing.
    pub fn swift_wifi(&self, output: &str) -> (Option<String>, Option<String>) {
        (
            capture(&self.swift_ssid, output),
            capture(&self.swift_rssi, output),
        )
    }
}

fn capture(pattern: &Regex, output: &str) -> Option<String> {
    let value = pattern.captures(output)?.get(1)?.as_str().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Device name following a `Hardware Port: Wi-Fi` (or `AirPort`) line of
/// `networksetup -listallhardwareports`.
pub fn wifi_interface(listing: &str) -> Option<String> {
    let mut lines = listing.lines();
    while let Some(line) = lines.next() {
        if line.starts_with("Hardware Port: Wi-Fi") || line.starts_with("Hardware Port: AirPort") {
            if let Some(device) = lines.next().and_then(|l| l.strip_prefix("Device: ")) {
                return Some(device.trim().to_string());
            }
        }
    }
    None
}

/// Preferred interface first, then the usual suspects, without duplicates
pub fn interface_candidates(preferred: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(COMMON_INTERFACES.len() + 1);
    for iface in std::iter::once(preferred).chain(COMMON_INTERFACES) {
        if !iface.is_empty() && !candidates.iter().any(|c| c == iface) {
            candidates.push(iface.to_string());
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probes() -> Probes {
        Probes::new().unwrap()
    }

    #[test]
    fn battery_percentage() {
        let output = "Now drawing from 'Battery Power'\n \
            -InternalBattery-0 (id=4653155)\t87%; discharging; 5:12 remaining present: true";
        assert_eq!(probes().battery(output).as_deref(), Some("87"));
        assert_eq!(probes().battery("Now drawing from 'AC Power'"), None);
    }

    #[test]
    fn uptime_from_boottime() {
        let output = "{ sec = 1766859018, usec = 483520 } Sat Dec 27 19:10:18 2025";
        assert_eq!(
            probes().uptime(output, 1766862618).as_deref(),
            Some("3600")
        );
        assert_eq!(probes().uptime("garbage", 1766862618), None);
    }

    #[test]
    fn ssid_sources() {
        let p = probes();
        assert_eq!(
            p.network_ssid("Current Wi-Fi Network: Home Net\n").as_deref(),
            Some("Home Net")
        );
        assert_eq!(p.network_ssid("You are not associated with an AirPort network."), None);

        let airport = "     agrCtlRSSI: -61\n     agrExtRSSI: 0\n          BSSID: aa:bb\n           SSID: Office\n";
        assert_eq!(p.airport_ssid(airport).as_deref(), Some("Office"));
        assert_eq!(p.airport_rssi(airport).as_deref(), Some("-61"));

        let summary = "<dictionary> {\n  InterfaceType : WiFi\n  SSID : Cafe\n}";
        assert_eq!(p.summary_ssid(summary).as_deref(), Some("Cafe"));
    }

    #[test]
    fn rssi_sources() {
        let p = probes();
        let profiler = "Current Network Information:\n  Home:\n    PHY Mode: 802.11ax\n    RSSI: -48\n";
        assert_eq!(p.profiler_rssi(profiler).as_deref(), Some("-48"));

        assert_eq!(
            p.swift_wifi("SSID:Home\nRSSI:-52\n"),
            (Some("Home".to_string()), Some("-52".to_string()))
        );
        assert_eq!(p.swift_wifi("RSSI:-70\n"), (None, Some("-70".to_string())));
    }

    #[test]
    fn hardware_port_listing() {
        let listing = "Hardware Port: Ethernet\nDevice: en0\nEthernet Address: x\n\n\
            Hardware Port: Wi-Fi\nDevice: en1\nEthernet Address: y\n";
        assert_eq!(wifi_interface(listing).as_deref(), Some("en1"));
        assert_eq!(wifi_interface("Hardware Port: Thunderbolt\nDevice: en5\n"), None);
    }

    #[test]
    fn candidates_are_unique_and_ordered() {
        assert_eq!(interface_candidates("en2"), vec!["en2", "en0", "en1", "en3"]);
        assert_eq!(interface_candidates("en0"), vec!["en0", "en1", "en2", "en3"]);
    }
}
