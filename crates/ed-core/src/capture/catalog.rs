//! Platform capture catalog.
//!
//! A data table mapping each module to its per-OS command list. The OS is
//! detected once at runtime and can be injected for tests.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Operating system family that selects the command variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Linux,
    MacOs,
    Windows,
    /// Anything else; only POSIX-ish fallbacks are attempted.
    Other,
}

impl TargetOs {
    /// The OS this process is running on.
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value.
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "linux" => TargetOs::Linux,
            "macos" => TargetOs::MacOs,
            "windows" => TargetOs::Windows,
            _ => TargetOs::Other,
        }
    }
}

impl FromStr for TargetOs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(TargetOs::Linux),
            "macos" | "darwin" | "osx" => Ok(TargetOs::MacOs),
            "windows" | "win" => Ok(TargetOs::Windows),
            "other" => Ok(TargetOs::Other),
            _ => Err(format!("unknown OS: {}", s)),
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOs::Linux => write!(f, "linux"),
            TargetOs::MacOs => write!(f, "macos"),
            TargetOs::Windows => write!(f, "windows"),
            TargetOs::Other => write!(f, "other"),
        }
    }
}

/// A named group of commands collecting one category of diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureModule {
    /// Identifier used for the log file and manifest entry.
    pub name: String,
    pub display_name: String,
    /// Shell command lines, attempted in order.
    pub commands: Vec<String>,
}

impl CaptureModule {
    pub fn new(name: &str, display_name: &str, commands: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
        }
    }
}

struct CatalogRow {
    name: &'static str,
    display_name: &'static str,
    linux: &'static [&'static str],
    macos: &'static [&'static str],
    windows: &'static [&'static str],
    other: &'static [&'static str],
}

const CATALOG: &[CatalogRow] = &[
    CatalogRow {
        name: "os_version",
        display_name: "OS Version",
        linux: &["uname -a", "cat /etc/os-release"],
        macos: &["sw_vers", "uname -a"],
        windows: &["ver", "wmic os get Caption,Version,BuildNumber /value"],
        other: &["uname -a"],
    },
    CatalogRow {
        name: "uptime",
        display_name: "Uptime",
        linux: &["uptime"],
        macos: &["uptime"],
        windows: &["net statistics workstation"],
        other: &["uptime"],
    },
    CatalogRow {
        name: "disk",
        display_name: "Disk Usage",
        linux: &["df -h"],
        macos: &["df -h"],
        windows: &["wmic logicaldisk get Caption,FreeSpace,Size"],
        other: &["df -h"],
    },
    CatalogRow {
        name: "memory",
        display_name: "Memory",
        linux: &["free -h || cat /proc/meminfo"],
        macos: &["vm_stat"],
        windows: &["wmic OS get FreePhysicalMemory,TotalVisibleMemorySize /value"],
        other: &[],
    },
    CatalogRow {
        name: "network",
        display_name: "Network",
        linux: &["ip addr || ifconfig -a"],
        macos: &["ifconfig -a"],
        windows: &["ipconfig /all"],
        other: &[],
    },
    CatalogRow {
        name: "processes",
        display_name: "Process Summary",
        linux: &["ps aux --sort=-%cpu | head -n 30 || ps aux"],
        macos: &["ps aux -r | head -n 30"],
        windows: &["tasklist"],
        other: &[],
    },
];

/// The fixed module catalog for `os`, in execution order.
pub fn catalog(os: TargetOs) -> Vec<CaptureModule> {
    CATALOG
        .iter()
        .map(|row| {
            let commands = match os {
                TargetOs::Linux => row.linux,
                TargetOs::MacOs => row.macos,
                TargetOs::Windows => row.windows,
                TargetOs::Other => row.other,
            };
            CaptureModule::new(row.name, row.display_name, commands)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TargetOs; 4] = [
        TargetOs::Linux,
        TargetOs::MacOs,
        TargetOs::Windows,
        TargetOs::Other,
    ];

    #[test]
    fn test_catalog_module_order_is_fixed() {
        for os in ALL {
            let names: Vec<_> = catalog(os).into_iter().map(|m| m.name).collect();
            assert_eq!(
                names,
                vec!["os_version", "uptime", "disk", "memory", "network", "processes"],
                "order for {os}"
            );
        }
    }

    #[test]
    fn test_known_platforms_have_commands_everywhere() {
        for os in [TargetOs::Linux, TargetOs::MacOs, TargetOs::Windows] {
            for module in catalog(os) {
                assert!(
                    !module.commands.is_empty(),
                    "{} has no commands on {}",
                    module.name,
                    os
                );
            }
        }
    }

    #[test]
    fn test_other_platform_fallbacks() {
        let modules = catalog(TargetOs::Other);
        let by_name = |n: &str| modules.iter().find(|m| m.name == n).unwrap();

        assert_eq!(by_name("os_version").commands, vec!["uname -a"]);
        assert_eq!(by_name("uptime").commands, vec!["uptime"]);
        assert_eq!(by_name("disk").commands, vec!["df -h"]);
        assert!(by_name("memory").commands.is_empty());
        assert!(by_name("network").commands.is_empty());
        assert!(by_name("processes").commands.is_empty());
    }

    #[test]
    fn test_linux_network_falls_back_to_ifconfig() {
        let modules = catalog(TargetOs::Linux);
        let network = modules.iter().find(|m| m.name == "network").unwrap();
        assert_eq!(network.commands, vec!["ip addr || ifconfig -a"]);
    }

    #[test]
    fn test_target_os_parsing() {
        assert_eq!("linux".parse::<TargetOs>().unwrap(), TargetOs::Linux);
        assert_eq!("Darwin".parse::<TargetOs>().unwrap(), TargetOs::MacOs);
        assert_eq!("windows".parse::<TargetOs>().unwrap(), TargetOs::Windows);
        assert_eq!("other".parse::<TargetOs>().unwrap(), TargetOs::Other);
        assert!("plan9".parse::<TargetOs>().is_err());
    }

    #[test]
    fn test_from_os_name() {
        assert_eq!(TargetOs::from_os_name("linux"), TargetOs::Linux);
        assert_eq!(TargetOs::from_os_name("macos"), TargetOs::MacOs);
        assert_eq!(TargetOs::from_os_name("windows"), TargetOs::Windows);
        assert_eq!(TargetOs::from_os_name("freebsd"), TargetOs::Other);
    }

    #[test]
    fn test_display_roundtrip() {
        for os in ALL {
            assert_eq!(os.to_string().parse::<TargetOs>().unwrap(), os);
        }
    }
}
