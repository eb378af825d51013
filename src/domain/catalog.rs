//! The Linux section plan.
//!
//! Candidate order inside every source is the preference order: structured or
//! modern tool first, legacy tool next, raw pseudo-file last. Section order is
//! the report order.

use std::time::Duration;

use anyhow::{bail, Result};

use super::collector::Section;
use super::source::Elevation::{Mandatory, Optional};
use super::source::{Candidate, DataSource};

/// dnf, yum and checkupdates may refresh repository metadata first.
const METADATA_TIMEOUT: Duration = Duration::from_secs(60);

pub fn default_plan() -> Vec<Section> {
    vec![
        identity(),
        operating_system(),
        cpu(),
        memory(),
        storage(),
        network(),
        users(),
        services(),
        packages(),
        firewall(),
        security(),
        processes(),
        scheduled_tasks(),
        containers(),
        time_sync(),
    ]
}

/// Keep sections whose title matches `only` (when non-empty) and does not
/// match `skip`. Matching is case-insensitive; a name that matches no
/// section is an error.
pub fn filter(plan: Vec<Section>, only: &[String], skip: &[String]) -> Result<Vec<Section>> {
    let known = |name: &String| plan.iter().any(|s| s.title.eq_ignore_ascii_case(name));
    if let Some(unknown) = only.iter().chain(skip).find(|name| !known(name)) {
        let titles: Vec<&str> = plan.iter().map(|s| s.title.as_str()).collect();
        bail!(
            "unknown section '{}' (valid sections: {})",
            unknown,
            titles.join(", ")
        );
    }

    let matches = |list: &[String], title: &str| list.iter().any(|t| t.eq_ignore_ascii_case(title));
    Ok(plan
        .into_iter()
        .filter(|s| only.is_empty() || matches(only, &s.title))
        .filter(|s| !matches(skip, &s.title))
        .collect())
}

/// Pipe `first` into `rest` only when `first` itself succeeded. A plain
/// pipeline exits with the last stage's status, which turns a failing tool
/// into "0" or "(none)".
fn checked_pipe(first: &str, rest: &str) -> String {
    format!("out=$({}) && printf '%s\\n' \"$out\" | {}", first, rest)
}

/// crontab exits 1 both for "no crontab for <user>" and for real errors;
/// only the former is an empty answer.
fn crontab_listing(command: &str) -> String {
    format!(
        "if out=$({} 2>&1); then printf '%s\\n' \"$out\"; \
         else case \"$out\" in *'no crontab for'*) ;; *) exit 1 ;; esac; fi",
        command
    )
}

fn identity() -> Section {
    Section::new("Identity")
        .source(
            DataSource::new("Hostname")
                .candidate(Candidate::shell("hostnamectl status --no-pager"))
                .candidate(Candidate::shell("hostname -f"))
                .candidate(Candidate::file("/etc/hostname")),
        )
        .source(
            DataSource::new("Kernel")
                .candidate(Candidate::shell("uname -a"))
                .candidate(Candidate::file("/proc/version")),
        )
        .source(
            DataSource::new("Uptime")
                .candidate(Candidate::shell("uptime -p"))
                .candidate(Candidate::shell("uptime"))
                .candidate(Candidate::file("/proc/uptime")),
        )
        .source(
            DataSource::new("Virtualization")
                // exits 1 after printing "none" on bare metal
                .candidate(Candidate::shell("systemd-detect-virt || true"))
                .candidate(Candidate::file("/sys/class/dmi/id/product_name")),
        )
}

fn operating_system() -> Section {
    Section::new("Operating System")
        .source(
            DataSource::new("Release")
                .candidate(Candidate::file("/etc/os-release"))
                .candidate(Candidate::file("/usr/lib/os-release"))
                .candidate(Candidate::shell("lsb_release -a"))
                .candidate(Candidate::file("/etc/issue")),
        )
        .source(
            DataSource::new("Locale")
                .candidate(Candidate::shell("localectl status --no-pager"))
                .candidate(Candidate::shell("locale")),
        )
        .source(
            DataSource::new("Boot")
                .candidate(Candidate::shell("who -b"))
                .candidate(Candidate::file("/proc/cmdline")),
        )
}

fn cpu() -> Section {
    Section::new("CPU")
        .source(
            DataSource::new("Processor")
                .candidate(Candidate::shell("lscpu"))
                .candidate(Candidate::file("/proc/cpuinfo")),
        )
        .source(DataSource::new("Load").candidate(Candidate::file("/proc/loadavg")))
}

fn memory() -> Section {
    Section::new("Memory")
        .source(
            DataSource::new("Usage")
                .candidate(Candidate::shell("free -h"))
                .candidate(Candidate::file("/proc/meminfo")),
        )
        .source(
            DataSource::new("Swap")
                .candidate(Candidate::shell("swapon --show").accept_empty())
                .candidate(Candidate::file("/proc/swaps")),
        )
}

fn storage() -> Section {
    Section::new("Storage")
        .source(
            DataSource::new("Block Devices")
                .candidate(Candidate::shell(
                    "lsblk -o NAME,SIZE,TYPE,FSTYPE,MOUNTPOINT,MODEL",
                ))
                .candidate(Candidate::file("/proc/partitions")),
        )
        .source(
            DataSource::new("Filesystems")
                .candidate(Candidate::shell(
                    "df -hT -x tmpfs -x devtmpfs -x squashfs -x overlay",
                ))
                .candidate(Candidate::shell("df -h"))
                .candidate(Candidate::file("/proc/mounts")),
        )
        .source(DataSource::new("Fstab").candidate(Candidate::file("/etc/fstab")))
        .source(
            DataSource::new("Software RAID")
                .candidate(Candidate::file("/proc/mdstat"))
                .candidate(Candidate::shell("mdadm --detail --scan").elevate(Mandatory)),
        )
        .source(
            DataSource::new("LVM")
                .candidate(Candidate::shell("lvs").elevate(Mandatory).accept_empty())
                .candidate(Candidate::shell("lvm lvs").elevate(Mandatory).accept_empty()),
        )
}

fn network() -> Section {
    Section::new("Network")
        .source(
            DataSource::new("Interfaces")
                .candidate(Candidate::shell("ip -brief address"))
                .candidate(Candidate::shell("ip addr"))
                .candidate(Candidate::shell("ifconfig -a"))
                .candidate(Candidate::file("/proc/net/dev")),
        )
        .source(
            DataSource::new("Routing")
                .candidate(Candidate::shell("ip route"))
                .candidate(Candidate::shell("route -n"))
                .candidate(Candidate::shell("netstat -rn"))
                .candidate(Candidate::file("/proc/net/route")),
        )
        .source(
            DataSource::new("DNS")
                .candidate(Candidate::shell("resolvectl status --no-pager"))
                .candidate(Candidate::file("/etc/resolv.conf")),
        )
        .source(
            DataSource::new("Listening Ports")
                .candidate(Candidate::shell("ss -tulpen").elevate(Optional))
                .candidate(Candidate::shell("ss -tuln"))
                .candidate(Candidate::shell("netstat -tulpn").elevate(Optional))
                .candidate(Candidate::shell("netstat -tuln")),
        )
        .source(DataSource::new("Hosts File").candidate(Candidate::file("/etc/hosts")))
}

fn users() -> Section {
    Section::new("Users")
        .source(
            DataSource::new("Sessions")
                .candidate(Candidate::shell("who").accept_empty())
                .candidate(Candidate::shell("w -h").accept_empty()),
        )
        .source(
            DataSource::new("Recent Logins")
                .candidate(Candidate::shell("last -n 20").combined())
                .candidate(Candidate::shell("lastlog").elevate(Optional)),
        )
        .source(
            DataSource::new("Login Accounts")
                .candidate(
                    Candidate::shell("awk -F: '$7 !~ /(nologin|false)$/ {print $1\":\"$3\":\"$6\":\"$7}' /etc/passwd")
                        .requires("/etc/passwd"),
                )
                .candidate(Candidate::file("/etc/passwd")),
        )
        .source(
            DataSource::new("Privileged Groups")
                // exits 2 when any of the groups is missing
                .candidate(
                    Candidate::shell("getent group sudo wheel admin || [ $? -eq 2 ]")
                        .accept_empty(),
                )
                .candidate(Candidate::file("/etc/group")),
        )
}

fn services() -> Section {
    Section::new("Services")
        .source(
            DataSource::new("Running")
                .candidate(Candidate::shell(
                    "systemctl list-units --type=service --state=running --no-pager --no-legend",
                ))
                .candidate(Candidate::shell("service --status-all").combined())
                .candidate(Candidate::shell("rc-status --all")),
        )
        .source(
            DataSource::new("Failed")
                .candidate(
                    Candidate::shell("systemctl --failed --no-pager --no-legend").accept_empty(),
                )
                .candidate(Candidate::shell("rc-status --crashed").accept_empty()),
        )
        .source(
            DataSource::new("Timers")
                .candidate(Candidate::shell("systemctl list-timers --all --no-pager")),
        )
}

fn packages() -> Section {
    Section::new("Packages")
        .source(
            DataSource::new("Installed")
                .candidate(Candidate::script(
                    checked_pipe("dpkg-query -f '.\\n' -W", "wc -l"),
                    &["dpkg-query", "wc"],
                ))
                .candidate(Candidate::script(checked_pipe("rpm -qa", "wc -l"), &["rpm", "wc"]))
                .candidate(Candidate::script(
                    checked_pipe("pacman -Q", "wc -l"),
                    &["pacman", "wc"],
                ))
                .candidate(Candidate::script(checked_pipe("apk info", "wc -l"), &["apk", "wc"])),
        )
        .source(
            DataSource::new("Upgradable")
                .candidate(
                    Candidate::script(
                        checked_pipe("apt list --upgradable 2>/dev/null", "tail -n +2"),
                        &["apt", "tail"],
                    )
                    .accept_empty(),
                )
                // exit 100 means updates are available
                .candidate(
                    Candidate::shell("dnf -q check-update || [ $? -eq 100 ]")
                        .accept_empty()
                        .timeout(METADATA_TIMEOUT),
                )
                .candidate(
                    Candidate::shell("yum -q check-update || [ $? -eq 100 ]")
                        .accept_empty()
                        .timeout(METADATA_TIMEOUT),
                )
                // exit 2 means nothing to upgrade
                .candidate(
                    Candidate::shell("checkupdates || [ $? -eq 2 ]")
                        .accept_empty()
                        .timeout(METADATA_TIMEOUT),
                ),
        )
        .source(
            DataSource::new("Snap and Flatpak")
                .candidate(Candidate::shell("snap list"))
                .candidate(Candidate::shell("flatpak list").accept_empty()),
        )
}

fn firewall() -> Section {
    Section::new("Firewall").source(
        DataSource::new("Ruleset")
            .candidate(Candidate::shell("ufw status verbose").elevate(Mandatory))
            .candidate(Candidate::shell("firewall-cmd --list-all").elevate(Mandatory))
            .candidate(Candidate::shell("nft list ruleset").elevate(Mandatory))
            .candidate(Candidate::shell("iptables-save").elevate(Mandatory))
            .candidate(Candidate::shell("iptables -S").elevate(Mandatory)),
    )
}

fn security() -> Section {
    Section::new("Security")
        .source(
            DataSource::new("SELinux")
                .candidate(Candidate::shell("sestatus"))
                .candidate(Candidate::shell("getenforce"))
                .candidate(Candidate::file("/sys/fs/selinux/enforce")),
        )
        .source(
            DataSource::new("AppArmor")
                .candidate(Candidate::shell("aa-status").elevate(Mandatory))
                .candidate(Candidate::file("/sys/module/apparmor/parameters/enabled")),
        )
        .source(
            DataSource::new("SSH Daemon")
                .candidate(
                    Candidate::shell("sshd -T")
                        .elevate(Mandatory)
                        .combined(),
                )
                .candidate(
                    Candidate::shell("grep -Ev '^[[:space:]]*(#|$)' /etc/ssh/sshd_config")
                        .requires("/etc/ssh/sshd_config"),
                ),
        )
}

fn processes() -> Section {
    Section::new("Processes")
        .source(
            DataSource::new("Count")
                .candidate(Candidate::script(
                    checked_pipe("ps -e --no-headers", "wc -l"),
                    &["ps", "wc"],
                )),
        )
        .source(
            DataSource::new("Top CPU")
                .candidate(
                    Candidate::shell("ps -eo pid,user,%cpu,%mem,comm --sort=-%cpu | head -n 16")
                        .requires("head"),
                )
                .candidate(Candidate::shell("top -b -n 1 | head -n 25").requires("head")),
        )
        .source(
            DataSource::new("Top Memory")
                .candidate(
                    Candidate::shell("ps -eo pid,user,%mem,rss,comm --sort=-%mem | head -n 16")
                        .requires("head"),
                )
                .candidate(Candidate::shell("top -b -n 1 -o %MEM | head -n 25").requires("head")),
        )
}

fn scheduled_tasks() -> Section {
    Section::new("Scheduled Tasks")
        .source(DataSource::new("System Crontab").candidate(Candidate::file("/etc/crontab")))
        .source(
            DataSource::new("Cron Directories")
                .candidate(
                    Candidate::shell(
                        "ls -l /etc/cron.d /etc/cron.hourly /etc/cron.daily /etc/cron.weekly /etc/cron.monthly || true",
                    )
                    .requires("/etc/cron.d")
                    .combined(),
                ),
        )
        .source(
            DataSource::new("Current User Crontab").candidate(
                Candidate::script(crontab_listing("crontab -l"), &["crontab"]).accept_empty(),
            ),
        )
        .source(
            DataSource::new("Root Crontab").candidate(
                Candidate::script(crontab_listing("crontab -l -u root"), &["crontab"])
                    .elevate(Mandatory)
                    .accept_empty(),
            ),
        )
        .source(DataSource::new("At Jobs").candidate(Candidate::shell("atq").accept_empty()))
}

fn containers() -> Section {
    Section::new("Containers")
        .source(
            DataSource::new("Docker").candidate(
                Candidate::shell(
                    "docker ps -a --format 'table {{.Names}}\\t{{.Image}}\\t{{.Status}}'",
                )
                .elevate(Optional)
                .accept_empty(),
            ),
        )
        .source(
            DataSource::new("Podman").candidate(
                Candidate::shell(
                    "podman ps -a --format 'table {{.Names}}\\t{{.Image}}\\t{{.Status}}'",
                )
                .accept_empty(),
            ),
        )
}

fn time_sync() -> Section {
    Section::new("Time Sync")
        .source(
            DataSource::new("Clock")
                .candidate(Candidate::shell("timedatectl status --no-pager"))
                .candidate(Candidate::shell("date -R")),
        )
        .source(
            DataSource::new("Sync Source")
                .candidate(Candidate::shell("chronyc -n tracking"))
                .candidate(Candidate::shell("ntpq -pn"))
                .candidate(Candidate::shell("timedatectl timesync-status --no-pager")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::elevation::Unprivileged;
    use crate::domain::error::ProbeError;
    use crate::domain::executor::{
        ExecutionResult, Executor, ProbeCommand, ShellExecutor, DEFAULT_MAX_OUTPUT_BYTES,
    };
    use crate::domain::source::{Elevation, Method};
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn section_order_is_fixed() {
        let titles: Vec<String> = default_plan().into_iter().map(|s| s.title).collect();
        assert_eq!(
            titles,
            vec![
                "Identity",
                "Operating System",
                "CPU",
                "Memory",
                "Storage",
                "Network",
                "Users",
                "Services",
                "Packages",
                "Firewall",
                "Security",
                "Processes",
                "Scheduled Tasks",
                "Containers",
                "Time Sync",
            ]
        );
    }

    #[test]
    fn every_candidate_declares_a_requirement() {
        for section in default_plan() {
            for source in &section.sources {
                assert!(!source.candidates.is_empty(), "{} has no candidates", source.label);
                for candidate in &source.candidates {
                    assert!(
                        !candidate.requires.is_empty(),
                        "{} / {} has no requirement",
                        source.label,
                        candidate.method
                    );
                }
            }
        }
    }

    #[test]
    fn labels_are_unique_within_a_section() {
        for section in default_plan() {
            let mut seen = HashSet::new();
            for source in &section.sources {
                assert!(seen.insert(source.label.clone()), "duplicate {}", source.label);
            }
        }
    }

    #[test]
    fn listening_ports_prefers_ss_with_owners() {
        let plan = default_plan();
        let network = plan.iter().find(|s| s.title == "Network").unwrap();
        let ports = network
            .sources
            .iter()
            .find(|s| s.label == "Listening Ports")
            .unwrap();
        let methods: Vec<String> = ports.candidates.iter().map(|c| c.method.to_string()).collect();
        assert_eq!(
            methods,
            vec!["ss -tulpen", "ss -tuln", "netstat -tulpn", "netstat -tuln"]
        );
        assert_eq!(ports.candidates[0].elevation, Elevation::Optional);
    }

    #[test]
    fn firewall_never_runs_unprivileged() {
        let plan = default_plan();
        let firewall = plan.iter().find(|s| s.title == "Firewall").unwrap();
        for candidate in &firewall.sources[0].candidates {
            assert!(matches!(candidate.method, Method::Shell(_)));
            assert_eq!(candidate.elevation, Elevation::Mandatory);
        }
    }

    #[test]
    fn upgrade_checks_tolerate_nothing_to_do() {
        let plan = default_plan();
        let packages = plan.iter().find(|s| s.title == "Packages").unwrap();
        let upgradable = packages
            .sources
            .iter()
            .find(|s| s.label == "Upgradable")
            .unwrap();
        assert!(upgradable.candidates.iter().all(|c| c.accept_empty));
        assert_eq!(upgradable.candidates[1].timeout, Some(METADATA_TIMEOUT));
    }

    #[test]
    fn filter_by_title() {
        let only = vec!["network".to_string(), "CPU".to_string()];
        let filtered = filter(default_plan(), &only, &[]).unwrap();
        let titles: Vec<&str> = filtered.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["CPU", "Network"]);

        let skip = vec!["containers".to_string()];
        let filtered = filter(default_plan(), &[], &skip).unwrap();
        assert_eq!(filtered.len(), default_plan().len() - 1);
        assert!(filtered.iter().all(|s| s.title != "Containers"));
    }

    #[test]
    fn unknown_section_names_are_rejected() {
        let err = filter(default_plan(), &["netwrk".to_string()], &[]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown section 'netwrk'"));
        assert!(message.contains("Network"));
        assert!(message.contains("Time Sync"));

        assert!(filter(default_plan(), &[], &["Dockers".to_string()]).is_err());
    }

    fn shell() -> ShellExecutor {
        ShellExecutor::new(Arc::new(Unprivileged), DEFAULT_MAX_OUTPUT_BYTES)
    }

    async fn run(script: String) -> ExecutionResult {
        shell()
            .run(&ProbeCommand::new(script, Duration::from_secs(5)))
            .await
    }

    #[tokio::test]
    async fn failing_first_stage_fails_the_pipeline() {
        let failed = run(checked_pipe("false", "tail -n +2")).await;
        assert_eq!(failed.failure, Some(ProbeError::NonZeroExit(1)));

        let nothing = run(checked_pipe("printf 'Listing...\\n'", "tail -n +2")).await;
        assert!(nothing.succeeded());
        assert!(nothing.output.trim().is_empty());

        let counted = run(checked_pipe("printf 'a\\nb\\nc\\n'", "wc -l")).await;
        assert_eq!(counted.output.trim(), "3");
    }

    #[tokio::test]
    async fn missing_crontab_is_empty_but_errors_are_not() {
        let none = run(crontab_listing(
            "sh -c 'echo \"no crontab for alice\" >&2; exit 1'",
        ))
        .await;
        assert!(none.succeeded());
        assert!(none.output.trim().is_empty());

        let denied = run(crontab_listing(
            "sh -c 'echo \"crontab: permission denied\" >&2; exit 1'",
        ))
        .await;
        assert_eq!(denied.failure, Some(ProbeError::NonZeroExit(1)));

        let listed = run(crontab_listing("printf '0 3 * * * /usr/local/bin/backup\\n'")).await;
        assert_eq!(listed.output.trim(), "0 3 * * * /usr/local/bin/backup");
    }

    #[test]
    fn package_and_cron_sources_use_the_guarded_scripts() {
        let plan = default_plan();
        let source = |title: &str, label: &str| {
            plan.iter()
                .find(|s| s.title == title)
                .and_then(|s| s.sources.iter().find(|d| d.label == label))
                .cloned()
                .unwrap()
        };

        let upgradable = source("Packages", "Upgradable");
        assert_eq!(
            upgradable.candidates[0].method.to_string(),
            checked_pipe("apt list --upgradable 2>/dev/null", "tail -n +2")
        );
        assert_eq!(upgradable.candidates[0].requires, vec!["apt", "tail"]);

        let installed = source("Packages", "Installed");
        assert_eq!(installed.candidates[1].requires, vec!["rpm", "wc"]);

        let crontab = source("Scheduled Tasks", "Current User Crontab");
        assert!(crontab.candidates[0].accept_empty);
        assert_eq!(crontab.candidates[0].requires, vec!["crontab"]);
    }
}
