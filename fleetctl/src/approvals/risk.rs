//! Pure command risk classification.
//!
//! Commands are matched by prefix against ordered tables, most dangerous tier
//! first; the first match wins. Unmatched commands fall back on the declared
//! capability level of the probe they target.

use crate::types::{CapabilityLevel, RiskLevel};

/// Destructive commands and system-mutation prefixes.
const CRITICAL_PREFIXES: &[&str] = &[
    "rm",
    "dd",
    "mkfs",
    "fdisk",
    "parted",
    "wipefs",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "iptables",
    "nft flush",
    "userdel",
    "groupdel",
];

/// Service, package, and file mutations: reversible but state-changing.
const HIGH_PREFIXES: &[&str] = &[
    "systemctl start",
    "systemctl stop",
    "systemctl restart",
    "apt install",
    "apt remove",
    "apt upgrade",
    "yum install",
    "yum remove",
    "dnf install",
    "dnf remove",
    "pip install",
    "npm install",
    "npm uninstall",
    "chmod",
    "chown",
    "mv ",
    "cp ",
    "tee ",
    "sed -i",
    "truncate",
];

/// Diagnostics: read system state, possibly expensive.
const MEDIUM_PREFIXES: &[&str] = &[
    "journalctl",
    "dmesg",
    "ss ",
    "netstat",
    "lsof",
    "du ",
    "find ",
    "grep ",
    "ps ",
    "top",
    "systemctl status",
];

/// Plain observational reads.
const LOW_PREFIXES: &[&str] = &[
    "ls",
    "cat",
    "head",
    "tail",
    "pwd",
    "whoami",
    "id",
    "uname",
    "hostname",
    "uptime",
    "df",
    "free",
    "echo",
];

/// Prefix match with a word boundary, so "ls" does not claim "lsof".
/// Prefixes ending in a space require an argument to follow.
fn matches_prefix(line: &str, prefix: &str) -> bool {
    if !line.starts_with(prefix) {
        return false;
    }
    line.len() == prefix.len()
        || prefix.ends_with(' ')
        || line[prefix.len()..].starts_with(' ')
}

/// Classify a command + args into a risk level.
///
/// The command line is lowercased and space-joined before matching. An empty
/// command classifies as `Medium`; unknown input is not presumed harmless.
pub fn classify_risk(command: &str, args: &[String], level: CapabilityLevel) -> RiskLevel {
    let mut line = command.trim().to_lowercase();
    for arg in args {
        let arg = arg.trim();
        if !arg.is_empty() {
            line.push(' ');
            line.push_str(&arg.to_lowercase());
        }
    }

    if line.is_empty() {
        return RiskLevel::Medium;
    }

    for prefix in CRITICAL_PREFIXES {
        if matches_prefix(&line, prefix) {
            return RiskLevel::Critical;
        }
    }
    for prefix in HIGH_PREFIXES {
        if matches_prefix(&line, prefix) {
            return RiskLevel::High;
        }
    }
    for prefix in MEDIUM_PREFIXES {
        if matches_prefix(&line, prefix) {
            return RiskLevel::Medium;
        }
    }
    for prefix in LOW_PREFIXES {
        if matches_prefix(&line, prefix) {
            return RiskLevel::Low;
        }
    }

    // Nothing matched: trust the declared capability level, conservatively.
    match level {
        CapabilityLevel::Observe => RiskLevel::Low,
        CapabilityLevel::Diagnose => RiskLevel::Medium,
        CapabilityLevel::Remediate => RiskLevel::High,
    }
}

/// Whether a command at this risk level requires a human decision before it
/// may run, regardless of the probe's capability level.
pub fn needs_approval(risk: RiskLevel) -> bool {
    risk >= RiskLevel::High
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str, level: CapabilityLevel) -> RiskLevel {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let args: Vec<String> = parts.map(str::to_string).collect();
        classify_risk(command, &args, level)
    }

    #[test]
    fn test_classification_table() {
        let cases = [
            ("ls", CapabilityLevel::Observe, RiskLevel::Low),
            ("df", CapabilityLevel::Diagnose, RiskLevel::Low),
            ("systemctl restart nginx", CapabilityLevel::Remediate, RiskLevel::High),
            ("rm", CapabilityLevel::Remediate, RiskLevel::Critical),
            ("rm -rf /var/cache", CapabilityLevel::Remediate, RiskLevel::Critical),
            ("reboot", CapabilityLevel::Remediate, RiskLevel::Critical),
            ("dd", CapabilityLevel::Remediate, RiskLevel::Critical),
            ("dd if=/dev/zero of=/dev/sda", CapabilityLevel::Remediate, RiskLevel::Critical),
            ("journalctl -u nginx", CapabilityLevel::Observe, RiskLevel::Medium),
            ("systemctl status nginx", CapabilityLevel::Observe, RiskLevel::Medium),
            ("apt install curl", CapabilityLevel::Remediate, RiskLevel::High),
            ("sed -i s/a/b/ /etc/hosts", CapabilityLevel::Remediate, RiskLevel::High),
            ("cat /etc/os-release", CapabilityLevel::Observe, RiskLevel::Low),
        ];
        for (line, level, expected) in cases {
            assert_eq!(classify(line, level), expected, "command {line:?}");
        }
    }

    #[test]
    fn test_first_match_wins_over_later_tiers() {
        // "rm" is critical even though the probe only observes.
        assert_eq!(classify("rm -f /tmp/x", CapabilityLevel::Observe), RiskLevel::Critical);
    }

    #[test]
    fn test_word_boundary_matching() {
        // "lsof" is a diagnostic, not a low-risk "ls" invocation.
        assert_eq!(classify("lsof -i :443", CapabilityLevel::Observe), RiskLevel::Medium);
        // Bare "mv" without arguments does not match the "mv " prefix.
        assert_eq!(classify("mv", CapabilityLevel::Observe), RiskLevel::Low);
        assert_eq!(classify("mv a b", CapabilityLevel::Observe), RiskLevel::High);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("REBOOT", CapabilityLevel::Observe), RiskLevel::Critical);
        assert_eq!(classify("Systemctl Restart nginx", CapabilityLevel::Observe), RiskLevel::High);
    }

    #[test]
    fn test_capability_fallback() {
        assert_eq!(classify("customtool --check", CapabilityLevel::Observe), RiskLevel::Low);
        assert_eq!(classify("customtool --check", CapabilityLevel::Diagnose), RiskLevel::Medium);
        assert_eq!(classify("customtool --fix", CapabilityLevel::Remediate), RiskLevel::High);
        // Commands outside the tables fall back even when they resemble
        // listed ones; only the literal prefixes match.
        assert_eq!(classify("apt-get install curl", CapabilityLevel::Observe), RiskLevel::Low);
        assert_eq!(classify("vmstat 1", CapabilityLevel::Diagnose), RiskLevel::Medium);
        assert_eq!(classify("date", CapabilityLevel::Observe), RiskLevel::Low);
    }

    #[test]
    fn test_empty_command_is_medium() {
        assert_eq!(classify_risk("", &[], CapabilityLevel::Observe), RiskLevel::Medium);
        assert_eq!(classify_risk("   ", &[], CapabilityLevel::Remediate), RiskLevel::Medium);
    }

    #[test]
    fn test_needs_approval_threshold() {
        assert!(!needs_approval(RiskLevel::Low));
        assert!(!needs_approval(RiskLevel::Medium));
        assert!(needs_approval(RiskLevel::High));
        assert!(needs_approval(RiskLevel::Critical));
    }
}
