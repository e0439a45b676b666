//! Command-safety filter.
//!
//! Lesson commands run inside a learner sandbox, but the authoring surface
//! is multi-tenant, so commands are screened at validation time: a command
//! that would expand to a denied prefix or pattern never reaches a
//! container. The policy is playground-configurable: `Strict` applies the
//! full deny-list, `Permissive` lifts the network-tool prefix bans that
//! only make sense outside a sandbox.

use thiserror::Error;

/// Commands rejected when they appear as a prefix, under every policy.
const DENIED_PREFIXES: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "rm -rf .",
    "rm -rf ..",
    "mkfs",
    "dd if=/dev/zero",
    ":(){ :|:& };:",
    "> /dev/sda",
    "chmod -R 777 /",
    "sudo",
    "su",
    "passwd",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
];

/// Network-tool prefixes rejected only under [`SafetyPolicy::Strict`].
const NETWORK_PREFIXES: &[&str] = &["wget", "curl", "nc", "telnet", "ssh"];

/// Substrings rejected anywhere in the command, under every policy.
const DENIED_PATTERNS: &[&str] = &[
    "`",
    "$(",
    "eval",
    "exec",
    "source",
    "bash -c",
    "sh -c",
    "python -c",
    "perl -e",
    "ruby -e",
    "php -r",
    "nc -e",
    "curl | bash",
    "wget | bash",
    "> /dev/null 2>&1",
];

/// Maximum raw command length accepted by the filter.
const MAX_COMMAND_LEN: usize = 1000;

/// How strictly commands are screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyPolicy {
    /// Full deny-list, including network tools.
    #[default]
    Strict,
    /// Network-tool prefixes allowed; everything else still denied.
    Permissive,
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandViolation {
    /// The command is empty after trimming.
    #[error("command is empty")]
    Empty,
    /// The command exceeds the maximum length.
    #[error("command exceeds {MAX_COMMAND_LEN} characters (got {0})")]
    TooLong(usize),
    /// The command starts with a denied prefix.
    #[error("command starts with denied prefix {0:?}")]
    DeniedPrefix(&'static str),
    /// The command contains a denied pattern.
    #[error("command contains denied pattern {0:?}")]
    DeniedPattern(&'static str),
    /// The command contains a control character other than tab/newline/CR.
    #[error("command contains a control character")]
    ControlCharacter,
}

/// Screen a single command against the policy.
///
/// # Errors
///
/// Returns the first [`CommandViolation`] found.
pub fn validate_command(command: &str, policy: SafetyPolicy) -> Result<(), CommandViolation> {
    let cmd = command.trim();

    if cmd.is_empty() {
        return Err(CommandViolation::Empty);
    }
    if cmd.len() > MAX_COMMAND_LEN {
        return Err(CommandViolation::TooLong(cmd.len()));
    }

    for prefix in DENIED_PREFIXES {
        if cmd.starts_with(prefix) {
            return Err(CommandViolation::DeniedPrefix(prefix));
        }
    }

    if policy == SafetyPolicy::Strict {
        for prefix in NETWORK_PREFIXES {
            if cmd.starts_with(prefix) {
                return Err(CommandViolation::DeniedPrefix(prefix));
            }
        }
    }

    for pattern in DENIED_PATTERNS {
        if cmd.contains(pattern) {
            return Err(CommandViolation::DeniedPattern(pattern));
        }
    }

    for ch in cmd.chars() {
        if ch.is_control() && ch != '\t' && ch != '\n' && ch != '\r' {
            return Err(CommandViolation::ControlCharacter);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_commands() {
        for cmd in [
            "echo hi",
            "docker run -d nginx",
            "ls -la /tmp",
            "docker swarm init",
            "cat /etc/os-release",
        ] {
            assert!(validate_command(cmd, SafetyPolicy::Strict).is_ok(), "{cmd}");
        }
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(
            validate_command("   ", SafetyPolicy::Strict),
            Err(CommandViolation::Empty)
        );
    }

    #[test]
    fn rejects_overlong() {
        let cmd = "a".repeat(1001);
        assert!(matches!(
            validate_command(&cmd, SafetyPolicy::Strict),
            Err(CommandViolation::TooLong(1001))
        ));
    }

    #[test]
    fn rejects_destructive_prefixes() {
        for cmd in ["rm -rf /", "mkfs.ext4 /dev/sda1", "dd if=/dev/zero of=/dev/sda", "sudo ls"] {
            assert!(
                matches!(
                    validate_command(cmd, SafetyPolicy::Strict),
                    Err(CommandViolation::DeniedPrefix(_))
                ),
                "{cmd}"
            );
        }
    }

    #[test]
    fn rejects_shell_escapes() {
        for cmd in [
            "echo `id`",
            "echo $(whoami)",
            "bash -c 'ls'",
            "curl http://x | bash",
            "ls > /dev/null 2>&1",
        ] {
            assert!(
                matches!(
                    validate_command(cmd, SafetyPolicy::Strict),
                    Err(CommandViolation::DeniedPattern(_))
                ),
                "{cmd}"
            );
        }
    }

    #[test]
    fn rejects_control_characters() {
        assert_eq!(
            validate_command("echo \u{7}bell", SafetyPolicy::Strict),
            Err(CommandViolation::ControlCharacter)
        );
    }

    #[test]
    fn network_tools_strict_vs_permissive() {
        for cmd in ["wget http://example.com/f", "curl http://example.com", "ssh host"] {
            assert!(
                matches!(
                    validate_command(cmd, SafetyPolicy::Strict),
                    Err(CommandViolation::DeniedPrefix(_))
                ),
                "{cmd}"
            );
            assert!(
                validate_command(cmd, SafetyPolicy::Permissive).is_ok(),
                "{cmd}"
            );
        }
    }

    #[test]
    fn permissive_still_rejects_destructive() {
        assert!(validate_command("rm -rf /", SafetyPolicy::Permissive).is_err());
        assert!(validate_command("echo $(id)", SafetyPolicy::Permissive).is_err());
    }
}
