// X.Org version detection
//
// `X -version` prints its banner to stderr. The probe runs once per process
// and memoises the result; a server that cannot be probed reports 0.0 and
// loses every version gate.

use log::debug;
use std::process::Command;
use std::sync::OnceLock;

const VERSION_PREFIX: &str = "X.Org X Server ";

/// Memoised probe of the installed X server version.
#[derive(Debug)]
pub struct VersionProbe {
    command: String,
    parsed: OnceLock<(u32, u32)>,
}

impl Default for VersionProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionProbe {
    pub fn new() -> Self {
        Self::with_command("X")
    }

    /// Probe a different binary (test stubs, alternate servers).
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parsed: OnceLock::new(),
        }
    }

    /// A probe that reports a fixed version without spawning anything.
    pub fn fixed(major: u32, minor: u32) -> Self {
        let parsed = OnceLock::new();
        let _ = parsed.set((major, minor));
        Self {
            command: String::new(),
            parsed,
        }
    }

    /// `(major, minor)` of the installed server; `(0, 0)` when unknown.
    pub fn version(&self) -> (u32, u32) {
        *self.parsed.get_or_init(|| {
            let version = probe(&self.command);
            debug!(
                "X server version {}.{} (from {} -version)",
                version.0, version.1, self.command
            );
            version
        })
    }

    /// Compare the installed version against `(major, minor)`:
    /// negative when older, zero when equal, positive when newer.
    pub fn compare(&self, major: u32, minor: u32) -> i64 {
        let (our_major, our_minor) = self.version();
        if our_major == major {
            i64::from(our_minor) - i64::from(minor)
        } else {
            i64::from(our_major) - i64::from(major)
        }
    }
}

fn probe(command: &str) -> (u32, u32) {
    let output = match Command::new(command).arg("-version").output() {
        Ok(output) => output,
        Err(_) => return (0, 0),
    };
    if !output.status.success() {
        return (0, 0);
    }
    parse(&String::from_utf8_lossy(&output.stderr))
}

fn parse(text: &str) -> (u32, u32) {
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(VERSION_PREFIX) {
            let mut tokens = rest.splitn(3, '.');
            let major = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            let minor = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            return (major, minor);
        }
    }

    // No banner line at all; treat the version as unknown.
    (0, 0)
}

#[cfg(test)]
mod tests {
    use super::{parse, VersionProbe};

    #[test]
    fn parses_canonical_banner() {
        let stderr = "\nX.Org X Server 1.20.4\nX Protocol Version 11, Revision 0\n";
        assert_eq!(parse(stderr), (1, 20));
    }

    #[test]
    fn parses_major_only() {
        assert_eq!(parse("X.Org X Server 21\n"), (21, 0));
    }

    #[test]
    fn missing_banner_is_unknown() {
        assert_eq!(parse("Xvfb does not print a banner\n"), (0, 0));
        assert_eq!(parse(""), (0, 0));
    }

    #[test]
    fn malformed_tokens_fall_back_to_zero() {
        assert_eq!(parse("X.Org X Server beta.7\n"), (0, 7));
    }

    #[test]
    fn compare_orders_lexicographically() {
        let probe = VersionProbe::fixed(1, 17);
        assert!(probe.compare(1, 17) == 0);
        assert!(probe.compare(1, 16) > 0);
        assert!(probe.compare(1, 18) < 0);
        assert!(probe.compare(0, 99) > 0);
        assert!(probe.compare(2, 0) < 0);
    }
}
