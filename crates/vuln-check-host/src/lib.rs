//! Host adapters for vuln-check.
//!
//! OS interaction lives behind small traits so the engine and its tests can
//! run without depending on the host: command execution, package
//! enumeration (rpm/dpkg or a fixture table), and the filesystem walker.

pub mod fileops;

use std::process::Command;

use vuln_check_types::{PackageEntry, PackageKind, VulnCheckError};

pub use fileops::{locate_files, match_file_content, DEFAULT_MAX_DEPTH};

pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> Result<CmdOutput, VulnCheckError>;
}

#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub exit: Option<i32>,
    pub stdout: String,
}

pub struct OsCommandRunner;

impl CommandRunner for OsCommandRunner {
    fn run(&self, argv: &[String]) -> Result<CmdOutput, VulnCheckError> {
        if argv.is_empty() {
            return Err(VulnCheckError::Io("empty argv".into()));
        }
        let out = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|e| VulnCheckError::Io(e.to_string()))?;
        Ok(CmdOutput {
            exit: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        })
    }
}

/// Enumerates the packages installed on the host. Called once per run; the
/// engine memoizes the result.
pub trait PackageEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<Vec<PackageEntry>, VulnCheckError>;
}

/// Package enumeration from the real host: rpm and dpkg output combined.
///
/// A backend whose binary is missing contributes nothing; if neither binary
/// exists on PATH, enumeration is an error so an empty host is never
/// mistaken for a clean one.
pub struct OsPackageEnumerator<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> OsPackageEnumerator<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> PackageEnumerator for OsPackageEnumerator<R> {
    fn enumerate(&self) -> Result<Vec<PackageEntry>, VulnCheckError> {
        let have_rpm = which::which("rpm").is_ok();
        let have_dpkg = which::which("dpkg").is_ok();
        if !have_rpm && !have_dpkg {
            return Err(VulnCheckError::Preparation(
                "no package backend available (neither rpm nor dpkg found)".into(),
            ));
        }

        let mut out = Vec::new();
        if have_rpm {
            let argv: Vec<String> = ["rpm", "-qa", "--queryformat", "%{NAME} %{EVR}\n"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            if let Ok(res) = self.runner.run(&argv) {
                out.extend(parse_rpm_output(&res.stdout));
            }
        }
        if have_dpkg {
            let argv: Vec<String> = ["dpkg", "-l"].iter().map(|s| s.to_string()).collect();
            if let Ok(res) = self.runner.run(&argv) {
                out.extend(parse_dpkg_output(&res.stdout));
            }
        }
        Ok(out)
    }
}

/// Parse `rpm -qa --queryformat "%{NAME} %{EVR}\n"` output: one package per
/// line, name and version whitespace-separated. Short lines are skipped.
pub fn parse_rpm_output(text: &str) -> Vec<PackageEntry> {
    let mut ret = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(version)) = (fields.next(), fields.next()) else {
            continue;
        };
        ret.push(PackageEntry {
            name: name.to_string(),
            version: version.to_string(),
            kind: PackageKind::Rpm,
        });
    }
    ret
}

/// Parse `dpkg -l` output. Only rows whose first column is exactly `ii`
/// (fully installed) are kept; columns 2 and 3 are name and version.
pub fn parse_dpkg_output(text: &str) -> Vec<PackageEntry> {
    let mut ret = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[0] != "ii" {
            continue;
        }
        ret.push(PackageEntry {
            name: fields[1].to_string(),
            version: fields[2].to_string(),
            kind: PackageKind::Dpkg,
        });
    }
    ret
}

/// The fixed package table used when test hooks are enabled.
pub struct FixturePackages;

impl PackageEnumerator for FixturePackages {
    fn enumerate(&self) -> Result<Vec<PackageEntry>, VulnCheckError> {
        let table = [
            ("openssl", "1.0.1e"),
            ("bash", "4.3-11"),
            ("upstart", "1.13.2"),
            ("grub-common", "2.02-beta2"),
            ("libbind", "1:9.9.5.dfsg-4.3"),
            ("kernel", "2.6.32-573.7.1.el6.x86_64"),
            ("kernel", "2.6.32-573.8.1.el6.x86_64"),
        ];
        Ok(table
            .iter()
            .map(|(name, version)| PackageEntry {
                name: name.to_string(),
                version: version.to_string(),
                kind: PackageKind::Fixture,
            })
            .collect())
    }
}

/// Sink for engine debug traces. Implementations must tolerate concurrent
/// writers.
pub trait DebugLogWriter: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Debug traces to standard error, prefixed with the tool name.
pub struct StderrLogWriter;

impl DebugLogWriter for StderrLogWriter {
    fn write_line(&self, line: &str) {
        eprintln!("[vuln-check] {}", line);
    }
}

/// Fake/test adapters for use in other crates' tests.
pub mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// A package enumerator over a fixed list, counting how often it runs.
    pub struct StaticPackages {
        entries: Vec<PackageEntry>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticPackages {
        pub fn new(entries: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
            Self {
                entries: entries
                    .into_iter()
                    .map(|(name, version)| PackageEntry {
                        name: name.to_string(),
                        version: version.to_string(),
                        kind: PackageKind::Fixture,
                    })
                    .collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Shared call counter, usable after the enumerator moves into an
        /// engine.
        pub fn counter(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    impl PackageEnumerator for StaticPackages {
        fn enumerate(&self) -> Result<Vec<PackageEntry>, VulnCheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }
    }

    /// An enumerator that always fails, standing in for a host with no
    /// package backend.
    pub struct FailingPackages;

    impl PackageEnumerator for FailingPackages {
        fn enumerate(&self) -> Result<Vec<PackageEntry>, VulnCheckError> {
            Err(VulnCheckError::Preparation(
                "no package backend available (neither rpm nor dpkg found)".into(),
            ))
        }
    }

    /// A debug writer that collects lines for assertions.
    #[derive(Default)]
    pub struct CapturingLogWriter {
        lines: Mutex<Vec<String>>,
    }

    impl CapturingLogWriter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl DebugLogWriter for CapturingLogWriter {
        fn write_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }
}
