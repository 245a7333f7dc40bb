use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// How the launcher picks the Java executable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JavaRuntimePreference {
    /// Well-known install locations, `JAVA_HOME` and `PATH`.
    #[default]
    Auto,
    /// Only `JAVA_HOME` and `PATH`.
    System,
    /// The path stored in the settings, nothing else.
    Custom,
}

pub fn java_exe() -> &'static str {
    if cfg!(target_os = "windows") {
        "java.exe"
    } else {
        "java"
    }
}

/// `<home>/bin/java`, or `<home>/java` for bare bin directories.
pub fn locate_java_binary(home: &Path) -> Option<PathBuf> {
    [home.join("bin").join(java_exe()), home.join(java_exe())]
        .into_iter()
        .find(|candidate| candidate.is_file())
}

fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    match std::env::consts::OS {
        "linux" => roots.extend(
            [
                "/usr/lib/jvm",
                "/usr/lib64/jvm",
                "/usr/java",
                "/opt/java",
                "/opt/jdk",
            ]
            .map(PathBuf::from),
        ),
        "macos" => roots.extend(
            [
                "/Library/Java/JavaVirtualMachines",
                "/System/Library/Java/JavaVirtualMachines",
            ]
            .map(PathBuf::from),
        ),
        "windows" => {
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Ok(dir) = std::env::var(var) {
                    let dir = PathBuf::from(dir);
                    for vendor in ["Java", "Eclipse Adoptium", "Microsoft", "Zulu"] {
                        roots.push(dir.join(vendor));
                    }
                }
            }
        }
        _ => {}
    }
    roots
}

/// Java homes found below the platform's usual install roots.
fn installed_homes() -> Vec<PathBuf> {
    let mut homes = Vec::new();
    for root in search_roots() {
        homes.push(root.clone());
        let Ok(entries) = std::fs::read_dir(&root) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let mac_home = path.join("Contents").join("Home");
            homes.push(if mac_home.is_dir() { mac_home } else { path });
        }
    }
    homes
}

fn system_binaries() -> Vec<PathBuf> {
    let mut binaries = Vec::new();
    if let Some(java_home) = std::env::var_os("JAVA_HOME") {
        if let Some(bin) = locate_java_binary(Path::new(&java_home)) {
            binaries.push(bin);
        }
    }
    if let Some(path_var) = std::env::var_os("PATH") {
        binaries.extend(
            std::env::split_paths(&path_var)
                .map(|dir| dir.join(java_exe()))
                .filter(|candidate| candidate.is_file()),
        );
    }
    binaries
}

fn detect_blocking(preference: JavaRuntimePreference) -> Vec<JavaInstallation> {
    let mut binaries = Vec::new();
    if preference == JavaRuntimePreference::Auto {
        binaries.extend(installed_homes().iter().filter_map(|home| locate_java_binary(home)));
    }
    binaries.extend(system_binaries());

    let mut detected: Vec<JavaInstallation> =
        binaries.iter().filter_map(|bin| probe::probe_java(bin)).collect();
    detected.sort_by(|a, b| a.path.cmp(&b.path));
    detected.dedup_by(|a, b| a.path == b.path);
    detected
}

pub async fn detect_java_installations(preference: JavaRuntimePreference) -> Vec<JavaInstallation> {
    tokio::task::spawn_blocking(move || detect_blocking(preference))
        .await
        .unwrap_or_else(|e| {
            warn!("Java detection task failed: {}", e);
            Vec::new()
        })
}

pub async fn inspect_java_binary(path: &Path) -> Option<JavaInstallation> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || probe::probe_java(&path))
        .await
        .ok()
        .flatten()
}

fn runtime_track(major: u32) -> u32 {
    if major <= 8 {
        8
    } else if major >= 21 {
        21
    } else {
        17
    }
}

/// Old Forge stacks break on a newer Java track even when the major is higher.
pub fn is_java_compatible_major(installed_major: u32, required_major: u32) -> bool {
    installed_major >= required_major
        && runtime_track(installed_major) == runtime_track(required_major)
}

/// Best candidate for `required_major`: the newest compatible one, preferring
/// 64-bit builds. Without a requirement the newest 64-bit install wins.
pub fn select_runtime(
    candidates: &[JavaInstallation],
    required_major: Option<u32>,
) -> Option<&JavaInstallation> {
    candidates
        .iter()
        .filter(|java| {
            required_major.map_or(true, |required| is_java_compatible_major(java.major, required))
        })
        .max_by_key(|java| (java.is_64bit, java.major))
}

/// Pick the Java executable for a launch, or fail with
/// [`LauncherError::RuntimeMissing`].
#[instrument]
pub async fn resolve_java_binary(
    required_major: Option<u32>,
    preference: JavaRuntimePreference,
    custom_path: Option<&Path>,
) -> LauncherResult<JavaInstallation> {
    if preference == JavaRuntimePreference::Custom {
        let path = custom_path.ok_or_else(|| {
            LauncherError::RuntimeMissing("no custom Java path configured".into())
        })?;
        let java = inspect_java_binary(path).await.ok_or_else(|| {
            LauncherError::RuntimeMissing(format!("{} is not a working Java executable", path.display()))
        })?;
        if let Some(required) = required_major {
            if !is_java_compatible_major(java.major, required) {
                warn!(
                    "Custom Java {} (major {}) may not suit a profile that needs Java {}",
                    java.path.display(),
                    java.major,
                    required
                );
            }
        }
        return Ok(java);
    }

    let candidates = detect_java_installations(preference).await;
    debug!("Detected {} Java installations", candidates.len());
    match select_runtime(&candidates, required_major) {
        Some(java) => {
            info!("Using Java {} at {:?}", java.version, java.path);
            Ok(java.clone())
        }
        None => Err(LauncherError::RuntimeMissing(match required_major {
            Some(required) => format!(
                "Java {} is required but none of {} installation(s) is compatible",
                required,
                candidates.len()
            ),
            None => "no Java installation found".into(),
        })),
    }
}

/// `"1.8.0_292"` -> 8, `"17.0.2"` -> 17, `"21"` -> 21.
pub fn parse_major_version(version: &str) -> Option<u32> {
    let mut parts = version
        .trim()
        .split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next().and_then(|s| s.parse().ok()).or(Some(first))
    } else {
        Some(first)
    }
}

mod probe {
    use super::*;

    #[instrument]
    pub fn probe_java(path: &Path) -> Option<JavaInstallation> {
        let output = Command::new(path)
            .args(["-XshowSettings:properties", "-version"])
            .output()
            .ok()?;

        let version_output = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
        parse_output(path, &version_output)
    }

    pub(super) fn parse_output(path: &Path, version_output: &str) -> Option<JavaInstallation> {
        debug!(
            "Probing {:?}: {}",
            path,
            version_output.lines().next().unwrap_or("")
        );

        let version = parse_version_string(version_output)?;
        let major = parse_major_version(&version)?;
        let lower_output = version_output.to_ascii_lowercase();
        let is_64bit = lower_output.contains("sun.arch.data.model = 64")
            || lower_output.contains("os.arch = amd64")
            || lower_output.contains("os.arch = x86_64")
            || lower_output.contains("os.arch = aarch64")
            || lower_output.contains("64-bit");

        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        Some(JavaInstallation {
            path: canonical,
            version,
            major,
            is_64bit,
            vendor: parse_vendor(version_output),
        })
    }

    fn parse_version_string(output: &str) -> Option<String> {
        output.lines().find_map(|line| {
            let start = line.find('"')?;
            let end = line[start + 1..].find('"')?;
            Some(line[start + 1..start + 1 + end].to_string())
        })
    }

    fn parse_vendor(output: &str) -> String {
        for vendor in ["Temurin", "Adoptium", "Zulu", "GraalVM", "OpenJDK"] {
            if output.contains(vendor) {
                return vendor.to_string();
            }
        }
        "unknown".to_string()
    }
}
