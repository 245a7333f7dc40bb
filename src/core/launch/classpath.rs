use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Profile classpath entry that stands for every jar under `libraries/`.
pub const LIBRARIES_ENTRY: &str = "libraries";

/// Platform-specific Java classpath separator.
pub fn get_classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Resolve the profile's classpath entries against the client directory.
///
/// Missing files and anything that is not a jar or zip are skipped with a
/// warning; an empty result is an error, since `java -cp ""` only fails later
/// with a much less helpful message.
pub fn resolve_classpath(entries: &[String], game_dir: &Path) -> LauncherResult<Vec<PathBuf>> {
    let mut resolved = Vec::new();

    for raw in entries {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        if raw.eq_ignore_ascii_case(LIBRARIES_ENTRY) {
            let jars = collect_library_jars(&game_dir.join(LIBRARIES_ENTRY));
            debug!("Expanded {} to {} jars", LIBRARIES_ENTRY, jars.len());
            resolved.extend(jars);
            continue;
        }

        let candidate = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            game_dir.join(raw)
        };

        if candidate.is_file() && is_allowed_classpath_path(&candidate) {
            resolved.push(candidate);
        } else {
            warn!("Skipping classpath entry {:?}", candidate);
        }
    }

    dedup_preserving_order(&mut resolved);

    if resolved.is_empty() {
        return Err(LauncherError::InvalidClasspath(format!(
            "no usable jar among {} entries in {:?}",
            entries.len(),
            game_dir
        )));
    }

    Ok(resolved)
}

pub fn join_classpath(entries: &[PathBuf]) -> String {
    entries
        .iter()
        .map(|p| safe_path_str(p))
        .collect::<Vec<_>>()
        .join(get_classpath_separator())
}

fn is_allowed_classpath_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

/// Every jar below `dir`, sorted so the classpath is stable between launches.
pub fn collect_library_jars(dir: &Path) -> Vec<PathBuf> {
    let mut jars = Vec::new();
    if !dir.exists() {
        return jars;
    }

    let mut stack = vec![dir.to_path_buf()];
    while let Some(current_dir) = stack.pop() {
        let read_dir = match std::fs::read_dir(&current_dir) {
            Ok(read_dir) => read_dir,
            Err(_) => continue,
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_allowed_classpath_path(&path) {
                jars.push(path);
            }
        }
    }

    jars.sort();
    jars
}

fn dedup_preserving_order(entries: &mut Vec<PathBuf>) {
    let mut seen = std::collections::HashSet::new();
    entries.retain(|entry| {
        let key = if cfg!(target_os = "windows") {
            entry.to_string_lossy().to_lowercase()
        } else {
            entry.to_string_lossy().to_string()
        };
        seen.insert(key)
    });
}

/// Convert path to string, stripping the `\\?\` prefix on Windows.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java reports ClassNotFoundException for extended-length classpath
        // entries even when the jars exist.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
