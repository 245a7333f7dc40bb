use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

const PLATFORM_DIRS: &[&str] = &["windows", "linux", "macos", "osx"];

fn is_native_library(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".dll")
        || lower.ends_with(".so")
        || lower.ends_with(".dylib")
        || lower.ends_with(".jnilib")
}

fn current_platform_tags() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["natives-windows"]
    } else if cfg!(target_os = "macos") {
        &["natives-osx", "natives-macos"]
    } else {
        &["natives-linux"]
    }
}

/// Make sure `natives/` holds the platform's native libraries at its root.
///
/// Libraries shipped in per-platform subfolders are copied up first. If the
/// root still has none, they are extracted from every `*natives*` jar under
/// `libraries/` that targets this platform (or no platform in particular).
pub async fn prepare_natives(game_dir: &Path) -> LauncherResult<PathBuf> {
    let natives_dir = game_dir.join("natives");
    let libraries_dir = game_dir.join("libraries");
    let target = natives_dir.clone();

    tokio::task::spawn_blocking(move || prepare_blocking(&target, &libraries_dir))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))??;

    Ok(natives_dir)
}

fn prepare_blocking(natives_dir: &Path, libraries_dir: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(natives_dir).map_err(|e| LauncherError::Io {
        path: natives_dir.to_path_buf(),
        source: e,
    })?;

    let copied = consolidate_platform_dirs(natives_dir);
    if copied > 0 {
        info!("Copied {} native libraries to {:?}", copied, natives_dir);
    }

    if natives_present(natives_dir) {
        debug!("Native libraries already present in {:?}", natives_dir);
        return Ok(());
    }

    let jars = find_natives_jars(libraries_dir);
    if jars.is_empty() {
        warn!("No natives jars found under {:?}", libraries_dir);
        return Ok(());
    }

    for jar in jars {
        let name = jar
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let platform_specific = name.contains("natives-");
        let ours = current_platform_tags().iter().any(|tag| name.contains(tag));
        if platform_specific && !ours {
            debug!("Skipping natives jar for another platform: {}", name);
            continue;
        }
        if let Err(err) = extract_from_jar(&jar, natives_dir) {
            warn!("Cannot extract natives from {:?}: {}", jar, err);
        }
    }

    if !natives_present(natives_dir) {
        warn!("No native libraries available in {:?}", natives_dir);
    }
    Ok(())
}

fn consolidate_platform_dirs(natives_dir: &Path) -> usize {
    let mut copied = 0;
    for platform in PLATFORM_DIRS {
        let mut stack = vec![natives_dir.join(platform)];
        while let Some(dir) = stack.pop() {
            let Ok(read_dir) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let file_name = entry.file_name();
                if !is_native_library(&file_name.to_string_lossy()) {
                    continue;
                }
                let dest = natives_dir.join(&file_name);
                if dest.exists() {
                    continue;
                }
                match std::fs::copy(&path, &dest) {
                    Ok(_) => copied += 1,
                    Err(err) => warn!("Failed to copy {:?} to {:?}: {}", path, dest, err),
                }
            }
        }
    }
    copied
}

fn natives_present(natives_dir: &Path) -> bool {
    std::fs::read_dir(natives_dir)
        .map(|entries| {
            entries.flatten().any(|entry| {
                entry.path().is_file() && is_native_library(&entry.file_name().to_string_lossy())
            })
        })
        .unwrap_or(false)
}

fn find_natives_jars(libraries_dir: &Path) -> Vec<PathBuf> {
    super::classpath::collect_library_jars(libraries_dir)
        .into_iter()
        .filter(|jar| {
            jar.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().contains("natives"))
                .unwrap_or(false)
        })
        .collect()
}

/// Extract top-level-named native files (directory part discarded).
fn extract_from_jar(jar: &Path, natives_dir: &Path) -> LauncherResult<usize> {
    let file = std::fs::File::open(jar).map_err(|e| LauncherError::Io {
        path: jar.to_path_buf(),
        source: e,
    })?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.starts_with("META-INF") || !is_native_library(&name) {
            continue;
        }
        let Some(file_name) = Path::new(&name).file_name() else {
            continue;
        };

        let dest = natives_dir.join(file_name);
        let mut out = std::fs::File::create(&dest).map_err(|e| LauncherError::Io {
            path: dest.clone(),
            source: e,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::Io {
            path: dest.clone(),
            source: e,
        })?;
        debug!("Extracted native: {}", name);
        extracted += 1;
    }

    Ok(extracted)
}
