// ─── Launch Arguments ───
// Turns a profile, the player and local settings into JVM and game argv.

use serde::Serialize;
use tracing::debug;

use crate::core::auth::PlayerIdentity;

use super::classpath::safe_path_str;
use super::profile::{LaunchProfile, RuntimeConfig};

const LEGACY_FML_TWEAKER: &str = "cpw.mods.fml.common.launcher.FMLTweaker";
const FML_TWEAKER: &str = "net.minecraftforge.fml.common.launcher.FMLTweaker";

/// Flags the launcher always writes itself. Copies in the profile's extra
/// arguments are removed so the game never sees a flag twice.
const MANAGED_GAME_FLAGS: &[&str] = &[
    "--username",
    "--uuid",
    "--accessToken",
    "--version",
    "--gameDir",
    "--assetsDir",
    "--assetIndex",
    "--userType",
    "--versionType",
    "--width",
    "--height",
    "--fullscreen",
    "--server",
    "--port",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArgs {
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
}

pub fn build_args(
    profile: &LaunchProfile,
    player: &PlayerIdentity,
    runtime: &RuntimeConfig,
) -> LaunchArgs {
    let vars = template_vars(profile, player, runtime);
    LaunchArgs {
        jvm_args: build_jvm_args(profile, runtime, &vars),
        game_args: build_game_args(profile, player, runtime, &vars),
    }
}

fn template_vars(
    profile: &LaunchProfile,
    player: &PlayerIdentity,
    runtime: &RuntimeConfig,
) -> Vec<(&'static str, String)> {
    let game_dir = safe_path_str(&runtime.game_dir);
    let assets_dir = safe_path_str(&runtime.assets_dir);
    let natives_dir = safe_path_str(&runtime.natives_dir);
    let asset_index = profile.asset_index_name().to_string();

    let mut vars = vec![
        ("username", player.username.clone()),
        ("auth_player_name", player.username.clone()),
        ("uuid", player.uuid.clone()),
        ("auth_uuid", player.uuid.clone()),
        ("accessToken", player.access_token.clone()),
        ("auth_access_token", player.access_token.clone()),
        ("user_type", player.user_type.clone()),
        ("gameDir", game_dir.clone()),
        ("game_directory", game_dir),
        ("assetsDir", assets_dir.clone()),
        ("assets_root", assets_dir),
        ("version", profile.version.clone()),
        ("version_name", profile.version.clone()),
        ("assetIndexName", asset_index.clone()),
        ("assets_index_name", asset_index),
        ("nativesDir", natives_dir.clone()),
        ("natives_directory", natives_dir),
    ];
    // Server tokens resolve only when the player asked to join right away.
    let address = profile
        .server_address
        .as_deref()
        .filter(|a| runtime.auto_enter && !a.trim().is_empty());
    if let Some(address) = address {
        vars.push(("serverAddress", address.to_string()));
        if let Some(port) = profile.server_port {
            vars.push(("serverPort", port.to_string()));
        }
    }
    vars
}

fn expand(raw: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(raw.to_string(), |acc, (key, value)| {
        acc.replace(&format!("${{{key}}}", key = key), value)
    })
}

/// Expand every token; a token left with `${` is dropped together with the
/// option it was the value of.
fn expand_all(raw_args: &[String], vars: &[(&str, String)]) -> Vec<String> {
    let mut expanded = Vec::with_capacity(raw_args.len());
    for arg in raw_args {
        let resolved = expand(arg, vars);
        if resolved.contains("${") {
            debug!("Dropping unresolved argument {:?}", arg);
            drop_dangling_option(&mut expanded);
            continue;
        }
        expanded.push(resolved);
    }
    expanded
}

fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

fn build_jvm_args(
    profile: &LaunchProfile,
    runtime: &RuntimeConfig,
    vars: &[(&str, String)],
) -> Vec<String> {
    let mut args = vec![
        format!("-Xms{}M", runtime.ram_mb),
        format!("-Xmx{}M", runtime.ram_mb),
        format!(
            "-Djava.library.path={}",
            safe_path_str(&runtime.natives_dir)
        ),
    ];

    let user_args = expand_all(&profile.jvm_args, vars);
    let mut i = 0;
    while i < user_args.len() {
        let arg = user_args[i].trim();
        // The classpath is passed separately by the process launcher.
        if arg == "-cp" || arg == "-classpath" || arg == "--class-path" {
            i += 2;
            continue;
        }
        let managed = arg.is_empty()
            || arg.starts_with("-Xms")
            || arg.starts_with("-Xmx")
            || arg.starts_with("-Djava.library.path=");
        if !managed {
            args.push(arg.to_string());
        }
        i += 1;
    }

    args
}

fn build_game_args(
    profile: &LaunchProfile,
    player: &PlayerIdentity,
    runtime: &RuntimeConfig,
    vars: &[(&str, String)],
) -> Vec<String> {
    let mut args = strip_managed_flags(&expand_all(&profile.game_args, vars));

    if profile.uses_launchwrapper() && !contains_flag(&args, "--tweakClass") {
        args.push("--tweakClass".into());
        args.push(default_tweak_class(&profile.version).into());
    }

    let pairs = [
        ("--username", player.username.clone()),
        ("--uuid", player.uuid.clone()),
        ("--accessToken", player.access_token.clone()),
        ("--version", profile.version.clone()),
        ("--gameDir", safe_path_str(&runtime.game_dir)),
        ("--assetsDir", safe_path_str(&runtime.assets_dir)),
        ("--assetIndex", profile.asset_index_name().to_string()),
        ("--userType", player.user_type.clone()),
        ("--versionType", "release".to_string()),
        ("--width", runtime.resolution.width.to_string()),
        ("--height", runtime.resolution.height.to_string()),
    ];
    for (flag, value) in pairs {
        args.push(flag.to_string());
        args.push(value);
    }

    if runtime.full_screen {
        args.push("--fullscreen".into());
    }

    if runtime.auto_enter {
        if let Some(address) = profile.server_address.as_deref().filter(|a| !a.trim().is_empty()) {
            args.push("--server".into());
            args.push(address.to_string());
            if let Some(port) = profile.server_port {
                args.push("--port".into());
                args.push(port.to_string());
            }
        }
    }

    args
}

fn managed_flag(arg: &str) -> Option<bool> {
    let (name, inline_value) = match arg.split_once('=') {
        Some((name, _)) => (name, true),
        None => (arg, false),
    };
    MANAGED_GAME_FLAGS
        .iter()
        .any(|flag| flag.eq_ignore_ascii_case(name))
        .then_some(inline_value)
}

/// Remove launcher-managed flags and the value that follows them. The next
/// token only counts as a value when it is not itself an option.
fn strip_managed_flags(args: &[String]) -> Vec<String> {
    let mut kept = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        match managed_flag(&args[i]) {
            Some(true) => i += 1,
            Some(false) => {
                let has_value = args.get(i + 1).is_some_and(|next| !next.starts_with("--"));
                i += if has_value { 2 } else { 1 };
            }
            None => {
                kept.push(args[i].clone());
                i += 1;
            }
        }
    }
    kept
}

fn contains_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| {
        let name = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
        name.eq_ignore_ascii_case(flag)
    })
}

fn default_tweak_class(version: &str) -> &'static str {
    if version == "1.7" || version.starts_with("1.7.") {
        LEGACY_FML_TWEAKER
    } else {
        FML_TWEAKER
    }
}
