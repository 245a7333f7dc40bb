pub mod runtime;

pub use runtime::{
    detect_java_installations, inspect_java_binary, is_java_compatible_major, java_exe,
    locate_java_binary, parse_major_version, resolve_java_binary, select_runtime,
    JavaInstallation, JavaRuntimePreference,
};
