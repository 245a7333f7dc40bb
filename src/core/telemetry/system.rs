use sysinfo::System;

/// Human-readable OS name for statistics, e.g. `Linux (Ubuntu 24.04)`.
pub fn os_description() -> String {
    match (System::name(), System::long_os_version()) {
        (_, Some(long)) => long,
        (Some(name), None) => name,
        (None, None) => std::env::consts::OS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_description_is_never_empty() {
        assert!(!os_description().is_empty());
    }
}
