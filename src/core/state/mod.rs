pub mod app_state;
pub mod settings;

pub use app_state::AppState;
pub use settings::{default_data_dir, LauncherSettings, SETTINGS_FILE};
