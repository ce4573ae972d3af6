pub mod check;
pub mod graph;
pub mod init;
pub mod probe;
pub mod process;

use std::path::Path;

use clipforge_edit_model::JobSettings;

/// Load a settings document, or the defaults when none is given.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<JobSettings> {
    let settings = match path {
        Some(path) => JobSettings::load(path)?,
        None => JobSettings::default(),
    };
    for problem in settings.validate() {
        tracing::warn!("Settings: {problem}");
    }
    Ok(settings)
}
