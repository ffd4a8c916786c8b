//! Runtime settings: an optional TOML file under `WPMIG_*` variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database standing in for the destination site.
  pub store_path:      PathBuf,
  /// Where stored media files are written.
  pub upload_dir:      PathBuf,
  pub site_url:        String,
  /// Plugins to mark active on the destination before running.
  #[serde(default)]
  pub plugins:         Vec<String>,
  /// Enables rewriting of legacy-host links during `migrate`.
  #[serde(default)]
  pub legacy_site_url: Option<String>,
}

impl Settings {
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("store_path", "wpmig.db")?
      .set_default("upload_dir", "uploads")?
      .set_default("site_url", "http://localhost")?
      .add_source(config::File::from(file).required(false))
      .add_source(
        config::Environment::with_prefix("WPMIG")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("plugins"),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Self = settings
      .try_deserialize()
      .context("failed to deserialise Settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    settings.upload_dir = expand_tilde(&settings.upload_dir);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn tilde_expands_to_home() {
    let home = std::env::var("HOME").unwrap();
    assert_eq!(expand_tilde(Path::new("~/wpmig.db")), Path::new(&home).join("wpmig.db"));
    assert_eq!(expand_tilde(Path::new("/srv/wpmig.db")), Path::new("/srv/wpmig.db"));
  }

  #[test]
  fn file_values_override_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      r#"
site_url = "https://new.example"
plugins = ["advanced-custom-fields"]
legacy_site_url = "http://old.example"
"#
    )
    .unwrap();

    let settings = Settings::load(file.path()).unwrap();
    assert_eq!(settings.site_url, "https://new.example");
    assert_eq!(settings.plugins, ["advanced-custom-fields"]);
    assert_eq!(settings.legacy_site_url.as_deref(), Some("http://old.example"));
    assert_eq!(settings.store_path, Path::new("wpmig.db"));
  }
}
