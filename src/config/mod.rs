use crate::models::{BuildConfig, ConsoleMode, Severity, ValidationIssue};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced while loading a build configuration.
///
/// `Malformed` means the file is not structurally valid YAML; `Invalid`
/// means the YAML parsed but a field is missing, has the wrong shape, or
/// fails a semantic rule (empty required field, non-UUID upgrade code).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(Utf8PathBuf),

    #[error("configuration file {path} is not valid YAML: {source}")]
    Malformed {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("invalid configuration: {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("failed to read or write configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads, validates, and persists the build configuration file.
///
/// Relative paths in the config are resolved against the config file's
/// directory exactly once, at load time; every downstream builder observes
/// the resolved absolute value and never re-resolves against another base.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    pub fn new<P: AsRef<Utf8Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// Path of the managed configuration file.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Directory containing the configuration file, used as the base for
    /// path resolution and as the working directory of external tools.
    pub fn project_dir(&self) -> Utf8PathBuf {
        self.config_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    }

    /// Load the configuration file, resolve relative paths, and reject any
    /// config that carries a fatal validation issue.
    pub fn load(&self) -> Result<BuildConfig, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::Missing(self.config_path.clone()));
        }

        let file_contents = fs::read_to_string(&self.config_path)?;

        // Two-step parse keeps the taxonomy honest: a broken document is
        // Malformed, a well-formed document with a wrongly-shaped field is
        // Invalid.
        let value: serde_yaml_ng::Value =
            serde_yaml_ng::from_str(&file_contents).map_err(|source| ConfigError::Malformed {
                path: self.config_path.clone(),
                source,
            })?;

        let mut config: BuildConfig =
            serde_yaml_ng::from_value(value).map_err(|e| ConfigError::Invalid {
                field: "(document)".to_string(),
                message: e.to_string(),
            })?;

        resolve_paths(&mut config, &self.project_dir());

        if let Some(issue) = validate(&config, &self.project_dir())
            .into_iter()
            .find(ValidationIssue::is_fatal)
        {
            return Err(ConfigError::Invalid {
                field: issue.field,
                message: issue.message,
            });
        }

        tracing::info!("Loaded build config from {}", self.config_path);
        Ok(config)
    }

    /// Persist a configuration back to the managed path.
    pub fn save(&self, config: &BuildConfig) -> Result<(), ConfigError> {
        let yaml_string = serde_yaml_ng::to_string(config).map_err(|e| ConfigError::Invalid {
            field: "(document)".to_string(),
            message: format!("failed to serialize: {e}"),
        })?;

        fs::write(&self.config_path, yaml_string)?;

        tracing::info!("Saved build config to {}", self.config_path);
        Ok(())
    }

    /// Load the configuration, writing a documented default file first if
    /// none exists. This is the GUI editor's startup operation.
    pub fn ensure_default(&self) -> Result<BuildConfig, ConfigError> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, creating default",
                self.config_path
            );
            if let Some(parent) = self.config_path.parent() {
                if !parent.as_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(&self.config_path, default_config_yaml())?;
        }
        self.load()
    }
}

/// Validate a configuration without failing.
///
/// Returns zero or more structured issues; fatal ones are exactly those
/// [`ConfigManager::load`] rejects. Referenced-file existence is reported as
/// a warning here because the files only need to exist at build time.
///
/// `base` anchors relative path fields, so a draft that has not been through
/// load-time resolution is checked against the config file's directory, not
/// the process working directory. Pass [`ConfigManager::project_dir`]; for
/// an already-loaded config the fields are absolute and `base` is inert.
pub fn validate(config: &BuildConfig, base: &Utf8Path) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.project.name.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "project.name",
            "must not be empty",
        ));
    }
    if config.project.main_file.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "project.main_file",
            "must not be empty",
        ));
    }

    let code = config.installer.metadata.upgrade_code.trim();
    if !code.is_empty() && Uuid::parse_str(code).is_err() {
        issues.push(ValidationIssue::error(
            "installer.metadata.upgrade_code",
            "must be a valid UUID or empty",
        ));
    }

    if config.installer.enabled {
        if config.installer.output.filename.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "installer.output.filename",
                "required when the installer is enabled",
            ));
        }
        if config.installer.metadata.product_name.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "installer.metadata.product_name",
                "required when the installer is enabled",
            ));
        }
    }

    if config.build.output.filename.trim().is_empty() {
        issues.push(ValidationIssue::warning(
            "build.output.filename",
            "empty output filename, the compiler will pick one",
        ));
    }

    for (field, path) in [
        ("project.icon", &config.project.icon),
        ("project.main_file", &config.project.main_file),
        ("installer.ui.banner_image", &config.installer.ui.banner_image),
        ("installer.ui.dialog_image", &config.installer.ui.dialog_image),
        ("installer.license_file", &config.installer.license_file),
    ] {
        if path.is_empty() {
            continue;
        }
        let candidate = Utf8Path::new(path);
        let exists = if candidate.is_relative() {
            base.join(candidate).exists()
        } else {
            candidate.exists()
        };
        if !exists {
            issues.push(ValidationIssue::warning(
                field,
                format!("referenced file does not exist: {path}"),
            ));
        }
    }

    if config.debug.enabled && config.debug.console.mode == ConsoleMode::Disabled {
        issues.push(ValidationIssue::warning(
            "debug.console.mode",
            "debug enabled but console disabled, tool output will be hidden",
        ));
    }

    issues
}

/// Resolve relative path fields against the config file's directory.
///
/// Covers the single-path fields whose location is anchored to the project:
/// main file, icon, splash image, both output directories, installer UI
/// images, license file, and data directory sources. Pattern-typed inputs
/// (`external_data`, `files`, `copy_beside`, `exclude`) stay as written and
/// are interpreted relative to the plan's working directory.
fn resolve_paths(config: &mut BuildConfig, base: &Utf8Path) {
    let resolve = |value: &mut String| {
        if !value.is_empty() && Utf8Path::new(value).is_relative() {
            *value = base.join(value.as_str()).to_string();
        }
    };

    resolve(&mut config.project.main_file);
    resolve(&mut config.project.icon);
    resolve(&mut config.build.options.splash_screen);
    resolve(&mut config.build.output.directory);
    resolve(&mut config.installer.output.directory);
    resolve(&mut config.installer.ui.banner_image);
    resolve(&mut config.installer.ui.dialog_image);
    resolve(&mut config.installer.license_file);

    for data_dir in &mut config.build.include.data_dirs {
        resolve(&mut data_dir.source);
    }
}

/// Template written by [`ConfigManager::ensure_default`].
fn default_config_yaml() -> &'static str {
    r#"# installer-forge build configuration
project:
  name: MyApp
  main_file: main.py
  version: "0.1.0"
  description: ""
  company: ""

build:
  output:
    directory: dist
    filename: MyApp.exe
  options:
    standalone: true
    onefile: true
  include:
    packages: []
    plugins: []
    data_dirs: []
    external_data: []
    files: []
  copy_beside: []

installer:
  enabled: false
  output:
    directory: installer
    filename: MyApp.msi
  metadata:
    manufacturer: ""
    product_name: MyApp
    upgrade_code: ""
  shortcuts:
    desktop: false
    start_menu: true

debug:
  enabled: false

exclude: []
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> ConfigManager {
        let path = dir.path().join("build_config.yaml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        ConfigManager::new(Utf8PathBuf::try_from(path).unwrap())
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("nope.yaml")).unwrap();
        let manager = ConfigManager::new(&path);
        assert!(matches!(manager.load(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let dir = TempDir::new().unwrap();
        let manager = write_config(&dir, "project: [unterminated\n  name");
        assert!(matches!(manager.load(), Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn test_wrong_shape_is_invalid() {
        let dir = TempDir::new().unwrap();
        let manager = write_config(
            &dir,
            concat!(
                "project:\n  name: Demo\n  main_file: main.py\n",
                "build: {}\n",
                "installer:\n  shortcuts:\n    desktop: \"yes please\"\n",
            ),
        );
        assert!(matches!(manager.load(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = write_config(&dir, "project:\n  name: \"\"\n  main_file: m.py\nbuild: {}\n");
        match manager.load() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "project.name"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_upgrade_code_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = write_config(
            &dir,
            concat!(
                "project:\n  name: Demo\n  main_file: main.py\n",
                "build: {}\n",
                "installer:\n  metadata:\n    upgrade_code: not-a-uuid\n",
            ),
        );
        assert!(matches!(manager.load(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_paths_resolved_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let manager = write_config(
            &dir,
            concat!(
                "project:\n  name: Demo\n  main_file: main.py\n  icon: assets/app.ico\n",
                "build:\n  output:\n    directory: dist\n    filename: demo.exe\n",
            ),
        );
        let config = manager.load().unwrap();
        let base = manager.project_dir();

        assert_eq!(config.project.main_file, base.join("main.py").as_str());
        assert_eq!(config.project.icon, base.join("assets/app.ico").as_str());
        assert_eq!(config.build.output.directory, base.join("dist").as_str());
    }

    #[test]
    fn test_absolute_paths_untouched() {
        let dir = TempDir::new().unwrap();
        let manager = write_config(
            &dir,
            "project:\n  name: Demo\n  main_file: /abs/main.py\nbuild: {}\n",
        );
        let config = manager.load().unwrap();
        assert_eq!(config.project.main_file, "/abs/main.py");
    }

    #[test]
    fn test_validate_never_fails() {
        let config: BuildConfig = serde_yaml_ng::from_str(
            "project:\n  name: \"\"\n  main_file: \"\"\nbuild: {}\n",
        )
        .unwrap();
        let issues = validate(&config, Utf8Path::new("."));
        assert!(issues.iter().filter(|i| i.is_fatal()).count() >= 2);
    }

    #[test]
    fn test_validate_warnings_non_fatal() {
        let config: BuildConfig = serde_yaml_ng::from_str(concat!(
            "project:\n  name: Demo\n  main_file: main.py\n",
            "build: {}\n",
            "debug:\n  enabled: true\n",
        ))
        .unwrap();
        let issues = validate(&config, Utf8Path::new("."));
        assert!(issues.iter().any(|i| i.field == "debug.console.mode"));
        assert!(issues.iter().all(|i| !i.is_fatal()));
    }

    #[test]
    fn test_validate_draft_paths_checked_against_base() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(base.join("app.ico"), b"icon").unwrap();

        // An unresolved draft, as a live editor would hold it.
        let config: BuildConfig = serde_yaml_ng::from_str(concat!(
            "project:\n  name: Demo\n  main_file: main.py\n  icon: app.ico\n",
            "build: {}\n",
        ))
        .unwrap();

        let issues = validate(&config, &base);
        assert!(issues.iter().all(|i| i.field != "project.icon"));

        // The same draft against a directory without the icon warns.
        let issues = validate(&config, Utf8Path::new("/definitely/not/here"));
        assert!(issues.iter().any(|i| i.field == "project.icon"));
    }

    #[test]
    fn test_ensure_default_creates_and_loads() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("build_config.yaml")).unwrap();
        let manager = ConfigManager::new(&path);

        let config = manager.ensure_default().unwrap();
        assert!(path.exists());
        assert_eq!(config.project.name, "MyApp");
        assert!(config.installer.shortcuts.start_menu);

        // A second call loads the existing file instead of rewriting it.
        let again = manager.ensure_default().unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("build_config.yaml")).unwrap();
        let manager = ConfigManager::new(&path);

        let mut config = manager.ensure_default().unwrap();
        config.build.include.packages = vec!["requests".to_string()];
        config.exclude = vec!["*.tmp".to_string()];
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(config, loaded);
    }
}
