use serde::{Deserialize, Serialize};

/// Root build description loaded from `build_config.yaml`.
///
/// Every optional field carries a serde default so a loaded config is always
/// fully populated: downstream builders branch on resolved values, never on
/// field presence. Path-typed fields are plain strings in the serialized
/// form; [`crate::config::ConfigManager`] resolves the relative ones against
/// the config file's directory at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub project: ProjectConfig,

    pub build: BuildSection,

    #[serde(default)]
    pub installer: InstallerConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    /// Glob patterns dropped from every file-gathering input
    /// (`data_dirs`, `external_data`, `files`, `copy_beside`).
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Project identity and entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Product name. Mandatory and non-empty.
    pub name: String,

    /// Entry source file handed to the compiler. Mandatory and non-empty.
    pub main_file: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub company: String,

    /// Project homepage; feeds the installer's Add/Remove Programs links.
    #[serde(default)]
    pub url: String,

    /// Icon path, resolved at load time. Empty means no icon.
    #[serde(default)]
    pub icon: String,

    /// Interpreter override. Empty means "discover a default".
    #[serde(default)]
    pub python_path: String,
}

/// Compile-stage settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub include: IncludeConfig,

    /// Files and directories copied next to the compiled executable after a
    /// successful compile, and packaged into the installer.
    #[serde(default)]
    pub copy_beside: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,

    #[serde(default)]
    pub filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            filename: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default)]
    pub standalone: bool,

    #[serde(default)]
    pub onefile: bool,

    /// Splash image shown while a onefile binary unpacks. Empty means none.
    #[serde(default)]
    pub splash_screen: String,

    /// Delete the compiler's intermediate output after the build.
    #[serde(default)]
    pub remove_output: bool,

    /// Verbatim extra compiler arguments, kept in config order.
    #[serde(default)]
    pub extra_parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IncludeConfig {
    /// Module names included wholesale. Encoded sorted for determinism.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Compiler plugin names. Encoded sorted for determinism.
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Data directory mappings, kept in config order.
    #[serde(default)]
    pub data_dirs: Vec<DataDir>,

    /// Glob patterns attached to the onefile payload, kept in config order.
    #[serde(default)]
    pub external_data: Vec<String>,

    /// Extra data files, kept in config order.
    #[serde(default)]
    pub files: Vec<String>,

    /// Distribution metadata names forwarded to the compiler.
    #[serde(default)]
    pub distribution_metadata: Vec<String>,
}

/// A source directory installed under a target path inside the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDir {
    pub source: String,
    pub target: String,
}

/// Package-stage settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub output: InstallerOutput,

    #[serde(default)]
    pub metadata: InstallerMetadata,

    #[serde(default)]
    pub ui: InstallerUi,

    /// RTF license shown by the installer UI. Empty means no license page.
    #[serde(default)]
    pub license_file: String,

    #[serde(default)]
    pub shortcuts: Shortcuts,

    /// When true, `build-installer` skips the compile stage if the compiled
    /// output file already exists. Never inferred from timestamps.
    #[serde(default)]
    pub reuse_compiled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerOutput {
    #[serde(default = "default_installer_directory")]
    pub directory: String,

    #[serde(default)]
    pub filename: String,
}

impl Default for InstallerOutput {
    fn default() -> Self {
        Self {
            directory: default_installer_directory(),
            filename: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstallerMetadata {
    #[serde(default)]
    pub manufacturer: String,

    #[serde(default)]
    pub product_name: String,

    /// Upgrade code as a UUID string. Empty means "derive deterministically
    /// from `product_name`" so the same product always keeps the same code.
    #[serde(default)]
    pub upgrade_code: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstallerUi {
    #[serde(default)]
    pub banner_image: String,

    #[serde(default)]
    pub dialog_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortcuts {
    #[serde(default)]
    pub desktop: bool,

    #[serde(default = "default_true")]
    pub start_menu: bool,
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            desktop: false,
            start_menu: true,
        }
    }
}

/// Debug/diagnostic settings for the produced executable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub mode: ConsoleMode,

    /// Redirect target for the produced executable's stdout. Empty means no
    /// redirection.
    #[serde(default)]
    pub stdout_path: String,

    #[serde(default)]
    pub stderr_path: String,
}

/// Console behavior of the compiled Windows executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleMode {
    #[default]
    Disabled,
    Attached,
    Detached,
}

fn default_output_directory() -> String {
    "dist".to_string()
}

fn default_installer_directory() -> String {
    "installer".to_string()
}

fn default_true() -> bool {
    true
}

impl BuildConfig {
    /// Path of the final installer package.
    pub fn installer_output_path(&self) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from(&self.installer.output.directory)
            .join(&self.installer.output.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = "project:\n  name: Demo\n  main_file: main.py\nbuild: {}\n";
        let config: BuildConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.project.name, "Demo");
        assert_eq!(config.build.output.directory, "dist");
        assert!(!config.installer.enabled);
        assert!(config.installer.shortcuts.start_menu);
        assert!(!config.installer.shortcuts.desktop);
        assert_eq!(config.debug.console.mode, ConsoleMode::Disabled);
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_console_mode_lowercase_names() {
        let yaml = "mode: detached\n";
        let console: ConsoleConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(console.mode, ConsoleMode::Detached);
    }

    #[test]
    fn test_installer_output_path() {
        let yaml = concat!(
            "project:\n  name: Demo\n  main_file: main.py\n",
            "build: {}\n",
            "installer:\n  output:\n    directory: msi\n    filename: demo.msi\n",
        );
        let config: BuildConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.installer_output_path(), "msi/demo.msi");
    }
}
