use crate::models::{BuildConfig, ConsoleMode};
use crate::services::exclude::ExcludeFilter;
use crate::services::process::CommandPlan;
use camino::{Utf8Path, Utf8PathBuf};

/// Translates a [`BuildConfig`] into the compiler's command plan.
///
/// The builder is pure with respect to the filesystem: patterns and paths
/// are encoded as given (post-exclude-filtering) and never globbed or
/// existence-checked here. Argument ordering is fixed and set-valued inputs
/// are sorted, so two equal configs always yield byte-identical argument
/// vectors.
#[derive(Debug, Clone)]
pub struct CompilerPlanBuilder {
    /// Working directory for the compile stage, normally the directory of
    /// the configuration file.
    project_dir: Utf8PathBuf,
}

impl CompilerPlanBuilder {
    pub fn new<P: AsRef<Utf8Path>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Build the full compile-stage invocation.
    pub fn build_plan(&self, config: &BuildConfig) -> CommandPlan {
        let interpreter = if config.project.python_path.is_empty() {
            find_default_interpreter()
        } else {
            Utf8PathBuf::from(&config.project.python_path)
        };

        let exclude = ExcludeFilter::new(&config.exclude);
        let project = &config.project;
        let build = &config.build;

        let mut args: Vec<String> = vec![
            "-m".to_string(),
            "nuitka".to_string(),
            project.main_file.clone(),
        ];

        if build.options.standalone {
            args.push("--standalone".to_string());
        }
        if build.options.onefile {
            args.push("--onefile".to_string());
        }
        args.extend(build.options.extra_parameters.iter().cloned());

        if !project.icon.is_empty() {
            args.push(format!("--windows-icon-from-ico={}", project.icon));
        }
        args.push(format!("--company-name={}", project.company));
        args.push(format!("--product-name={}", project.name));
        args.push(format!("--product-version={}", project.version));
        args.push(format!("--file-description={}", project.description));

        if !build.options.splash_screen.is_empty() {
            args.push(format!(
                "--onefile-windows-splash-screen-image={}",
                build.options.splash_screen
            ));
        }

        for meta in &build.include.distribution_metadata {
            args.push(format!("--include-distribution-metadata={meta}"));
        }

        let mut packages = build.include.packages.clone();
        packages.sort();
        packages.dedup();
        for package in &packages {
            args.push(format!("--include-package={package}"));
            // PySide6 needs its compiler plugin alongside the package.
            if package == "PySide6" {
                args.push("--enable-plugin=pyside6".to_string());
            }
        }

        let mut plugins = build.include.plugins.clone();
        plugins.sort();
        plugins.dedup();
        for plugin in &plugins {
            args.push(format!("--enable-plugin={plugin}"));
        }

        for data_dir in &build.include.data_dirs {
            if exclude.is_excluded(&data_dir.source) {
                tracing::debug!("Excluding data dir: {}", data_dir.source);
                continue;
            }
            args.push(format!(
                "--include-data-dir={}={}",
                data_dir.source, data_dir.target
            ));
        }

        for pattern in &exclude.filter(&build.include.external_data) {
            args.push(format!("--include-onefile-external-data={pattern}"));
        }

        if build.options.remove_output {
            args.push("--remove-output".to_string());
        }

        for file in &exclude.filter(&build.include.files) {
            let target = if Utf8Path::new(file).is_absolute() {
                Utf8Path::new(file).file_name().unwrap_or(file).to_string()
            } else {
                file.clone()
            };
            args.push(format!("--include-data-file={file}={target}"));
        }

        args.push(format!("--output-dir={}", build.output.directory));
        args.push(format!(
            "--output-filename={}",
            output_filename(&build.output.filename)
        ));

        args.extend(console_args(config));

        CommandPlan::new(interpreter)
            .args(args)
            .cwd(self.project_dir.clone())
    }
}

/// Console flags for the produced executable.
///
/// With debug disabled the console is always suppressed; with it enabled the
/// configured mode wins and any redirect paths are forwarded.
fn console_args(config: &BuildConfig) -> Vec<String> {
    if !config.debug.enabled {
        return vec!["--windows-console-mode=disable".to_string()];
    }

    let console = &config.debug.console;
    let mode = match console.mode {
        ConsoleMode::Disabled => "disable",
        ConsoleMode::Attached => "attach",
        ConsoleMode::Detached => "force",
    };

    let mut args = vec![format!("--windows-console-mode={mode}")];
    if !console.stdout_path.is_empty() {
        args.push(format!("--force-stdout-spec={}", console.stdout_path));
    }
    if !console.stderr_path.is_empty() {
        args.push(format!("--force-stderr-spec={}", console.stderr_path));
    }
    args
}

/// Where the compile stage actually writes its artifact, accounting for the
/// platform-dependent `.exe` handling in [`output_filename`].
pub fn compiled_artifact_path(config: &BuildConfig) -> Utf8PathBuf {
    Utf8PathBuf::from(&config.build.output.directory)
        .join(output_filename(&config.build.output.filename))
}

/// The `.exe` suffix only means something to Windows; elsewhere the compiler
/// is handed the bare name.
fn output_filename(configured: &str) -> String {
    if cfg!(windows) {
        configured.to_string()
    } else {
        configured
            .strip_suffix(".exe")
            .unwrap_or(configured)
            .to_string()
    }
}

/// Locate a usable interpreter when the config does not name one.
///
/// Prefers the active virtual environment, then conventional venv directory
/// names in the working directory and its parent, then the bare interpreter
/// name for PATH lookup.
pub fn find_default_interpreter() -> Utf8PathBuf {
    let (bin_dir, exe_name) = if cfg!(windows) {
        ("Scripts", "python.exe")
    } else {
        ("bin", "python")
    };

    if let Ok(virtual_env) = std::env::var("VIRTUAL_ENV") {
        return Utf8PathBuf::from(virtual_env).join(bin_dir).join(exe_name);
    }

    let cwd = std::env::current_dir()
        .ok()
        .and_then(|p| Utf8PathBuf::try_from(p).ok());

    if let Some(cwd) = cwd {
        for base in [Some(cwd.as_path()), cwd.parent()].into_iter().flatten() {
            for venv_dir in [".venv", "venv", "env"] {
                let candidate = base.join(venv_dir).join(bin_dir).join(exe_name);
                if candidate.exists() {
                    return candidate;
                }
            }
        }
    }

    Utf8PathBuf::from(exe_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_config() -> BuildConfig {
        serde_yaml_ng::from_str(concat!(
            "project:\n",
            "  name: Demo\n",
            "  main_file: /proj/main.py\n",
            "  version: \"1.2.3\"\n",
            "  description: A demo\n",
            "  company: Acme\n",
            "  python_path: /venv/bin/python\n",
            "build:\n",
            "  output:\n    directory: /proj/dist\n    filename: demo.exe\n",
            "  options:\n    standalone: true\n    onefile: true\n",
            "  include:\n",
            "    packages: [zlib, requests]\n",
            "    plugins: [tk-inter]\n",
            "    data_dirs:\n      - {source: /proj/assets, target: assets}\n",
            "    files: [config.ini]\n",
        ))
        .unwrap()
    }

    #[test]
    fn test_plan_is_deterministic() {
        let builder = CompilerPlanBuilder::new("/proj");
        let config = demo_config();
        let a = builder.build_plan(&config);
        let b = builder.build_plan(&config);
        assert_eq!(a.args, b.args);
        assert_eq!(a.program, b.program);
    }

    #[test]
    fn test_packages_sorted() {
        let builder = CompilerPlanBuilder::new("/proj");
        let plan = builder.build_plan(&demo_config());
        let requests = plan
            .args
            .iter()
            .position(|a| a == "--include-package=requests")
            .unwrap();
        let zlib = plan
            .args
            .iter()
            .position(|a| a == "--include-package=zlib")
            .unwrap();
        assert!(requests < zlib);
    }

    #[test]
    fn test_basic_shape() {
        let builder = CompilerPlanBuilder::new("/proj");
        let plan = builder.build_plan(&demo_config());

        assert_eq!(plan.program, "/venv/bin/python");
        assert_eq!(plan.args[0], "-m");
        assert_eq!(plan.args[1], "nuitka");
        assert_eq!(plan.args[2], "/proj/main.py");
        assert!(plan.args.contains(&"--standalone".to_string()));
        assert!(plan.args.contains(&"--onefile".to_string()));
        assert!(plan.args.contains(&"--company-name=Acme".to_string()));
        assert!(plan.args.contains(&"--product-version=1.2.3".to_string()));
        assert!(
            plan.args
                .contains(&"--include-data-dir=/proj/assets=assets".to_string())
        );
        assert!(
            plan.args
                .contains(&"--include-data-file=config.ini=config.ini".to_string())
        );
        assert!(
            plan.args
                .contains(&"--windows-console-mode=disable".to_string())
        );
        assert_eq!(plan.cwd.as_deref(), Some(Utf8Path::new("/proj")));
    }

    #[test]
    fn test_output_filename_strips_exe_off_windows() {
        let builder = CompilerPlanBuilder::new("/proj");
        let plan = builder.build_plan(&demo_config());
        let expected = if cfg!(windows) {
            "--output-filename=demo.exe"
        } else {
            "--output-filename=demo"
        };
        assert!(plan.args.contains(&expected.to_string()));
    }

    #[test]
    fn test_pyside6_implies_plugin() {
        let mut config = demo_config();
        config.build.include.packages.push("PySide6".to_string());
        let plan = CompilerPlanBuilder::new("/proj").build_plan(&config);
        assert!(plan.args.contains(&"--enable-plugin=pyside6".to_string()));
    }

    #[test]
    fn test_exclude_drops_inputs() {
        let mut config = demo_config();
        config.exclude = vec!["*.ini".to_string(), "**/assets".to_string()];
        let plan = CompilerPlanBuilder::new("/proj").build_plan(&config);
        assert!(!plan.args.iter().any(|a| a.contains("config.ini")));
        assert!(!plan.args.iter().any(|a| a.contains("--include-data-dir")));
    }

    #[test]
    fn test_debug_console_flags() {
        let mut config = demo_config();
        config.debug.enabled = true;
        config.debug.console.mode = ConsoleMode::Detached;
        config.debug.console.stdout_path = "{PROGRAM_BASE}.out.txt".to_string();
        let plan = CompilerPlanBuilder::new("/proj").build_plan(&config);
        assert!(
            plan.args
                .contains(&"--windows-console-mode=force".to_string())
        );
        assert!(
            plan.args
                .contains(&"--force-stdout-spec={PROGRAM_BASE}.out.txt".to_string())
        );
    }

    #[test]
    fn test_absolute_data_file_targets_basename() {
        let mut config = demo_config();
        config.build.include.files = vec!["/elsewhere/extra.dat".to_string()];
        let plan = CompilerPlanBuilder::new("/proj").build_plan(&config);
        assert!(
            plan.args
                .contains(&"--include-data-file=/elsewhere/extra.dat=extra.dat".to_string())
        );
    }
}
