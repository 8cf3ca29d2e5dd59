//! Integration tests for compile-plan determinism across config loads

use camino::Utf8PathBuf;
use installer_forge::{CompilerPlanBuilder, ConfigManager};
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = concat!(
    "project:\n",
    "  name: Deterministic\n",
    "  main_file: main.py\n",
    "  version: \"1.0.0\"\n",
    "  python_path: /opt/venv/bin/python\n",
    "build:\n",
    "  output:\n    directory: dist\n    filename: det.exe\n",
    "  options:\n    standalone: true\n    onefile: true\n",
    "  include:\n",
    "    packages: [zlib, requests, PySide6]\n",
    "    plugins: [tk-inter]\n",
    "    files: [config.ini]\n",
    "exclude: [\"*.tmp\"]\n",
);

#[test]
fn test_two_loads_yield_identical_plans() {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(dir.path().join("build_config.yaml")).unwrap();
    fs::write(&path, CONFIG).unwrap();

    let manager = ConfigManager::new(&path);
    let builder = CompilerPlanBuilder::new(manager.project_dir());

    let first = builder.build_plan(&manager.load().unwrap());
    let second = builder.build_plan(&manager.load().unwrap());

    assert_eq!(first, second);
    assert_eq!(first.command_line(), second.command_line());
}

#[test]
fn test_package_order_independent_of_config_order() {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(dir.path().join("build_config.yaml")).unwrap();
    fs::write(&path, CONFIG).unwrap();

    let manager = ConfigManager::new(&path);
    let builder = CompilerPlanBuilder::new(manager.project_dir());
    let baseline = builder.build_plan(&manager.load().unwrap());

    // Same packages listed in a different order, with a duplicate.
    let shuffled = CONFIG.replace(
        "packages: [zlib, requests, PySide6]",
        "packages: [PySide6, zlib, requests, zlib]",
    );
    fs::write(&path, shuffled).unwrap();
    let reordered = builder.build_plan(&manager.load().unwrap());

    assert_eq!(baseline.args, reordered.args);
}
