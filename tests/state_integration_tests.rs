//! Integration tests for the build coordinator
//!
//! A stub interpreter script stands in for the real compiler so the
//! pipeline's phase machine, event stream, copy-beside expansion, busy
//! guard, and cancellation can be exercised end to end.

#![cfg(unix)]

use camino::Utf8PathBuf;
use installer_forge::metrics::Metrics;
use installer_forge::state::{
    BuildCoordinator, BuildError, BuildEvent, BuildMode, BuildOutcome, BuildPhase, BuildStage,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Project {
    _dir: TempDir,
    root: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

/// Set up a project directory with a stub interpreter that runs `script`
/// instead of compiling anything.
fn project_with_stub(script: &str, installer_enabled: bool) -> Project {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

    let stub = root.join("fake-python");
    fs::write(&stub, format!("#!/bin/sh\n{script}\n")).unwrap();
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();

    fs::write(root.join("main.py"), "print('hi')\n").unwrap();

    let config_path = root.join("build_config.yaml");
    fs::write(
        &config_path,
        format!(
            concat!(
                "project:\n  name: Stubbed\n  main_file: main.py\n  python_path: {stub}\n",
                "build:\n  output:\n    directory: dist\n    filename: stubbed.exe\n",
                "  copy_beside: [extra.txt, junk.tmp]\n",
                "installer:\n  enabled: {enabled}\n",
                "  output:\n    filename: stubbed.msi\n",
                "  metadata:\n    product_name: Stubbed\n",
                "exclude: [\"*.tmp\"]\n",
            ),
            stub = stub,
            enabled = installer_enabled,
        ),
    )
    .unwrap();

    fs::write(root.join("extra.txt"), "payload").unwrap();
    fs::write(root.join("junk.tmp"), "scratch").unwrap();

    Project {
        _dir: dir,
        root,
        config_path,
    }
}

fn coordinator() -> BuildCoordinator {
    BuildCoordinator::new(Arc::new(Metrics::new()))
}

async fn run_to_end(
    coordinator: &BuildCoordinator,
    project: &Project,
    mode: BuildMode,
) -> (BuildOutcome, Vec<BuildPhase>) {
    let mut handle = coordinator.start(&project.config_path, mode, None).unwrap();
    let mut events = handle.take_events();
    let phases = tokio::spawn(async move {
        let mut phases = Vec::new();
        loop {
            match events.recv().await {
                Ok(BuildEvent::PhaseChanged(phase)) => phases.push(phase),
                Ok(BuildEvent::Finished(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        phases
    });

    let outcome = handle.wait().await;
    let phases = phases.await.unwrap();
    (outcome, phases)
}

#[tokio::test]
async fn test_exe_only_build_succeeds_without_packaging() {
    let project = project_with_stub("echo compiling; exit 0", true);
    let coordinator = coordinator();

    let (outcome, phases) =
        run_to_end(&coordinator, &project, BuildMode::ExecutableOnly).await;

    assert!(matches!(outcome, BuildOutcome::Success));
    // The first phase change is never missed by a freshly taken receiver.
    assert_eq!(phases.first(), Some(&BuildPhase::LoadingConfig));
    assert!(phases.contains(&BuildPhase::Compiling));
    assert!(phases.contains(&BuildPhase::Done));
    assert!(!phases.contains(&BuildPhase::Packaging));
}

#[tokio::test]
async fn test_installer_disabled_stops_after_compile() {
    let project = project_with_stub("exit 0", false);
    let coordinator = coordinator();

    let (outcome, phases) =
        run_to_end(&coordinator, &project, BuildMode::WithInstaller).await;

    assert!(matches!(outcome, BuildOutcome::Success));
    assert!(!phases.contains(&BuildPhase::Packaging));
}

#[tokio::test]
async fn test_copy_beside_respects_exclude() {
    let project = project_with_stub("exit 0", false);
    let coordinator = coordinator();

    let (outcome, _) = run_to_end(&coordinator, &project, BuildMode::ExecutableOnly).await;
    assert!(matches!(outcome, BuildOutcome::Success));

    assert!(project.root.join("dist/extra.txt").is_file());
    assert!(!project.root.join("dist/junk.tmp").exists());
}

#[tokio::test]
async fn test_compile_failure_never_reaches_packaging() {
    let project = project_with_stub("echo nope >&2; exit 7", true);
    let coordinator = coordinator();

    let (outcome, phases) =
        run_to_end(&coordinator, &project, BuildMode::WithInstaller).await;

    match outcome {
        BuildOutcome::Failed(BuildError::StageFailed {
            stage,
            exit_code,
            stderr_tail,
        }) => {
            assert_eq!(stage, BuildStage::Compile);
            assert_eq!(exit_code, 7);
            assert_eq!(stderr_tail, vec!["nope"]);
        }
        other => panic!("expected compile StageFailed, got {other:?}"),
    }
    assert!(!phases.contains(&BuildPhase::Packaging));
    assert!(phases.contains(&BuildPhase::Failed));
}

#[tokio::test]
async fn test_output_lines_forwarded() {
    let project = project_with_stub("echo hello-from-tool", false);
    let coordinator = coordinator();

    let mut handle = coordinator
        .start(&project.config_path, BuildMode::ExecutableOnly, None)
        .unwrap();
    let mut events = handle.take_events();
    let saw_line = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BuildEvent::Output(line)) if line.text == "hello-from-tool" => return true,
                Ok(BuildEvent::Finished(_)) | Err(_) => return false,
                Ok(_) => {}
            }
        }
    });

    let outcome = handle.wait().await;
    assert!(matches!(outcome, BuildOutcome::Success));
    assert!(saw_line.await.unwrap());
}

#[tokio::test]
async fn test_second_start_is_busy_while_running() {
    let project = project_with_stub("sleep 5", false);
    let coordinator = coordinator();

    let first = coordinator
        .start(&project.config_path, BuildMode::ExecutableOnly, None)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = coordinator.start(&project.config_path, BuildMode::ExecutableOnly, None);
    assert!(matches!(second, Err(BuildError::Busy)));

    first.cancel();
    let outcome = first.wait().await;
    assert!(matches!(outcome, BuildOutcome::Cancelled));

    // The guard clears once the first build finishes.
    let third = coordinator
        .start(&project.config_path, BuildMode::ExecutableOnly, None)
        .unwrap();
    let _ = third.wait().await;
}

#[tokio::test]
async fn test_cancellation_ends_in_cancelled_phase() {
    let project = project_with_stub("sleep 30", false);
    let coordinator = coordinator();

    let handle = coordinator
        .start(&project.config_path, BuildMode::ExecutableOnly, None)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.cancel();

    let outcome = handle.wait().await;
    assert!(matches!(outcome, BuildOutcome::Cancelled));
}

#[tokio::test]
async fn test_reuse_compiled_skips_compile_stage() {
    let project = project_with_stub("touch compile-ran; exit 0", false);

    // Opt into reuse and pre-create the compiled artifact (the `.exe`
    // suffix is stripped off Windows).
    let text = fs::read_to_string(&project.config_path).unwrap();
    let text = text.replace(
        "installer:\n  enabled: false\n",
        "installer:\n  enabled: false\n  reuse_compiled: true\n",
    );
    fs::write(&project.config_path, text).unwrap();
    let artifact = if cfg!(windows) {
        "dist/stubbed.exe"
    } else {
        "dist/stubbed"
    };
    fs::create_dir_all(project.root.join("dist")).unwrap();
    fs::write(project.root.join(artifact), b"old build").unwrap();

    let coordinator = coordinator();
    let (outcome, phases) =
        run_to_end(&coordinator, &project, BuildMode::WithInstaller).await;

    assert!(matches!(outcome, BuildOutcome::Success));
    assert!(!phases.contains(&BuildPhase::Compiling));
    assert!(!project.root.join("compile-ran").exists());
}

#[tokio::test]
async fn test_missing_interpreter_is_launch_failure() {
    let project = project_with_stub("exit 0", false);
    // Point the config at an interpreter that does not exist.
    let text = fs::read_to_string(&project.config_path).unwrap();
    let broken = text.replace(
        project.root.join("fake-python").as_str(),
        "/definitely/not/python",
    );
    fs::write(&project.config_path, broken).unwrap();

    let coordinator = coordinator();
    let (outcome, _) = run_to_end(&coordinator, &project, BuildMode::ExecutableOnly).await;

    match outcome {
        BuildOutcome::Failed(BuildError::Launch { stage, .. }) => {
            assert_eq!(stage, BuildStage::Compile);
        }
        other => panic!("expected launch failure, got {other:?}"),
    }
}
