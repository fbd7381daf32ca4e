use anyhow::Result;
use pysession::{
    LoadError, LoaderOptions, RenderOptions, ResultView, Session, SessionOptions, SessionPhase,
    StartError, SubmitError,
};
use std::process::Command;

fn python_has(module: &str) -> bool {
    Command::new("python3")
        .args(["-c", &format!("import {module}")])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn options(packages: &[&str]) -> SessionOptions {
    SessionOptions {
        loader: LoaderOptions {
            python_path: "python3".into(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
            backend: "Agg".into(),
        },
        render: RenderOptions { dpi: 50 },
        ..SessionOptions::default()
    }
}

async fn started(packages: &[&str]) -> Result<Session> {
    let session = Session::python(options(packages));
    session.start().await?;
    Ok(session)
}

const TWO_FIGURES: &str = "\
import matplotlib.pyplot as plt
plt.figure()
plt.plot([1, 2, 3], [1, 4, 9])
plt.figure()
plt.bar([0, 1], [3, 1])
";

#[tokio::test]
async fn prints_are_captured_per_run() -> Result<()> {
    if !python_has("sys") {
        println!("python3 not available, skipping");
        return Ok(());
    }
    let session = started(&[]).await?;
    assert_eq!(session.current_phase(), SessionPhase::Ready);

    let view = session.submit("print(1+1)").await?;
    let ResultView::Success { stdout_text, images, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, "2\n");
    assert!(images.is_empty());

    let view = session.submit("x = 1").await?;
    let ResultView::Success { stdout_text, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, pysession::session::facade::DEFAULT_PLACEHOLDER);
    Ok(())
}

#[tokio::test]
async fn raised_errors_leave_the_session_ready() -> Result<()> {
    if !python_has("sys") {
        println!("python3 not available, skipping");
        return Ok(());
    }
    let session = started(&[]).await?;

    let view = session.submit("print('before')\nraise ValueError('x')").await?;
    let ResultView::Error { error_message, stdout_text, .. } = view else {
        panic!("expected error, got {view:?}");
    };
    assert!(error_message.contains("ValueError: x"), "got {error_message}");
    assert!(!error_message.contains("bootstrap"), "got {error_message}");
    assert_eq!(stdout_text, "before\n");
    assert_eq!(session.current_phase(), SessionPhase::Ready);

    let view = session.submit("print('after')").await?;
    assert!(!view.is_error());
    Ok(())
}

#[tokio::test]
async fn closing_stdout_keeps_captured_text() -> Result<()> {
    if !python_has("sys") {
        println!("python3 not available, skipping");
        return Ok(());
    }
    let session = started(&[]).await?;

    let view = session
        .submit("import sys\nprint('kept')\nsys.stdout.close()\nprint('still here')")
        .await?;
    let ResultView::Success { stdout_text, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, "kept\nstill here\n");

    // The next run gets a fresh, open buffer.
    let view = session.submit("print('after')").await?;
    let ResultView::Success { stdout_text, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, "after\n");
    Ok(())
}

#[tokio::test]
async fn variables_persist_between_runs() -> Result<()> {
    if !python_has("sys") {
        println!("python3 not available, skipping");
        return Ok(());
    }
    let session = started(&[]).await?;
    session.submit("total = 40").await?;
    session.submit("total += 2").await?;
    let view = session.submit("print(total)").await?;
    let ResultView::Success { stdout_text, sequence, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, "42\n");
    assert_eq!(sequence, 3);
    Ok(())
}

#[tokio::test]
async fn figures_come_back_in_creation_order_and_do_not_leak() -> Result<()> {
    if !python_has("matplotlib") {
        println!("matplotlib not available, skipping");
        return Ok(());
    }
    let session = started(&["matplotlib"]).await?;

    let view = session.submit(TWO_FIGURES).await?;
    let ResultView::Success { images, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].index, 0);
    assert_eq!(images[1].index, 1);

    let raw = session.last_execution().expect("result stored");
    for image in raw.images() {
        assert!(image.png.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    let view = session
        .submit("import matplotlib.pyplot as plt\nprint(len(plt.get_fignums()))")
        .await?;
    let ResultView::Success { stdout_text, images, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, "0\n");
    assert!(images.is_empty());
    Ok(())
}

#[tokio::test]
async fn figures_are_closed_when_a_run_raises() -> Result<()> {
    if !python_has("matplotlib") {
        println!("matplotlib not available, skipping");
        return Ok(());
    }
    let session = started(&["matplotlib"]).await?;

    let view = session
        .submit("import matplotlib.pyplot as plt\nplt.figure()\nraise RuntimeError('late')")
        .await?;
    assert!(view.is_error());

    let view = session
        .submit("import matplotlib.pyplot as plt\nprint(len(plt.get_fignums()))")
        .await?;
    let ResultView::Success { stdout_text, .. } = view else {
        panic!("expected success, got {view:?}");
    };
    assert_eq!(stdout_text, "0\n");
    Ok(())
}

#[tokio::test]
async fn same_source_renders_identical_bytes_in_fresh_sessions() -> Result<()> {
    if !python_has("matplotlib") {
        println!("matplotlib not available, skipping");
        return Ok(());
    }
    let mut renders = Vec::new();
    for _ in 0..2 {
        let session = started(&["matplotlib"]).await?;
        session.submit(TWO_FIGURES).await?;
        let raw = session.last_execution().expect("result stored");
        renders.push(
            raw.images()
                .iter()
                .map(|img| img.png.clone())
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(renders[0].len(), 2);
    assert!(renders[0] == renders[1], "renders differ between sessions");
    Ok(())
}

#[tokio::test]
async fn missing_package_fails_the_session_for_good() -> Result<()> {
    if !python_has("sys") {
        println!("python3 not available, skipping");
        return Ok(());
    }
    let session = Session::python(options(&["pysession_no_such_module"]));
    let err = session.start().await.expect_err("load should fail");
    let StartError::Load(LoadError::Package { package, message }) = err else {
        panic!("expected a package error, got {err:?}");
    };
    assert_eq!(package, "pysession_no_such_module");
    assert!(message.contains("ModuleNotFoundError"), "got {message}");

    let phase = session.current_phase();
    assert!(phase.is_terminal(), "got {phase:?}");
    assert!(matches!(
        session.submit("print(1)").await,
        Err(SubmitError::Failed(_))
    ));
    assert!(matches!(session.start().await, Err(StartError::AlreadyStarted)));
    Ok(())
}
