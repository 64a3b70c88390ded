use std::fs;
use std::process::Command;

fn horde() -> Command {
    Command::new(env!("CARGO_BIN_EXE_horde"))
}

#[test]
fn short_run_prints_summary() {
    let output = horde()
        .args(["--seconds", "3", "--fps", "30", "--seed", "7"])
        .output()
        .expect("failed to launch horde binary");

    assert!(output.status.success(), "horde should exit cleanly");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("spawned:"), "unexpected output: {stdout}");
    assert!(stdout.contains("peak combo:"));
}

#[test]
fn rejects_non_positive_duration() {
    let output = horde()
        .args(["--seconds", "0"])
        .output()
        .expect("failed to launch horde binary");
    assert!(!output.status.success());
}

#[test]
fn loads_scheduler_config_from_toml() {
    let path = std::env::temp_dir().join(format!("horde-cli-{}.toml", std::process::id()));
    fs::write(
        &path,
        r#"
            [[waves]]
            start_minute = 0.0
            min_population = 8
            spawn_interval_ms = 5000

            [[enemies]]
            name = "slime"
            base_health = 4.0
            base_damage = 1.0
            spawn_weight = 1.0
        "#,
    )
    .expect("write config");

    let output = horde()
        .args(["--seconds", "2", "--config"])
        .arg(&path)
        .output()
        .expect("failed to launch horde binary");
    let _ = fs::remove_file(&path);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("spawned:       8"), "unexpected output: {stdout}");
}

#[test]
fn reports_invalid_config_path() {
    let output = horde()
        .args(["--config", "/nonexistent/horde.toml"])
        .output()
        .expect("failed to launch horde binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read"));
}
