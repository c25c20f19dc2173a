use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_skyfall(data_dir: &Path, args: &[&str]) -> Output {
    run_skyfall_with_env(data_dir, args, Vec::new())
}

fn run_skyfall_with_env(data_dir: &Path, args: &[&str], env_vars: Vec<(&str, &str)>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_skyfall"));
    cmd.args(args)
        .current_dir(data_dir)
        .env("HOME", data_dir)
        .env("NO_COLOR", "1")
        .env("SKYFALL__STORAGE__DATA_DIR", data_dir)
        .env("SKYFALL__ENGINE__HONOR_WAITS", "false")
        .env_remove("RUST_LOG");
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute skyfall command")
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn workspace() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("skyfall"), "output should contain 'skyfall'");
        assert!(stdout.contains("0.1.0"), "output should contain version number");
    }

    #[test]
    fn test_version_command_detailed() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version --detailed should succeed");
        assert!(stdout.contains("Version"));
        assert!(stdout.contains("EntraID"));
        assert!(stdout.contains("M365"));
    }
}

mod help_command_tests {
    use super::*;

    #[test]
    fn test_help_lists_command_groups() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "--help should succeed");
        for group in ["techniques", "playbooks", "schedules", "runs"] {
            assert!(stdout.contains(group), "help should mention {}", group);
        }
    }

    #[test]
    fn test_invalid_command() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["nonexistent-command"]);

        assert!(!output.status.success(), "invalid command should fail");
    }

    #[test]
    fn test_invalid_subcommand() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["playbooks", "invalid-subcommand"]);

        assert!(!output.status.success(), "invalid subcommand should fail");
    }
}

mod config_command_tests {
    use super::*;

    #[test]
    fn test_config_reflects_data_dir() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["config"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        assert!(stdout.contains("[storage]"));
        assert!(stdout.contains("honor_waits = false"));
        assert!(stdout.contains(&dir.path().join("playbooks").display().to_string()));
    }

    #[test]
    fn test_invalid_config_fails() {
        let dir = workspace();
        let output = run_skyfall_with_env(
            dir.path(),
            &["playbooks", "list"],
            vec![("SKYFALL__SCHEDULER__TICK_INTERVAL_SECS", "0")],
        );

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("tick_interval_secs"));
    }
}

mod techniques_command_tests {
    use super::*;

    #[test]
    fn test_builtin_techniques_listed() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["techniques", "list", "--format", "json"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        let listed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        let ids: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["AWS-000", "AZ-000", "ENTRA-000", "M365-000"]);
    }

    #[test]
    fn test_surface_filter() {
        let dir = workspace();
        let output = run_skyfall(
            dir.path(),
            &["techniques", "list", "--surface", "aws", "--format", "json"],
        );
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        let listed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["attack_surface"], "AWS");
    }

    #[test]
    fn test_unknown_technique_info_fails() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["techniques", "info", "NOPE-404"]);

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E1001"));
    }
}

mod playbook_command_tests {
    use super::*;

    #[test]
    fn test_create_add_step_and_show() {
        let dir = workspace();

        let output = run_skyfall(
            dir.path(),
            &["playbooks", "create", "Recon", "--author", "red-team"],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let output = run_skyfall(
            dir.path(),
            &["playbooks", "add-step", "Recon", "AWS-000", "--wait", "5"],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let output = run_skyfall(
            dir.path(),
            &[
                "playbooks", "add-step", "Recon", "AZ-000", "--param", "42", "--param", "eu",
            ],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let output = run_skyfall(dir.path(), &["playbooks", "show", "Recon", "--format", "json"]);
        assert!(output.status.success());
        let playbook: serde_json::Value =
            serde_json::from_str(&output_to_string(&output)).unwrap();
        assert_eq!(playbook["author"], "red-team");
        assert_eq!(playbook["sequence"]["1"]["module"], "AWS-000");
        assert_eq!(playbook["sequence"]["1"]["wait"], 5);
        assert_eq!(
            playbook["sequence"]["2"]["params"],
            serde_json::json!([42, "eu"])
        );
    }

    #[test]
    fn test_duplicate_create_fails() {
        let dir = workspace();

        assert!(run_skyfall(dir.path(), &["playbooks", "create", "Recon"])
            .status
            .success());
        let output = run_skyfall(dir.path(), &["playbooks", "create", "Recon"]);

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E2002"));
    }

    #[test]
    fn test_run_writes_report() {
        let dir = workspace();

        run_skyfall(dir.path(), &["playbooks", "create", "Recon"]);
        run_skyfall(dir.path(), &["playbooks", "add-step", "Recon", "AWS-000"]);
        run_skyfall(dir.path(), &["playbooks", "add-step", "Recon", "AZ-000"]);

        let output = run_skyfall(
            dir.path(),
            &[
                "playbooks",
                "run",
                "Recon",
                "--as",
                "aws=arn:aws:iam::111:user/red",
                "--format",
                "json",
            ],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let run: serde_json::Value = serde_json::from_str(&output_to_string(&output)).unwrap();
        let steps = run["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["status"], "success");
        assert_eq!(steps[1]["status"], "failed");

        let run_dir = Path::new(run["run_dir"].as_str().unwrap());
        assert!(run_dir.starts_with(dir.path().join("runs")));
        assert!(run_dir.join("Config.yml").exists());
        let report = std::fs::read_to_string(run_dir.join("Report.csv")).unwrap();
        assert!(report.starts_with("Time_Stamp,Module,Result"));
        assert_eq!(report.lines().count(), 3);

        let artifact = std::fs::read_to_string(run_dir.join("AWS-000.txt")).unwrap();
        assert!(artifact.contains("arn:aws:iam::111:user/red"));

        let output = run_skyfall(dir.path(), &["runs", "list", "--format", "json"]);
        let runs: serde_json::Value = serde_json::from_str(&output_to_string(&output)).unwrap();
        assert_eq!(runs.as_array().unwrap().len(), 1);
        assert_eq!(runs[0]["playbook_name"], "Recon");
        assert_eq!(runs[0]["outcome"], "partial");
    }

    #[test]
    fn test_run_missing_playbook_fails() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["playbooks", "run", "Ghost"]);

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E3001"));

        let output = run_skyfall(dir.path(), &["runs", "list", "--format", "json"]);
        assert_eq!(output_to_string(&output).trim(), "[]");
    }

    #[test]
    fn test_run_rejects_zero_timeout() {
        let dir = workspace();
        run_skyfall(dir.path(), &["playbooks", "create", "Recon"]);
        run_skyfall(dir.path(), &["playbooks", "add-step", "Recon", "AWS-000"]);

        let output = run_skyfall(dir.path(), &["playbooks", "run", "Recon", "--timeout", "0"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("--timeout"));
        let runs = std::fs::read_dir(dir.path().join("runs"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(runs, 0);

        let output = run_skyfall(dir.path(), &["playbooks", "run", "Recon", "--timeout", "5"]);
        assert!(output.status.success(), "{}", stderr_to_string(&output));
    }

    #[test]
    fn test_import_then_export() {
        let dir = workspace();
        let source = dir.path().join("incoming.yml");
        let content = "name: Imported\ncreation_date: 2024-01-15\nsequence:\n  1:\n    module: M365-000\n";
        std::fs::write(&source, content).unwrap();

        let output = run_skyfall(
            dir.path(),
            &["playbooks", "import", source.to_str().unwrap(), "--name", "Imported"],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let output = run_skyfall(dir.path(), &["playbooks", "export", "Imported"]);
        assert!(output.status.success());
        assert_eq!(output_to_string(&output), content);
    }
}

mod schedule_command_tests {
    use super::*;

    #[test]
    fn test_add_and_list_schedule() {
        let dir = workspace();

        let output = run_skyfall(
            dir.path(),
            &[
                "schedules",
                "add",
                "Recon",
                "--name",
                "nightly",
                "--start-date",
                "2024-01-01",
                "--time",
                "02:00",
                "--repeat",
                "--frequency",
                "daily",
            ],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let output = run_skyfall(dir.path(), &["schedules", "list", "--format", "json"]);
        assert!(output.status.success());
        let schedules: serde_json::Value =
            serde_json::from_str(&output_to_string(&output)).unwrap();
        assert_eq!(schedules["nightly"]["playbook_id"], "Recon");
        assert_eq!(schedules["nightly"]["repeat_frequency"], "daily");

        let output = run_skyfall(dir.path(), &["schedules", "remove", "nightly"]);
        assert!(output.status.success());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let dir = workspace();
        let output = run_skyfall(
            dir.path(),
            &[
                "schedules",
                "add",
                "Recon",
                "--start-date",
                "01/02/2024",
                "--time",
                "02:00",
            ],
        );

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E5003"));
        assert!(!dir.path().join("schedules.yml").exists());
    }

    #[test]
    fn test_remove_unknown_schedule_fails() {
        let dir = workspace();
        let output = run_skyfall(dir.path(), &["schedules", "remove", "nope"]);

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E5002"));
    }
}
