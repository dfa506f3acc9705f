// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        render_client_script, render_rsyncd_conf, render_server_script, render_tunnel_wait_script,
        sentinel_name, termination_dir, validate_daemon_host, validate_daemon_user,
        ClientScriptFields,
    };
    use crate::errors::TransferError;
    use crate::volumes::VolumeSet;
    use k8s_openapi::api::core::v1::PersistentVolumeClaim;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn claim(name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn two_volumes() -> VolumeSet {
        VolumeSet::new(vec![claim("data-0"), claim("data-1")]).unwrap()
    }

    #[test]
    fn test_rsyncd_conf_localhost_only_behind_tunnel() {
        let conf = render_rsyncd_conf(&two_volumes(), true, None).unwrap();

        assert!(conf.contains("hosts allow = ::1, 127.0.0.1, localhost"));
        assert!(!conf.contains("auth users"));
    }

    #[test]
    fn test_rsyncd_conf_open_without_tunnel() {
        let conf = render_rsyncd_conf(&two_volumes(), false, None).unwrap();

        assert!(conf.contains("hosts allow = *.*.*.*, *"));
    }

    #[test]
    fn test_rsyncd_conf_has_one_module_per_volume() {
        let volumes = two_volumes();
        let conf = render_rsyncd_conf(&volumes, true, None).unwrap();

        for volume in volumes.iter() {
            assert!(conf.contains(&format!("[{}]", volume.label_safe_name())));
            assert!(conf.contains(&format!("path = {}", volume.mount_path())));
            assert!(conf.contains(&format!("comment = archive for apps/{}", volume.name())));
        }
        assert!(conf.contains("[termination]"));
        assert!(conf.contains(&format!("path = {}", termination_dir())));
        assert_eq!(conf.matches("read only = false").count(), 3);
    }

    #[test]
    fn test_rsyncd_conf_auth_lines_per_module() {
        let conf = render_rsyncd_conf(&two_volumes(), true, Some("root")).unwrap();

        assert_eq!(conf.matches("auth users = root").count(), 3);
        assert!(conf.contains("secrets file = /etc/rsync-secret/rsyncd.secrets"));
    }

    #[test]
    fn test_server_script_waits_for_every_sentinel() {
        let volumes = two_volumes();
        let script = render_server_script(&volumes, 8080, 3600).unwrap();

        assert!(script.contains("--port=8080"));
        assert!(script.contains("_exit_cleanup"));
        assert!(script.contains("deadline=$((SECONDS + 3600))"));
        for volume in volumes.iter() {
            assert!(script.contains(&sentinel_name(volume)));
        }
    }

    #[test]
    fn test_client_script_through_tunnel() {
        let volumes = VolumeSet::singleton(claim("db")).unwrap();
        let volume = volumes.iter().next().unwrap();
        let options = vec!["--recursive".to_string(), "--links".to_string()];

        let script = render_client_script(&ClientScriptFields {
            volume,
            options: &options,
            username: "root",
            host: "localhost",
            port: 6443,
        })
        .unwrap();

        assert!(script.contains("timeout=120"));
        assert!(script.contains("until nc -z localhost 6443"));
        assert!(script.contains("-le 5"));
        assert!(script.contains("delay=2"));
        assert!(script.contains(
            "rsync --recursive --links /mnt/apps/data/ rsync://root@localhost:6443/data/"
        ));
        assert!(script.contains(r#"echo "$rc" > /tmp/termination/data.done"#));
        assert!(script.contains(r#"trap "exit 143" SIGTERM"#));
        assert!(script.contains("rsync://root@localhost:6443/termination/"));
        assert!(script.contains("rsync-client-container-done"));
        assert!(script.trim_end().ends_with("exit $rc"));
    }

    #[test]
    fn test_tunnel_wait_script_is_bounded() {
        let script = render_tunnel_wait_script(600).unwrap();

        assert!(script.starts_with("/bin/stunnel /etc/stunnel/stunnel.conf &"));
        assert!(script.contains("deadline=$((SECONDS + 600))"));
        assert!(script.contains("/usr/share/rsync/rsync-client-container-done"));
    }

    #[test]
    fn test_rsyncd_conf_rejects_unsafe_user() {
        let err = render_rsyncd_conf(&two_volumes(), true, Some("root\n[all]")).unwrap_err();

        assert!(matches!(err, TransferError::InvalidDaemonAddress { .. }));
    }

    #[test]
    fn test_daemon_user_validation() {
        assert!(validate_daemon_user("root").is_ok());
        assert!(validate_daemon_user("backup_user-1").is_ok());

        for user in ["", "root; reboot", "$(id)", "root@host", "a b"] {
            let err = validate_daemon_user(user).unwrap_err();
            assert!(
                matches!(&err, TransferError::InvalidDaemonAddress { field, .. } if field == "user"),
                "{user} should be rejected"
            );
        }
    }

    #[test]
    fn test_daemon_host_validation() {
        assert!(validate_daemon_host("localhost").is_ok());
        assert!(validate_daemon_host("rsync.example.com").is_ok());
        assert!(validate_daemon_host("203.0.113.7").is_ok());

        for host in ["", "host;reboot", "$(id)", "a b", "-leading", "trailing."] {
            let err = validate_daemon_host(host).unwrap_err();
            assert!(
                matches!(&err, TransferError::InvalidDaemonAddress { field, .. } if field == "host"),
                "{host} should be rejected"
            );
        }
    }

    #[test]
    fn test_client_script_rejects_unsafe_host() {
        let volumes = VolumeSet::singleton(claim("db")).unwrap();
        let volume = volumes.iter().next().unwrap();

        let err = render_client_script(&ClientScriptFields {
            volume,
            options: &[],
            username: "root",
            host: "localhost; rm -rf /",
            port: 6443,
        })
        .unwrap_err();

        assert!(matches!(err, TransferError::InvalidDaemonAddress { .. }));
    }
}

/// Runs the rendered mover scripts under bash with stand-ins for `rsync`, `nc`
/// and `sleep` on `PATH`.
#[cfg(all(test, unix))]
mod script_tests {
    use super::super::{
        render_client_script, render_server_script, sentinel_name, termination_dir,
        ClientScriptFields,
    };
    use crate::constants::{CLIENT_DONE_FILE, CLIENT_STAGING_DIR, COMMUNICATION_DIR, RSYNCD_LOG_DIR};
    use crate::volumes::VolumeSet;
    use k8s_openapi::api::core::v1::PersistentVolumeClaim;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::process::{Command, Output, Stdio};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn claim(name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Scratch layout standing in for the pod file system
    struct Sandbox {
        root: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let sandbox = Self {
                root: tempfile::tempdir().unwrap(),
            };
            for dir in ["bin", "communication", "staging", "delivered", "termination", "log"] {
                fs::create_dir_all(sandbox.path(dir)).unwrap();
            }
            sandbox
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }

        fn stub(&self, name: &str, body: &str) {
            let path = self.path("bin").join(name);
            fs::write(&path, format!("#!/bin/bash\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        /// Command running `script` with the stubs first on `PATH`
        fn command(&self, script: &str) -> Command {
            let path = format!(
                "{}:{}",
                self.path("bin").display(),
                std::env::var("PATH").unwrap_or_default()
            );
            let mut command = Command::new("bash");
            command.arg("-c").arg(script).env("PATH", path);
            command
        }

        fn run(&self, script: &str) -> Output {
            self.command(script).output().unwrap()
        }

        fn read(&self, dir: &str, file: &str) -> Option<String> {
            fs::read_to_string(self.path(dir).join(file))
                .ok()
                .map(|s| s.trim().to_string())
        }
    }

    fn display(path: &Path) -> String {
        path.display().to_string()
    }

    /// `rsync` that fails the first `failures` syncs with `code` and copies
    /// sentinels pushed to the termination module into `delivered/`
    fn client_rsync(sandbox: &Sandbox, failures: u32, code: i32) {
        let attempts = display(&sandbox.path("attempts"));
        let delivered = display(&sandbox.path("delivered"));
        sandbox.stub(
            "rsync",
            &format!(
                r#"last="${{@: -1}}"
if [[ "$last" == */termination/ ]]; then
  cp "$1" "{delivered}/"
  exit 0
fi
count=$(cat "{attempts}" 2>/dev/null || echo 0)
count=$((count + 1))
echo "$count" > "{attempts}"
if [ "$count" -le {failures} ]; then
  exit {code}
fi
exit 0"#
            ),
        );
    }

    /// `nc` that refuses the first `refusals` checks of the daemon port
    fn client_nc(sandbox: &Sandbox, refusals: u32) {
        let calls = display(&sandbox.path("nc-calls"));
        sandbox.stub(
            "nc",
            &format!(
                r#"count=$(cat "{calls}" 2>/dev/null || echo 0)
count=$((count + 1))
echo "$count" > "{calls}"
[ "$count" -gt {refusals} ]"#
            ),
        );
    }

    /// `sleep` that returns at once and records how long it was asked to wait
    fn recording_sleep(sandbox: &Sandbox) {
        let log = display(&sandbox.path("sleeps"));
        sandbox.stub("sleep", &format!(r#"echo "$1" >> "{log}""#));
    }

    fn client_script(sandbox: &Sandbox) -> String {
        let volumes = VolumeSet::singleton(claim("db")).unwrap();
        let volume = volumes.iter().next().unwrap();
        let options = vec!["--recursive".to_string()];
        let script = render_client_script(&ClientScriptFields {
            volume,
            options: &options,
            username: "root",
            host: "localhost",
            port: 6443,
        })
        .unwrap();

        script
            .replace(CLIENT_STAGING_DIR, &display(&sandbox.path("staging")))
            .replace(COMMUNICATION_DIR, &display(&sandbox.path("communication")))
    }

    fn server_script(sandbox: &Sandbox, volumes: &VolumeSet, deadline_secs: u32) -> String {
        render_server_script(volumes, 8873, deadline_secs)
            .unwrap()
            .replace(&termination_dir(), &display(&sandbox.path("termination")))
            .replace(RSYNCD_LOG_DIR, &display(&sandbox.path("log")))
    }

    /// `rsync` whose daemon logs one finished connection handler and exits
    fn daemon_rsync(sandbox: &Sandbox) {
        sandbox.stub("rsync", r#"echo "rsync[1]: _exit_cleanup(code=0)""#);
    }

    fn two_volumes() -> VolumeSet {
        VolumeSet::new(vec![claim("data-0"), claim("data-1")]).unwrap()
    }

    fn report(sandbox: &Sandbox, volumes: &VolumeSet, codes: &[&str]) {
        for (volume, code) in volumes.iter().zip(codes) {
            fs::write(
                sandbox.path("termination").join(sentinel_name(volume)),
                format!("{code}\n"),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_client_succeeds_after_retries() {
        let sandbox = Sandbox::new();
        client_rsync(&sandbox, 2, 23);
        client_nc(&sandbox, 3);
        recording_sleep(&sandbox);

        let output = sandbox.run(&client_script(&sandbox));

        assert_eq!(output.status.code(), Some(0));
        assert_eq!(sandbox.read("", "attempts").as_deref(), Some("3"));
        assert_eq!(sandbox.read("delivered", "data.done").as_deref(), Some("0"));
        assert!(sandbox.path("communication").join(CLIENT_DONE_FILE).exists());

        let sleeps = sandbox.read("", "sleeps").unwrap();
        let sleeps: Vec<&str> = sleeps.lines().collect();
        assert_eq!(sleeps, ["1", "1", "1", "2", "4"]);
    }

    #[test]
    fn test_client_reports_failure_after_last_attempt() {
        let sandbox = Sandbox::new();
        client_rsync(&sandbox, u32::MAX, 12);
        client_nc(&sandbox, 0);
        recording_sleep(&sandbox);

        let output = sandbox.run(&client_script(&sandbox));

        assert_eq!(output.status.code(), Some(12));
        assert_eq!(sandbox.read("", "attempts").as_deref(), Some("5"));
        assert_eq!(sandbox.read("delivered", "data.done").as_deref(), Some("12"));
        assert!(sandbox.path("communication").join(CLIENT_DONE_FILE).exists());

        let sleeps = sandbox.read("", "sleeps").unwrap();
        let sleeps: Vec<&str> = sleeps.lines().collect();
        assert_eq!(sleeps, ["2", "4", "8", "16"]);
    }

    #[test]
    fn test_client_signals_done_when_terminated() {
        let sandbox = Sandbox::new();
        client_rsync(&sandbox, 0, 0);
        // daemon never comes up; the real sleep keeps the script waiting
        sandbox.stub("nc", "exit 1");

        let mut child = sandbox
            .command(&client_script(&sandbox))
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(500));
        let killed = Command::new("kill")
            .arg("-TERM")
            .arg(child.id().to_string())
            .status()
            .unwrap();
        assert!(killed.success());

        let status = child.wait().unwrap();

        assert_eq!(status.code(), Some(143));
        assert!(sandbox.path("communication").join(CLIENT_DONE_FILE).exists());
        assert!(sandbox.read("delivered", "data.done").is_none());
    }

    #[test]
    fn test_server_exits_zero_when_every_volume_succeeded() {
        let sandbox = Sandbox::new();
        daemon_rsync(&sandbox);
        let volumes = two_volumes();
        report(&sandbox, &volumes, &["0", "0"]);

        let output = sandbox.run(&server_script(&sandbox, &volumes, 30));

        assert_eq!(output.status.code(), Some(0));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("all volumes synced"));
    }

    #[test]
    fn test_server_exits_nonzero_when_a_volume_failed() {
        let sandbox = Sandbox::new();
        daemon_rsync(&sandbox);
        let volumes = two_volumes();
        report(&sandbox, &volumes, &["0", "12"]);

        let output = sandbox.run(&server_script(&sandbox, &volumes, 30));

        assert_eq!(output.status.code(), Some(1));
        let stdout = String::from_utf8_lossy(&output.stdout);
        let failed = volumes.iter().nth(1).unwrap().label_safe_name().to_string();
        assert!(stdout.contains("sync failed for volumes:"));
        assert!(stdout.contains(&failed));
    }

    #[test]
    fn test_server_gives_up_on_missing_sentinel() {
        let sandbox = Sandbox::new();
        daemon_rsync(&sandbox);
        let volumes = two_volumes();
        report(&sandbox, &volumes, &["0"]);

        let start = Instant::now();
        let output = sandbox.run(&server_script(&sandbox, &volumes, 2));

        assert_eq!(output.status.code(), Some(1));
        assert!(start.elapsed() < Duration::from_secs(30));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("not every volume reported within 2s"));
    }
}
