//! Webhook catcher command sink.
//!
//! Implements [`dispatch::NotificationSink`] by starting the configured
//! program once per notification and writing the payload to its stdin.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process launch and pipe handling live here. The
//! [`dispatch`] crate sees only [`dispatch::NotificationSink`].
//!
//! ## Process contract
//!
//! - The program is started with no arguments.
//! - stdin carries the payload and nothing else, then reaches end-of-file.
//! - stdout and stderr are inherited from the service.
//! - The service never waits for the process and never reads its exit status.
//!   Concurrent notifications run as concurrent, unrelated processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use dispatch::{DispatchError, Notification, NotificationSink};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Pipes every notification to a fresh instance of one program.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: PathBuf,
}

impl CommandSink {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl NotificationSink for CommandSink {
    fn describe(&self) -> String {
        format!("command {}", self.program.display())
    }

    async fn deliver(&self, notification: Notification) -> Result<(), DispatchError> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), command = %self.program.display(), "started command");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DispatchError::StdinUnavailable {
                command: self.program.clone(),
            })?;

        stdin
            .write_all(&notification.payload)
            .await
            .map_err(|source| DispatchError::StdinWrite {
                command: self.program.clone(),
                source,
            })?;

        // Closing the pipe is the end-of-input signal.
        drop(stdin);

        info!(
            peer = %notification.peer,
            command = %self.program.display(),
            bytes = notification.payload.len(),
            "got webhook notification; sent to command"
        );
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::net::IpAddr;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use dispatch::DeliveryId;
    use tempfile::TempDir;

    use super::*;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn notification(payload: impl Into<Vec<u8>>) -> Notification {
        Notification::new(DeliveryId::new_random(), IpAddr::from([127, 0, 0, 1]), payload.into())
    }

    async fn wait_for_file(path: &Path, expected: &[u8]) -> Vec<u8> {
        let mut last = Vec::new();
        for _ in 0..100 {
            if let Ok(contents) = fs::read(path) {
                if contents == expected {
                    return contents;
                }
                last = contents;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        last
    }

    #[tokio::test]
    async fn payload_reaches_command_stdin() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("received");
        let script = write_script(dir.path(), "capture.sh", &format!("cat > '{}'", out.display()));

        let sink = CommandSink::new(&script);
        sink.deliver(notification(&br#"{"a":1}"#[..])).await.unwrap();

        assert_eq!(wait_for_file(&out, br#"{"a":1}"#).await, br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn each_notification_starts_a_new_process() {
        let dir = TempDir::new().unwrap();
        let outputs = dir.path().join("outputs");
        fs::create_dir(&outputs).unwrap();
        let script = write_script(
            dir.path(),
            "per-pid.sh",
            &format!("cat > '{}/'$$", outputs.display()),
        );

        let sink = CommandSink::new(&script);
        for i in 0..3 {
            sink.deliver(notification(format!("payload {i}").into_bytes()))
                .await
                .unwrap();
        }

        let mut count = 0;
        for _ in 0..100 {
            count = fs::read_dir(&outputs).unwrap().count();
            if count == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let sink = CommandSink::new(dir.path().join("does-not-exist"));

        let err = sink.deliver(notification(&b"{}"[..])).await.unwrap_err();
        assert!(matches!(err, DispatchError::Spawn { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn non_executable_program_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, "not a program").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let err = CommandSink::new(&path)
            .deliver(notification(&b"{}"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Spawn { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn command_that_ignores_stdin_is_a_write_error() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "quit.sh", "exit 0");

        // Larger than any pipe buffer, so the write cannot complete before exit.
        let payload = vec![b'x'; 4 * 1024 * 1024];
        let err = CommandSink::new(&script)
            .deliver(notification(payload))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::StdinWrite { .. }), "got {err:?}");
    }

    #[test]
    fn describe_names_the_program() {
        assert_eq!(CommandSink::new("/bin/cat").describe(), "command /bin/cat");
        assert_eq!(CommandSink::new("/bin/cat").program(), Path::new("/bin/cat"));
    }
}
