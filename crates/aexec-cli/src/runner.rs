use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use aexec_common::Error;

use crate::cancel::CancelToken;

/// Re-export `ExecutionResult` from aexec-filter so callers can use
/// `crate::runner::ExecutionResult`.
pub type ExecutionResult = aexec_filter::ExecutionResult;

/// The command aexec runs when no template is configured.
///
/// `{file}` is replaced with the script path and `{username}` with the org
/// identity, both shell-escaped.
pub const DEFAULT_COMMAND_TEMPLATE: &str = "sfdx force:apex:execute -f {file} -u {username}";

/// Runs one shell command to completion and captures its output.
pub trait CommandRunner {
    /// Run `command`, blocking until it exits or `cancel` fires.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ExecutionResult::exit_code`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if the process cannot be spawned or
    /// waited on, and [`Error::Cancelled`] if `cancel` fired first.
    fn run(&self, command: &str, cancel: &CancelToken) -> Result<ExecutionResult, Error>;
}

/// Escape a string for safe inclusion in a shell command.
#[cfg(unix)]
pub(crate) fn shell_escape(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(not(unix))]
pub(crate) fn shell_escape(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\"\""))
}

/// Fill `{file}` and `{username}` into a command template.
#[allow(clippy::literal_string_with_formatting_args)]
pub fn render_command(template: &str, file: &Path, username: &str) -> String {
    template
        .replace("{file}", &shell_escape(&file.to_string_lossy()))
        .replace("{username}", &shell_escape(username))
}

/// Extract an exit code from a process status, mapping signals to 128+N on Unix.
fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| status.signal().map_or(1, |s| 128 + s))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

/// How long a cancelled process group gets between SIGTERM and SIGKILL.
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_millis(200);

/// The shell invocation for `command`.
///
/// On Unix the shell leads a new process group so that cancelling can reach
/// whatever it spawned (sfdx runs under node).
fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).process_group(0);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

/// Drain a pipe on its own thread so a chatty child never blocks on a full pipe.
fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>, stream: &str) -> Result<String, Error> {
    handle
        .join()
        .map_err(|_| Error::Execution(format!("{stream} reader thread panicked")))
}

/// Runs commands through the platform shell (`sh -c` / `cmd /C`).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    poll_interval: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `child` exits, killing it if `cancel` fires first.
    fn wait(&self, child: &mut Child, cancel: &CancelToken) -> Result<i32, Error> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(pid = child.id(), "cancelled, killing child process group");
                kill_tree(child);
                return Err(Error::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => return Ok(exit_code_from_status(status)),
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => return Err(Error::Execution(format!("failed to wait for child: {e}"))),
            }
        }
    }
}

/// Terminate `child` and everything in its process group, then reap it.
///
/// The group gets SIGTERM first and SIGKILL after [`KILL_GRACE`]. The child
/// is reaped last so its pid (the group id) cannot be reused in between.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Ok(raw) = i32::try_from(child.id()) {
            let group = Pid::from_raw(raw);
            let _ = killpg(group, Signal::SIGTERM);
            thread::sleep(KILL_GRACE);
            let _ = killpg(group, Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &str, cancel: &CancelToken) -> Result<ExecutionResult, Error> {
        (**self).run(command, cancel)
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, cancel: &CancelToken) -> Result<ExecutionResult, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(command, "spawning");

        let mut child = shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Execution(format!("failed to spawn `{command}`: {e}")))?;

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::Execution("stdout not captured".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::Execution("stderr not captured".to_string()))?;
        let stdout_thread = spawn_reader(stdout_pipe);
        let stderr_thread = spawn_reader(stderr_pipe);

        // On cancel the reader threads are detached: a grandchild may still
        // hold the pipes open.
        let exit_code = self.wait(&mut child, cancel)?;

        let result = ExecutionResult {
            stdout: join_reader(stdout_thread, "stdout")?,
            stderr: join_reader(stderr_thread, "stderr")?,
            exit_code,
        };
        tracing::debug!(
            exit_code,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "command finished"
        );
        Ok(result)
    }
}

/// Name of the program a command line starts with, if it can be determined.
fn program_name(command: &str) -> Option<&str> {
    command.split_whitespace().next().filter(|w| !w.contains('='))
}

/// Turn a finished-but-failed run into a readable [`Error::Execution`].
///
/// Includes the last few lines of stderr (or stdout, where sfdx reports
/// compile errors) and, on exit code 127, notes when the program is not on
/// `PATH`.
pub fn failure_error(command: &str, result: &ExecutionResult) -> Error {
    const TAIL_LINES: usize = 5;

    let mut msg = format!("command exited with code {}", result.exit_code);

    // 127 is the shell's "command not found"
    if result.exit_code == 127
        && let Some(program) = program_name(command)
        && which::which(program).is_err()
    {
        msg.push_str(&format!(" (`{program}` not found on PATH"));
        if program == "sfdx" {
            msg.push_str("; install the Salesforce CLI");
        }
        msg.push(')');
    }

    let source = if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    let lines: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
    if !lines.is_empty() {
        let tail = &lines[lines.len().saturating_sub(TAIL_LINES)..];
        msg.push_str(":\n");
        msg.push_str(&tail.join("\n"));
    }
    Error::Execution(msg)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::literal_string_with_formatting_args
)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn run(command: &str) -> Result<ExecutionResult, Error> {
        ShellRunner::new().run(command, &CancelToken::new())
    }

    fn result(stdout: &str, stderr: &str, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    // --- render_command ---

    #[cfg(unix)]
    #[test]
    fn default_template_renders_sfdx_call() {
        let cmd = render_command(
            DEFAULT_COMMAND_TEMPLATE,
            Path::new("/work/proj/anonymous/anon.apex"),
            "dev@example.com",
        );
        assert_eq!(
            cmd,
            "sfdx force:apex:execute -f '/work/proj/anonymous/anon.apex' -u 'dev@example.com'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn render_escapes_quotes_and_spaces() {
        let cmd = render_command(
            "echo {file} {username}",
            Path::new("/my proj/anon.apex"),
            "o'brien",
        );
        assert_eq!(cmd, r"echo '/my proj/anon.apex' 'o'\''brien'");
    }

    #[test]
    fn render_without_placeholders_is_unchanged() {
        assert_eq!(
            render_command("cat fixture.log", Path::new("/x"), "u"),
            "cat fixture.log"
        );
    }

    // --- ShellRunner ---

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_exit_code() {
        let r = run("printf 'a\\nb\\n'").unwrap();
        assert_eq!(r.stdout, "a\nb\n");
        assert_eq!(r.exit_code, 0);
        assert!(r.success());
        assert!(r.stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn captures_stderr_separately() {
        let r = run("echo out && echo err >&2").unwrap();
        assert_eq!(r.stdout.trim(), "out");
        assert_eq!(r.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported_not_raised() {
        let r = run("echo nope >&2; exit 3").unwrap();
        assert_eq!(r.exit_code, 3);
        assert!(!r.success());
    }

    #[cfg(unix)]
    #[test]
    fn rendered_command_with_spaces_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("my script.apex");
        std::fs::write(&file, "System.debug('hi');").unwrap();
        let cmd = render_command("cat {file}", &file, "u");
        assert_eq!(run(&cmd).unwrap().stdout, "System.debug('hi');");
    }

    #[cfg(unix)]
    #[test]
    fn large_output_does_not_deadlock() {
        let r = run("i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done").unwrap();
        assert_eq!(r.stdout.lines().count(), 20000);
    }

    #[cfg(unix)]
    #[test]
    fn signal_exit_code() {
        let r = run("kill -TERM $$").unwrap();
        assert_eq!(r.exit_code, 143);
    }

    #[test]
    fn pre_cancelled_token_never_spawns() {
        let token = CancelToken::new();
        token.cancel();
        let err = ShellRunner::new().run("echo hi", &token).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn cancel_kills_running_child() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            remote.cancel();
        });

        let start = Instant::now();
        let err = ShellRunner::new().run("sleep 10", &token).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    /// Whether `pid` has exited (gone, or a zombie awaiting its new parent).
    #[cfg(target_os = "linux")]
    fn process_gone(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(") ")
                .is_some_and(|(_, rest)| rest.starts_with('Z')),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn cancel_kills_grandchildren() {
        let tmp = tempfile::tempdir().unwrap();
        let pid_file = tmp.path().join("sleep.pid");
        let command = format!(
            "sleep 37 & echo $! > {}; wait",
            shell_escape(&pid_file.to_string_lossy())
        );

        let token = CancelToken::new();
        let remote = token.clone();
        let watched = pid_file.clone();
        let canceller = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if std::fs::read_to_string(&watched).is_ok_and(|s| s.ends_with('\n')) {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
            }
            remote.cancel();
        });

        let err = ShellRunner::new().run(&command, &token).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, Error::Cancelled));

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(process_gone(pid), "background `sleep 37` (pid {pid}) survived cancel");
    }

    // --- failure_error ---

    #[test]
    fn failure_error_uses_stderr_tail() {
        let stderr = "l1\nl2\nl3\nl4\nl5\nl6\nl7\n";
        let err = failure_error("sh -c whatever", &result("", stderr, 1));
        let msg = err.to_string();
        assert!(msg.contains("exited with code 1"), "got: {msg}");
        assert!(msg.contains("l3\nl4\nl5\nl6\nl7"), "got: {msg}");
        assert!(!msg.contains("l2"), "got: {msg}");
    }

    #[test]
    fn failure_error_falls_back_to_stdout() {
        let stdout = "Error: Compile error at line 1 column 1\nunexpected token";
        let err = failure_error("sh", &result(stdout, "  \n", 1));
        assert!(err.to_string().contains("unexpected token"));
    }

    #[test]
    fn failure_error_reports_missing_program() {
        let err = failure_error(
            "definitely-not-a-real-program-aexec -f x",
            &result("", "sh: not found", 127),
        );
        assert!(matches!(err, Error::Execution(_)));
        let msg = err.to_string();
        assert!(
            msg.contains("`definitely-not-a-real-program-aexec` not found on PATH"),
            "got: {msg}"
        );
        assert!(msg.contains("sh: not found"), "got: {msg}");
    }

    #[test]
    fn failure_error_skips_path_check_for_other_codes() {
        let err = failure_error("definitely-not-a-real-program-aexec", &result("", "bad", 1));
        assert!(!err.to_string().contains("PATH"));
    }

    #[test]
    fn program_name_skips_env_assignments() {
        assert_eq!(program_name("sfdx force:apex:execute"), Some("sfdx"));
        assert_eq!(program_name("FOO=1 sfdx"), None);
        assert_eq!(program_name("   "), None);
    }
}
