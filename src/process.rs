//! External-process wrapper.
//!
//! Every compression tool (gzip/pigz, bzip2/pbzip2, xz/pixz, zstd/pzstd) is
//! invoked as an opaque child process with an explicit argument vector,
//! never through a shell. Probe results are cached for the life of the
//! process so repeated calls across many files spawn each tool at most
//! once.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};

static PROBE_CACHE: OnceLock<Mutex<HashMap<String, bool>>> = OnceLock::new();

fn probe_cache() -> &'static Mutex<HashMap<String, bool>> {
    PROBE_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

#[derive(Debug, thiserror::Error)]
#[error("tool '{tool}' failed (exit {exit_code:?})")]
pub struct ToolFailure {
    pub tool: String,
    pub exit_code: Option<i32>,
}

/// Check whether `tool` is runnable, trying `--version` and then `--help`.
///
/// The result is cached process-wide: a tool probed twice in one run of
/// `recover` only spawns a child process on the first call.
pub fn probe(tool: &str) -> bool {
    let mut cache = probe_cache().lock().unwrap();
    if let Some(&found) = cache.get(tool) {
        return found;
    }
    let found = try_spawn(tool, &["--version"]) || try_spawn(tool, &["--help"]);
    cache.insert(tool.to_string(), found);
    found
}

fn try_spawn(tool: &str, args: &[&str]) -> bool {
    Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Run `tool` with `args`, feeding `stdin` if present, and return stdout.
///
/// Spawns with an explicit argument vector and never a shell. A non-zero
/// exit code yields [`ToolFailure`], which callers treat as non-fatal: the
/// candidate in question is simply skipped.
pub fn invoke(tool: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>, ToolFailure> {
    let mut command = Command::new(tool);
    command.args(args).stdout(Stdio::piped()).stderr(Stdio::null());
    command.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });

    let mut child = command.spawn().map_err(|_| ToolFailure {
        tool: tool.to_string(),
        exit_code: None,
    })?;

    if let Some(data) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let _ = pipe.write_all(data);
        }
    }

    let output = child.wait_with_output().map_err(|_| ToolFailure {
        tool: tool.to_string(),
        exit_code: None,
    })?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(ToolFailure {
            tool: tool.to_string(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_finds_a_tool_that_exists() {
        assert!(probe("true") || probe("echo"));
    }

    #[test]
    fn probe_rejects_a_tool_that_does_not_exist() {
        assert!(!probe("definitely-not-a-real-tool-binary-xyz"));
    }

    #[test]
    fn invoke_returns_stdout_on_success() {
        let out = invoke("printf", &["hello"], None).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn invoke_feeds_stdin_through_cat() {
        let out = invoke("cat", &[], Some(b"piped data")).unwrap();
        assert_eq!(out, b"piped data");
    }

    #[test]
    fn invoke_reports_failure_on_nonzero_exit() {
        let err = invoke("sh", &["-c", "exit 3"], None).unwrap_err();
        assert_eq!(err.exit_code, Some(3));
    }

    #[test]
    fn invoke_reports_failure_when_tool_is_missing() {
        let err = invoke("definitely-not-a-real-tool-binary-xyz", &[], None).unwrap_err();
        assert_eq!(err.exit_code, None);
    }
}
