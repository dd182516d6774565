//! Runner for the external command-line tools behind every gateway
//! (`launchctl`, `systemctl`, `codesign`, `xcrun`, `ditto`, ...).

use std::process::Command;

use crate::error::ToolError;

/// Flags whose following argument is a secret and must not be echoed back.
const SECRET_FLAGS: &[&str] = &["--password", "-p"];

/// Captured output of a tool that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Trimmed stdout followed by trimmed stderr, skipping empty parts.
    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

/// Run `program` with `args` to completion.
///
/// A non-zero exit becomes [`ToolError::Failed`] carrying the tool's own
/// stdout/stderr verbatim.
pub fn run_tool<S: AsRef<str>>(program: &str, args: &[S]) -> Result<ToolOutput, ToolError> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    tracing::debug!("running {program} {}", redact(&args).join(" "));

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        return Ok(ToolOutput { stdout, stderr });
    }

    Err(ToolError::Failed {
        program: program.to_string(),
        args: redact(&args),
        status: output.status.code(),
        diagnostic: combine(&stdout, &stderr),
    })
}

/// Copy `args`, masking the value after any secret-bearing flag.
pub fn redact(args: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("******".to_string());
            mask_next = false;
            continue;
        }
        mask_next = SECRET_FLAGS.contains(arg);
        out.push((*arg).to_string());
    }
    out
}

fn combine(stdout: &str, stderr: &str) -> String {
    [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_masks_password_values() {
        let args = ["submit", "a.zip", "--password", "hunter2", "--team-id", "T1"];
        let redacted = redact(&args);
        assert_eq!(
            redacted,
            vec!["submit", "a.zip", "--password", "******", "--team-id", "T1"]
        );
    }

    #[test]
    fn combined_skips_empty_streams() {
        let out = ToolOutput {
            stdout: "  ok\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(out.combined(), "ok");

        let both = ToolOutput {
            stdout: "line one\n".to_string(),
            stderr: "warning: two\n".to_string(),
        };
        assert_eq!(both.combined(), "line one\nwarning: two");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_tool("bridge-definitely-not-a-real-tool", &["--version"]).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }), "got: {err}");
        assert!(err.to_string().contains("bridge-definitely-not-a-real-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_diagnostic_verbatim() {
        let err = run_tool("sh", &["-c", "echo out; echo 'bad thing' >&2; exit 3"]).unwrap_err();
        match err {
            ToolError::Failed {
                status, diagnostic, ..
            } => {
                assert_eq!(status, Some(3));
                assert_eq!(diagnostic, "out\nbad thing");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_captures_stdout() {
        let out = run_tool("sh", &["-c", "echo hello"]).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }
}
