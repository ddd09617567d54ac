//! Running external merge tools.
//!
//! Each category names a tool (`hadd`, `hddm_merge_files`, `eviocat`, `cat`) that
//! concatenates per-slice files into one artifact. A tool that fails usually
//! names the input it choked on; those names carry the slice's output suffix,
//! which is how a failure is traced back to block ranges.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use slicer_core::registry::OutputCategory;

use crate::error::BinderError;

/// Maximum stdout or stderr captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The tool failed; `diagnostics` is its captured stdout and stderr.
    Failed { exit_code: i32, diagnostics: String },
}

/// Produces one merged artifact per category.
#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(
        &self,
        category: &OutputCategory,
        output: &Path,
        inputs: &[PathBuf],
    ) -> Result<MergeOutcome, BinderError>;
}

/// Runs the category's external tool as a subprocess.
#[derive(Debug, Clone)]
pub struct ToolMerger {
    pub timeout: Duration,
}

#[async_trait]
impl Merger for ToolMerger {
    async fn merge(
        &self,
        category: &OutputCategory,
        output: &Path,
        inputs: &[PathBuf],
    ) -> Result<MergeOutcome, BinderError> {
        let (program, args) = category.merge_command(output, inputs);
        let mut cmd = Command::new(program);
        cmd.args(&args);
        if let Some(dir) = output.parent() {
            cmd.current_dir(dir);
        }
        run_tool(&mut cmd, self.timeout).await
    }
}

/// Spawn `cmd`, capture its output and enforce `timeout`.
///
/// A spawn failure (tool not installed) or a timeout is reported as a failed
/// merge rather than an error: either way the inputs were not merged.
pub async fn run_tool(cmd: &mut Command, timeout: Duration) -> Result<MergeOutcome, BinderError> {
    // `kill_on_drop(true)` kills the child if the timeout drops it.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(MergeOutcome::Failed {
                exit_code: -1,
                diagnostics: format!("failed to start merge tool: {e}"),
            })
        }
    };

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                exit_code = status.code(),
                "Merge tool exited"
            );
            if status.success() {
                return Ok(MergeOutcome::Merged);
            }
            let mut diagnostics = String::from_utf8_lossy(&stdout).into_owned();
            diagnostics.push_str(&String::from_utf8_lossy(&stderr));
            Ok(MergeOutcome::Failed {
                exit_code: status.code().unwrap_or(-1),
                diagnostics,
            })
        }
        Ok(Err(e)) => Err(BinderError::Io(e)),
        Err(_elapsed) => Ok(MergeOutcome::Failed {
            exit_code: -1,
            diagnostics: format!("merge tool timed out after {}s", timeout.as_secs()),
        }),
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;
    use slicer_core::registry::{MergeTool, CONCAT};

    use super::*;

    fn category(tool: MergeTool) -> OutputCategory {
        OutputCategory {
            name: "hists",
            source_pattern: "hd_root_{suffix}.root",
            dest_ext: "root",
            required: true,
            tool,
        }
    }

    #[tokio::test]
    async fn merges_inputs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, "first\n").unwrap();
        std::fs::write(&b, "second\n").unwrap();
        let out = dir.path().join("merged");

        let merger = ToolMerger {
            timeout: Duration::from_secs(10),
        };
        let outcome = merger.merge(&category(CONCAT), &out, &[a, b]).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Merged);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn failure_captures_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged");
        let missing = dir.path().join("6-10/hd_root_071000_003_00006-00010.root");

        let merger = ToolMerger {
            timeout: Duration::from_secs(10),
        };
        let outcome = merger.merge(&category(CONCAT), &out, &[missing]).await.unwrap();
        let diagnostics = assert_matches!(outcome, MergeOutcome::Failed { diagnostics, .. } => diagnostics);
        assert!(diagnostics.contains("071000_003_00006-00010"));
    }

    #[tokio::test]
    async fn missing_tool_is_a_failed_merge() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MergeTool {
            program: "definitely-not-a-merge-tool",
            args: &["{output}"],
        };
        let merger = ToolMerger {
            timeout: Duration::from_secs(10),
        };
        let outcome = merger
            .merge(&category(tool), &dir.path().join("m"), &[])
            .await
            .unwrap();
        assert_matches!(outcome, MergeOutcome::Failed { exit_code: -1, .. });
    }

    #[tokio::test]
    async fn timeout_is_a_failed_merge() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let outcome = run_tool(&mut cmd, Duration::from_millis(50)).await.unwrap();
        let diagnostics = assert_matches!(outcome, MergeOutcome::Failed { diagnostics, .. } => diagnostics);
        assert!(diagnostics.contains("timed out"));
    }
}
