use std::path::PathBuf;
use std::time::Duration;

/// Binder configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Directory workers leave their output bundles in.
    pub staging_dir: PathBuf,
    /// Root under which each claimed file gets its own scratch directory.
    pub scratch_dir: PathBuf,
    /// Delay between polls when no file is ready.
    pub poll_interval: Duration,
    /// Attempts made per fetch or upload before giving up.
    pub transfer_attempts: u32,
    /// Wall-clock limit for a single merge-tool run.
    pub merge_timeout: Duration,
}

impl BinderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default               |
    /// |-----------------------------|-----------------------|
    /// | `SLICER_STAGING_DIR`        | `/srv/slicer/staging` |
    /// | `SLICER_SCRATCH_DIR`        | `/tmp/slicer-scratch` |
    /// | `BINDER_POLL_SECS`          | `60`                  |
    /// | `BINDER_TRANSFER_ATTEMPTS`  | `3`                   |
    /// | `BINDER_MERGE_TIMEOUT_SECS` | `3600`                |
    pub fn from_env() -> Self {
        let staging_dir = std::env::var("SLICER_STAGING_DIR")
            .unwrap_or_else(|_| "/srv/slicer/staging".into())
            .into();

        let scratch_dir = std::env::var("SLICER_SCRATCH_DIR")
            .unwrap_or_else(|_| "/tmp/slicer-scratch".into())
            .into();

        let poll_secs: u64 = std::env::var("BINDER_POLL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("BINDER_POLL_SECS must be a valid u64");

        let transfer_attempts: u32 = std::env::var("BINDER_TRANSFER_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("BINDER_TRANSFER_ATTEMPTS must be a valid u32");

        let merge_timeout_secs: u64 = std::env::var("BINDER_MERGE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("BINDER_MERGE_TIMEOUT_SECS must be a valid u64");

        Self {
            staging_dir,
            scratch_dir,
            poll_interval: Duration::from_secs(poll_secs),
            transfer_attempts: transfer_attempts.max(1),
            merge_timeout: Duration::from_secs(merge_timeout_secs),
        }
    }
}
