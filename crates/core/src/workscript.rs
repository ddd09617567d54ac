//! Worker-script rendering.
//!
//! A project's template is a shell script with `{{NAME}}` placeholders. The
//! dispatcher substitutes the granted block range and prepends a bookkeeping
//! comment block so a script found on a worker node can be traced back to the
//! job that produced it.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::naming::{block_input, input_url, output_suffix};
use crate::slicing::BlockRange;
use crate::types::Timestamp;

/// Regex matching `{{PLACEHOLDER}}` tokens in worker-script templates.
pub const PLACEHOLDER_PATTERN: &str = r"\{\{([A-Z][A-Z0-9_]*)\}\}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

/// Everything needed to render one worker script.
#[derive(Debug, Clone)]
pub struct ScriptContext<'a> {
    pub project: &'a str,
    pub template_name: &'a str,
    pub cluster_id: i64,
    pub process_id: i64,
    pub restarts: i32,
    pub cpus: i32,
    pub started_at: Timestamp,
    pub raw_path: &'a str,
    /// Leading part of `raw_path` that `input_prefix` stands in for.
    pub storage_root: &'a str,
    pub input_prefix: &'a str,
    pub run: i32,
    pub seqno: i32,
    pub range: BlockRange,
}

impl ScriptContext<'_> {
    /// Space-separated list selecting every block of the range.
    pub fn input_files(&self) -> String {
        let url = input_url(self.raw_path, self.storage_root, self.input_prefix);
        self.range
            .blocks()
            .map(|b| block_input(&url, b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn value(&self, name: &str) -> Option<String> {
        let value = match name {
            "INPUT_FILES" => self.input_files(),
            "OUTPUT_SUFFIX" => output_suffix(self.run, self.seqno, self.range),
            "RAW_PATH" => self.raw_path.to_string(),
            "RAW_URL" => input_url(self.raw_path, self.storage_root, self.input_prefix),
            "RUN" => self.run.to_string(),
            "SEQNO" => self.seqno.to_string(),
            "BLOCK1" => self.range.block1.to_string(),
            "BLOCK2" => self.range.block2.to_string(),
            "CPUS" => self.cpus.to_string(),
            "PROJECT" => self.project.to_string(),
            "CLUSTER" => self.cluster_id.to_string(),
            "PROCESS" => self.process_id.to_string(),
            _ => return None,
        };
        Some(value)
    }

    fn header(&self) -> String {
        format!(
            "# project: {}\n\
             # cluster: {}\n\
             # process: {}\n\
             # restarts: {}\n\
             # cpus: {}\n\
             # template: {}\n\
             # started: {}\n",
            self.project,
            self.cluster_id,
            self.process_id,
            self.restarts,
            self.cpus,
            self.template_name,
            self.started_at.to_rfc3339(),
        )
    }
}

/// Substitute known placeholders; unknown ones are left as written.
pub fn substitute<'t>(template: &'t str, ctx: &ScriptContext<'_>) -> Cow<'t, str> {
    PLACEHOLDER_RE.replace_all(template, |caps: &Captures<'_>| {
        ctx.value(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
}

/// Render a complete worker script.
///
/// The bookkeeping header goes right after a `#!` line, or at the very top
/// when the template has none.
pub fn render(template: &str, ctx: &ScriptContext<'_>) -> String {
    let body = substitute(template, ctx);
    let header = ctx.header();

    if body.starts_with("#!") {
        let (shebang, rest) = match body.find('\n') {
            Some(i) => body.split_at(i + 1),
            None => (&*body, ""),
        };
        let mut out = String::with_capacity(body.len() + header.len() + 1);
        out.push_str(shebang);
        if !shebang.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&header);
        out.push_str(rest);
        out
    } else {
        format!("{header}{body}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ctx() -> ScriptContext<'static> {
        ScriptContext {
            project: "recon-2018-01",
            template_name: "recon.sh",
            cluster_id: 881,
            process_id: 4,
            restarts: 2,
            cpus: 3,
            started_at: chrono::Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap(),
            raw_path: "/dcache/raw/Run071000/hd_rawdata_071000_003.evio",
            storage_root: "/dcache",
            input_prefix: "root://xrd.example.org/pnfs",
            run: 71000,
            seqno: 3,
            range: BlockRange::new(6, 9).unwrap(),
        }
    }

    #[test]
    fn input_files_select_every_block_through_the_prefix() {
        let url = "root://xrd.example.org/pnfs/raw/Run071000/hd_rawdata_071000_003.evio";
        assert_eq!(
            ctx().input_files(),
            format!("{url}+6,7 {url}+7,8 {url}+8,9")
        );
    }

    #[test]
    fn input_files_keep_paths_outside_the_storage_root() {
        let mut ctx = ctx();
        ctx.raw_path = "/scratch/hd_rawdata_071000_003.evio";
        assert_eq!(
            substitute("{{INPUT_FILES}}", &ctx),
            "/scratch/hd_rawdata_071000_003.evio+6,7 \
             /scratch/hd_rawdata_071000_003.evio+7,8 \
             /scratch/hd_rawdata_071000_003.evio+8,9"
        );
    }

    #[test]
    fn substitutes_known_and_keeps_unknown_placeholders() {
        let out = substitute("hd_root -o hd_root_{{OUTPUT_SUFFIX}}.root {{NOPE}} -n {{CPUS}}", &ctx());
        assert_eq!(out, "hd_root -o hd_root_071000_003_00006-00009.root {{NOPE}} -n 3");
    }

    #[test]
    fn header_goes_after_shebang() {
        let script = render("#!/bin/bash\necho {{RUN}}\n", &ctx());
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "# project: recon-2018-01");
        assert!(lines.contains(&"# restarts: 2"));
        assert!(lines.contains(&"# template: recon.sh"));
        assert!(lines.contains(&"# started: 2026-10-19T08:30:00+00:00"));
        assert_eq!(*lines.last().unwrap(), "echo 71000");
    }

    #[test]
    fn header_goes_first_without_shebang() {
        let script = render("echo {{BLOCK1}}-{{BLOCK2}}", &ctx());
        assert!(script.starts_with("# project: recon-2018-01\n"));
        assert!(script.ends_with("echo 6-9"));
    }
}
