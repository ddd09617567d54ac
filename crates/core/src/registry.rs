//! Static registry of per-slice output categories.
//!
//! Each worker leaves one file per category per slice. The binder merges all
//! slices of a raw file category by category, driven entirely by this table.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the slice's output suffix in source patterns.
const SUFFIX_PLACEHOLDER: &str = "{suffix}";

/// Placeholder replaced by the merged output path in tool arguments.
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// External merge tool invocation: `program args... inputs...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeTool {
    pub program: &'static str,
    /// Arguments placed before the inputs; `{output}` is substituted.
    pub args: &'static [&'static str],
}

/// ROOT histogram/tree merger.
pub const HADD: MergeTool = MergeTool {
    program: "hadd",
    args: &["-f", OUTPUT_PLACEHOLDER],
};

/// HDDM event-record concatenator.
pub const HDDM_MERGE: MergeTool = MergeTool {
    program: "hddm_merge_files",
    args: &["-o", OUTPUT_PLACEHOLDER],
};

/// EVIO event concatenator.
pub const EVIOCAT: MergeTool = MergeTool {
    program: "eviocat",
    args: &["-o", OUTPUT_PLACEHOLDER],
};

/// Plain byte concatenation, for worker logs.
pub const CONCAT: MergeTool = MergeTool {
    program: "sh",
    args: &["-c", "cat \"$@\" > \"$0\"", OUTPUT_PLACEHOLDER],
};

/// One output category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCategory {
    /// Category name, also the archive sub-directory.
    pub name: &'static str,
    /// Per-slice file name, with `{suffix}` standing for the output suffix.
    pub source_pattern: &'static str,
    /// Extension of the merged artifact.
    pub dest_ext: &'static str,
    /// Whether every slice must produce this file.
    pub required: bool,
    pub tool: MergeTool,
}

impl OutputCategory {
    /// Per-slice source file name for a given output suffix.
    pub fn source_name(&self, suffix: &str) -> String {
        self.source_pattern.replace(SUFFIX_PLACEHOLDER, suffix)
    }

    /// Build the merge command line for `inputs` into `output`.
    pub fn merge_command(&self, output: &Path, inputs: &[PathBuf]) -> (&'static str, Vec<OsString>) {
        let mut args: Vec<OsString> = self
            .tool
            .args
            .iter()
            .map(|a| {
                if *a == OUTPUT_PLACEHOLDER {
                    output.as_os_str().to_owned()
                } else {
                    OsString::from(*a)
                }
            })
            .collect();
        args.extend(inputs.iter().map(|p| p.as_os_str().to_owned()));
        (self.tool.program, args)
    }
}

/// Every category the binder reconciles, in merge order.
pub const CATEGORIES: &[OutputCategory] = &[
    OutputCategory {
        name: "hists",
        source_pattern: "hd_root_{suffix}.root",
        dest_ext: "root",
        required: true,
        tool: HADD,
    },
    OutputCategory {
        name: "rest",
        source_pattern: "dana_rest_{suffix}.hddm",
        dest_ext: "hddm",
        required: true,
        tool: HDDM_MERGE,
    },
    OutputCategory {
        name: "tree",
        source_pattern: "tree_{suffix}.root",
        dest_ext: "root",
        required: false,
        tool: HADD,
    },
    OutputCategory {
        name: "evio_skim",
        source_pattern: "skim_{suffix}.evio",
        dest_ext: "evio",
        required: false,
        tool: EVIOCAT,
    },
    OutputCategory {
        name: "converted_random",
        source_pattern: "converted_random_{suffix}.hddm",
        dest_ext: "hddm",
        required: false,
        tool: HDDM_MERGE,
    },
    // The workscript's own logs carry no suffix: a bundle holds one slice.
    OutputCategory {
        name: "job_info",
        source_pattern: "workscript.stdout",
        dest_ext: "out",
        required: true,
        tool: CONCAT,
    },
    OutputCategory {
        name: "job_info_err",
        source_pattern: "workscript.stderr",
        dest_ext: "err",
        required: false,
        tool: CONCAT,
    },
];

/// Look up a category by name.
pub fn find(name: &str) -> Option<&'static OutputCategory> {
    CATEGORIES.iter().find(|c| c.name == name)
}
