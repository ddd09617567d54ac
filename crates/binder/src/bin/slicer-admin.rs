//! Operator CLI: project registration, ingestion, recycling, progress and
//! raw-file inspection.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slicer_binder::partitioner::{ingest, Ingested};
use slicer_binder::recycle::recycle;
use slicer_core::evio::{self, Node};
use slicer_db::models::project::CreateProject;
use slicer_db::repositories::ProjectRepo;
use slicer_db::DbPool;

#[derive(Parser, Debug)]
#[command(
    name = "slicer-admin",
    about = "Operator tools for the block-slice dispatcher",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Register a processing project
    ProjectAdd {
        name: String,

        /// Network range workers must connect from, e.g. 10.1.0.0/16
        #[arg(long)]
        subnet: String,

        /// Worker-script template file
        #[arg(long)]
        template: PathBuf,

        /// Root directory merged artifacts are archived under
        #[arg(long)]
        archive_prefix: String,

        /// Leading part of raw-file paths replaced by --input-prefix in worker scripts
        #[arg(long, default_value = "")]
        storage_root: String,

        /// Prefix workers read raw files through, e.g. root://xrootd.example.org
        #[arg(long, default_value = "")]
        input_prefix: String,

        /// Blocks granted per worker core
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(i32).range(1..))]
        max_blocks_per_core: i32,
    },

    /// Register raw files and their initial slice
    Ingest {
        #[arg(long)]
        project: String,

        /// Run number, instead of deriving it from the file name
        #[arg(long, requires = "seqno")]
        run: Option<i32>,

        /// Sequence number, instead of deriving it from the file name
        #[arg(long, requires = "run")]
        seqno: Option<i32>,

        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Return the bad ranges of failed bindings in a run range to the pool
    Recycle {
        run_lo: i32,

        /// Last run (inclusive); defaults to RUN_LO
        run_hi: Option<i32>,
    },

    /// Show processing progress of a project
    Status {
        #[arg(long)]
        project: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Decode the structure tree of a raw file
    Scan {
        file: PathBuf,

        /// Hide structures nested deeper than this
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slicer_binder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Scan { file, max_depth } => scan(&file, max_depth),
        Cmd::ProjectAdd {
            name,
            subnet,
            template,
            archive_prefix,
            storage_root,
            input_prefix,
            max_blocks_per_core,
        } => {
            let pool = connect().await?;
            let template_name = template
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("template path has no file name")?;
            let body = tokio::fs::read_to_string(&template)
                .await
                .with_context(|| format!("reading {}", template.display()))?;
            let project = ProjectRepo::create(
                &pool,
                &CreateProject {
                    name,
                    allowed_subnet: subnet,
                    template_name,
                    template: body,
                    archive_prefix,
                    storage_root,
                    input_prefix,
                    max_blocks_per_core,
                },
            )
            .await
            .context("creating project")?;
            println!("project {} created with id {}", project.name, project.id);
            Ok(())
        }
        Cmd::Ingest {
            project,
            run,
            seqno,
            paths,
        } => {
            let pool = connect().await?;
            let run_seqno = run.zip(seqno);
            if run_seqno.is_some() && paths.len() > 1 {
                bail!("--run/--seqno apply to a single file");
            }
            let mut failures = 0;
            for path in &paths {
                match ingest(&pool, &project, path, run_seqno).await {
                    Ok(Ingested::Created(f)) => {
                        println!("created  {} run {} seqno {} blocks {}", f.path, f.run, f.seqno, f.nblocks)
                    }
                    Ok(Ingested::Verified(f)) => println!("verified {}", f.path),
                    Err(e) => {
                        eprintln!("error    {}: {e}", path.display());
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} of {} files failed", paths.len());
            }
            Ok(())
        }
        Cmd::Recycle { run_lo, run_hi } => {
            let run_hi = run_hi.unwrap_or(run_lo);
            if run_hi < run_lo {
                bail!("empty run range {run_lo}..={run_hi}");
            }
            let pool = connect().await?;
            let recycled = recycle(&pool, run_lo, run_hi).await?;
            for r in &recycled {
                let ranges: Vec<String> = r.ranges.iter().map(ToString::to_string).collect();
                println!(
                    "run {} seqno {}: released {} slices [{}]",
                    r.run,
                    r.seqno,
                    r.released,
                    ranges.join(" ")
                );
            }
            println!("{} bindings recycled", recycled.len());
            Ok(())
        }
        Cmd::Status { project, json } => {
            let pool = connect().await?;
            let Some(p) = ProjectRepo::find_by_name(&pool, &project).await? else {
                bail!("unknown project {project}");
            };
            let progress = ProjectRepo::progress(&pool, p.id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                println!("project: {}", p.name);
                println!("raw_files: {}", progress.raw_files);
                println!("slices: {}", progress.slices);
                println!("unassigned: {}", progress.unassigned);
                println!("running: {}", progress.running);
                println!("finished: {}", progress.finished);
                println!("bound_ok: {}", progress.bound_ok);
                println!("bound_failed: {}", progress.bound_failed);
                println!("binding: {}", progress.binding);
            }
            Ok(())
        }
    }
}

async fn connect() -> Result<DbPool> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = slicer_db::create_pool(&url)
        .await
        .context("connecting to database")?;
    slicer_db::run_migrations(&pool)
        .await
        .context("running migrations")?;
    Ok(pool)
}

fn scan(file: &Path, max_depth: Option<usize>) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let mut count = 0usize;
    for node in evio::nodes(&bytes) {
        let node = node.with_context(|| format!("decoding {}", file.display()))?;
        let depth = match &node {
            Node::Block(_) => 0,
            Node::Structure(s) => s.depth,
        };
        if max_depth.is_some_and(|max| depth > max) {
            continue;
        }
        println!("{node}");
        count += 1;
    }
    eprintln!("{count} nodes");
    Ok(())
}
