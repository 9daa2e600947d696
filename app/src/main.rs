use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use chrono::Local;
use clap::Parser;
use env_logger::Builder;
use glob::glob;
use log::LevelFilter;
use serde::Serialize;
use thiserror::Error;

use pcd_core::pointcloud::column::{Column, ColumnKind};
use pcd_stream::{stream_files, write_las, PointColumns, StreamBuilder, StreamError, StreamOutput};

#[derive(Parser, Debug)]
#[command(
    name = "Point Stream",
    about = "Filter, thin and materialize LAS/LAZ point clouds",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    #[arg(short, long, required = true, num_args = 1.., value_name = "FILE")]
    input: Vec<String>,

    /// Write the kept points to this LAS/LAZ file instead of materializing them
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Fields to materialize, e.g. "xyzic0" or "* -t"
    #[arg(short, long, default_value = "*")]
    select: String,

    /// Filter expression, e.g. "-keep_class 2 -drop_withheld"
    #[arg(short, long, default_value = "", allow_hyphen_values = true)]
    filter: String,

    /// Keep one point per voxel of this size
    #[arg(long, value_name = "SIZE")]
    voxel: Option<f64>,

    /// Use a dense voxel grid over the bounds of the input header
    #[arg(long, requires = "voxel")]
    static_grid: bool,

    /// Save the materialized columns as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write the materialized columns back to a LAS/LAZ file
    #[arg(long, value_name = "FILE")]
    write_back: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot serialize columns: {0}")]
    Json(#[from] serde_json::Error),
}

fn expand_globs(input_patterns: Vec<String>) -> Result<Vec<PathBuf>, CliError> {
    let mut paths = Vec::new();
    for pattern in input_patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => paths.push(path),
                    Err(e) => log::warn!("skipping unreadable path: {:?}", e),
                }
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }
    Ok(paths)
}

#[derive(Serialize)]
struct ColumnSummary<'a> {
    name: &'a str,
    kind: ColumnKind,
    constant: Option<f64>,
    missing: usize,
}

fn summarize(columns: &PointColumns) -> Vec<ColumnSummary<'_>> {
    columns
        .columns
        .iter()
        .map(|(name, column)| ColumnSummary {
            name,
            kind: column.kind(),
            constant: column.constant_f64(),
            missing: match column {
                Column::NullableInteger(v) => v.iter().filter(|v| v.is_none()).count(),
                Column::NullableDouble(v) => v.iter().filter(|v| v.is_none()).count(),
                _ => 0,
            },
        })
        .collect()
}

fn save_json(columns: &PointColumns, path: PathBuf) -> Result<(), CliError> {
    let file = File::create(&path).map_err(|source| CliError::Output {
        path: path.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, columns)?;
    writer
        .flush()
        .map_err(|source| CliError::Output { path, source })
}

fn run(args: Cli) -> Result<(), CliError> {
    let input_files = expand_globs(args.input)?;
    log::info!("expanded input files: {:?}", input_files);

    let mut builder = StreamBuilder::new()
        .inputs(input_files)
        .select(&args.select)
        .filter(&args.filter);
    if let Some(output) = &args.output {
        builder = builder.output(output);
    }
    if let Some(size) = args.voxel {
        builder = if args.static_grid {
            builder.static_voxel(size, None)
        } else {
            builder.voxel(size)
        };
    }
    let config = builder.build()?;

    let start = std::time::Instant::now();
    let output = stream_files(config)?;
    log::info!("finished streaming in {:?}", start.elapsed());

    match output {
        StreamOutput::Written(inventory) => {
            log::info!(
                "wrote {} points, by return: {:?}",
                inventory.number_of_points,
                inventory.number_of_points_by_return
            );
        }
        StreamOutput::Materialized(columns) => {
            log::info!("materialized {} points", columns.len());
            for summary in summarize(&columns) {
                log::info!("{}", serde_json::to_string(&summary)?);
            }
            if let Some(path) = args.json {
                save_json(&columns, path)?;
            }
            if let Some(path) = args.write_back {
                let written = write_las(&columns, &path)?;
                log::info!("wrote {} points back to {}", written, path.display());
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            if args.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        )
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
