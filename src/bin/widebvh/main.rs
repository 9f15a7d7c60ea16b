//! widebvh CLI - build and inspect wide BVH caches.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use widebvh::cache::{bvh_path, Stamp, STAMP_FILE};
use widebvh::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_DATE: &str = env!("WIDEBVH_BUILD_DATE");

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level: Option<&str> = None;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = Some("debug"),
            "-vv" | "--trace" => level = Some("trace"),
            "-q" | "--quiet" => level = Some("error"),
            _ => filtered_args.push(arg),
        }
    }

    #[allow(clippy::let_unit_value)]
    let _guard = init_tracing(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "build" | "b" => cmd_build(&filtered_args[1..]),
        "info" | "i" => cmd_info(&filtered_args[1..]),
        "check" | "c" => cmd_check(&filtered_args[1..]),
        "targets" | "t" => {
            cmd_targets();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("widebvh {} ({})", VERSION, BUILD_DATE);
            Ok(())
        }
        "help" | "h" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Verbosity flags win over `RUST_LOG`.
fn log_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Console logging, plus `trace.json` when `WIDEBVH_TRACE=1`.
#[cfg(feature = "chrome-trace")]
fn init_tracing(level: Option<&str>) -> Option<tracing_chrome::FlushGuard> {
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if env::var("WIDEBVH_TRACE").ok().as_deref() != Some("1") {
        tracing_subscriber::registry().with(log_filter(level)).with(fmt).init();
        return None;
    }

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file("trace.json")
        .build();
    tracing_subscriber::registry()
        .with(log_filter(level))
        .with(fmt)
        .with(chrome_layer)
        .init();
    Some(guard)
}

/// Console logging.
#[cfg(not(feature = "chrome-trace"))]
fn init_tracing(level: Option<&str>) {
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry().with(log_filter(level)).with(fmt).init();
}

/// Next argument as the value of `flag`.
fn value<'a>(args: &mut std::slice::Iter<'_, &'a str>, flag: &str) -> Result<&'a str> {
    args.next()
        .copied()
        .with_context(|| format!("missing value for {}", flag))
}

fn cmd_build(args: &[&str]) -> Result<()> {
    let mut input: Option<&str> = None;
    let mut target: Option<Target> = None;
    let mut output = PathBuf::from("data");
    let mut config_path: Option<PathBuf> = None;
    let mut force = false;
    let mut mesh_buffers = false;
    let mut padding: Option<bool> = None;

    let mut it = args.iter();
    while let Some(&arg) = it.next() {
        match arg {
            "-t" | "--target" => target = Some(value(&mut it, arg)?.parse()?),
            "-o" | "--output" => output = PathBuf::from(value(&mut it, arg)?),
            "-c" | "--config" => config_path = Some(PathBuf::from(value(&mut it, arg)?)),
            "-f" | "--force" => force = true,
            "-m" | "--mesh-buffers" => mesh_buffers = true,
            "--pad" => padding = Some(true),
            "--no-pad" => padding = Some(false),
            s if s.starts_with('-') => bail!("unknown option '{}'", s),
            s if input.is_none() => input = Some(s),
            s => bail!("unexpected argument '{}'", s),
        }
    }

    let input = input.context("missing mesh argument\nUsage: widebvh build <mesh.json> [options]")?;
    let target = target.unwrap_or_else(Target::detect);
    let config = match &config_path {
        Some(path) => BuildConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => BuildConfig::default(),
    };

    let mesh = MeshSoup::load(input)
        .and_then(MeshSoup::into_mesh)
        .with_context(|| format!("reading mesh '{}'", input))?;

    let mut options = ConvertOptions::new(&output, target, input);
    options.force = force;
    options.mesh_buffers = mesh_buffers;
    if let Some(pad) = padding {
        options.padding = pad;
    }

    match build_cache(&mesh, &options, &config).with_context(|| format!("converting '{}'", input))? {
        BuildOutcome::Built(stats) => {
            println!("Built {} for {} in {}", target.width(), target, output.display());
            println!("  Triangles:  {}", stats.primitives);
            println!("  References: {}", stats.references);
            println!("  Nodes:      {}", stats.nodes);
            println!("  Leaves:     {}", stats.leaves);
            println!("  Splits:     {} object, {} spatial, {} median", stats.object_splits, stats.spatial_splits, stats.median_splits);
            println!("  Max depth:  {}", stats.max_depth);
            println!("  Max leaf:   {}", stats.max_leaf_size);
        }
        BuildOutcome::Reused => {
            println!("{} is up to date for {}", bvh_path(&output).display(), target);
        }
    }
    Ok(())
}

fn single_path<'a>(args: &[&'a str], usage: &str) -> Result<&'a str> {
    match args.iter().copied().find(|a| !a.starts_with('-')) {
        Some(path) => Ok(path),
        None => bail!("missing file argument\nUsage: {}", usage),
    }
}

fn cmd_info(args: &[&str]) -> Result<()> {
    let path = single_path(args, "widebvh info <bvh.bin>")?;
    let size = std::fs::metadata(path).with_context(|| format!("reading '{}'", path))?.len();
    let report = inspect_cache(path, None).with_context(|| format!("reading '{}'", path))?;

    println!("File:    {}", path);
    println!("Size:    {} bytes", size);
    println!("Layout:  {}", report.width);
    if let Some(stamp) = read_stamp_next_to(path) {
        println!("Stamp:   {} '{}'", stamp.target, stamp.name);
    }
    println!("Records: {}", report.records.len());
    for (i, r) in report.records.iter().enumerate() {
        println!(
            "  [{}] {} nodes, {} leaves, {} bundles, {} tris, depth {}",
            i, r.nodes, r.leaves, r.bundles, r.references, r.depth
        );
    }
    Ok(())
}

fn read_stamp_next_to(path: &str) -> Option<Stamp> {
    let dir = Path::new(path).parent()?;
    Stamp::read(dir.join(STAMP_FILE)).ok().flatten()
}

fn cmd_check(args: &[&str]) -> Result<()> {
    let mut target: Option<Target> = None;
    let mut rest: Vec<&str> = Vec::new();
    let mut it = args.iter();
    while let Some(&arg) = it.next() {
        match arg {
            "-t" | "--target" => target = Some(value(&mut it, arg)?.parse()?),
            s => rest.push(s),
        }
    }
    let path = single_path(&rest, "widebvh check <bvh.bin> [-t target]")?;

    let report = inspect_cache(path, target.map(Target::width)).with_context(|| format!("checking '{}'", path))?;
    let tris: usize = report.records.iter().map(|r| r.references).sum();
    println!("OK: {} record(s) of {}, {} triangle reference(s)", report.records.len(), report.width, tris);
    Ok(())
}

fn cmd_targets() {
    let host = Target::detect();
    println!("{:<4} {:<20} {:<10}", "ID", "TARGET", "LAYOUT");
    for t in Target::ALL {
        let marker = if t == host { " (host)" } else { "" };
        println!("{:<4} {:<20} {:<10}{}", t.id(), t.name(), t.width().to_string(), marker);
    }
}

fn print_help() {
    println!(
        r#"widebvh {} - wide BVH builder

USAGE:
    widebvh [-v|-vv|-q] <command> [args]

COMMANDS:
    build, b <mesh.json>   Build the BVH cache for a mesh
        -t, --target <t>       Target (default: detected host CPU)
        -o, --output <dir>     Output directory (default: data)
        -c, --config <file>    Builder settings (JSON)
        -f, --force            Rebuild even if the stamp matches
        -m, --mesh-buffers     Also write vertices.bin, indices.bin, ...
        --pad / --no-pad       Pad mesh buffer elements to 16 bytes
                               (default: on for GPU targets)
    info, i <bvh.bin>      Show layout and records of a cache file
    check, c <bvh.bin>     Validate a cache file
        -t, --target <t>       Expected target layout
    targets, t             List targets and their layouts
    version                Show version
    help, h                Show this help

GLOBAL FLAGS:
    -v, --verbose          Debug output
    -vv, --trace           Trace output
    -q, --quiet            Errors only

ENVIRONMENT:
    RUST_LOG               Log filter when no verbosity flag is given
    WIDEBVH_TRACE=1        Write trace.json (chrome-trace feature)"#,
        VERSION
    );
}
