mod input;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use texscope_backend_core::{StorageMap, StorageRegistry};
use texscope_ir::{Graph, PlacementMap};
use texscope_opt::{AnnotateMemoryScope, Pass};

/// Texture memory-scope annotation for texscope graphs
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input graph (JSON)
    #[arg(required_unless_present = "list_analyses")]
    input: Option<PathBuf>,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dump the input graph to stderr before annotation
    #[arg(long)]
    emit_ir: bool,

    /// Run the analysis and print the scope map without rewriting
    #[arg(long)]
    dry_run: bool,

    /// Texture spatial limit applied to every target in the input
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u64).range(1..=i64::MAX as u64)
    )]
    texture_spatial_limit: Option<u64>,

    /// List registered storage analyses and exit
    #[arg(long)]
    list_analyses: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn builtin_registry() -> StorageRegistry {
    let mut registry = StorageRegistry::new();
    texscope_backend_adreno::register(&mut registry);
    registry
}

fn format_storage_map(map: &StorageMap) -> String {
    let mut out = String::new();
    for (handle, scopes) in map {
        let _ = writeln!(out, "{handle} = [{}]", scopes.join(", "));
    }
    out
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let registry = builtin_registry();

    if cli.list_analyses {
        for key in registry.list_keys() {
            println!("{key}");
        }
        return Ok(());
    }

    // 1. Read the graph file.
    let Some(path) = &cli.input else {
        return Err(miette::miette!("no input graph given"));
    };
    let source = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;

    // 2. Build the graph.
    let mut graph: Graph = input::load_graph(&source, cli.texture_spatial_limit)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to load {}", path.display()))?;

    // 3. Optionally dump the input to stderr.
    if cli.emit_ir {
        eprint!("{}", texscope_ir::dump_graph(&graph));
    }

    // 4. Dry-run: report the scope map only.
    let text = if cli.dry_run {
        let placements = PlacementMap::resolve(&graph);
        let map = texscope_opt::collect_storage_info(&graph, &placements, &registry)
            .into_diagnostic()
            .wrap_err("storage analysis failed")?;
        format_storage_map(&map)
    } else {
        // 5. Annotate.
        let pass = AnnotateMemoryScope::new(Arc::new(registry));
        let changed = pass
            .run(&mut graph)
            .into_diagnostic()
            .wrap_err_with(|| format!("{} failed", pass.name()))?;
        log::info!("{}: changed = {changed}", pass.name());
        texscope_ir::dump_graph(&graph)
    };

    // 6. Write output.
    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }

    Ok(())
}
