use clap::{Parser, Subcommand};
use engine::{AdapterKind, AdapterRegistry, EngineConfig, ExplainabilityAdapter};
use harness::{
    load_dataset, load_model, load_run_file, run_parallel, run_sequential, RunReport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Run fairness, explainability, robustness and privacy probes against a model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List adapters and the tests each one offers
    Adapters,
    /// Run a batch of tests described by a run file
    Run {
        /// Adapter to use (overrides the run file)
        #[arg(short, long)]
        adapter: Option<String>,
        /// Dataset JSON (columns, rows, optional categories)
        #[arg(short, long)]
        dataset: PathBuf,
        /// Model description JSON
        #[arg(short, long)]
        model: PathBuf,
        /// Run file TOML ([engine] plus [[tests]])
        #[arg(short, long)]
        run: PathBuf,
        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Execute tests concurrently on the blocking pool
        #[arg(long)]
        parallel: bool,
        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match execute(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            eprintln!("❌ {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns the overall verdict of the command.
async fn execute(command: Commands) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Adapters => {
            list_adapters();
            Ok(true)
        }
        Commands::Run {
            adapter,
            dataset,
            model,
            run,
            output,
            parallel,
            json,
            verbose,
        } => {
            let run_file = load_run_file(&run)?;
            let kind = run_file.resolve_adapter(adapter.as_deref())?;
            let mut engine_config = run_file.engine.clone();
            engine_config.verbose_logging |= verbose;

            let data = load_dataset(&dataset)?;
            let model_spec = load_model(&model)?;
            let predictor = model_spec.build(&data)?;
            let model_name = predictor.model_name().to_string();
            info!(adapter = %kind, model = %model_name, "Starting run");

            let results = if parallel {
                run_parallel(
                    kind,
                    engine_config,
                    Arc::from(predictor),
                    Arc::new(data),
                    run_file.tests,
                )
                .await
            } else {
                run_sequential(kind, &engine_config, predictor.as_ref(), &data, &run_file.tests)
            };

            let report = RunReport::new(kind, model_name, results);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_table());
            }
            if let Some(path) = output {
                report.write_json(&path)?;
                println!("✓ Report written to {}", path.display());
            }
            Ok(report.passed())
        }
    }
}

fn list_adapters() {
    let registry = AdapterRegistry::with_defaults(&EngineConfig::default());
    println!("Available adapters:");
    for kind in registry.list_adapters() {
        let Some(adapter) = registry.get_adapter(kind) else {
            continue;
        };
        let model_types: Vec<String> = adapter
            .supported_model_types()
            .iter()
            .map(|t| t.to_string())
            .collect();
        println!("  {} [{}]", kind, model_types.join(", "));
        for test in adapter.get_available_tests() {
            println!("    - {}", test);
        }
        if kind == AdapterKind::Explainability {
            let backends = ExplainabilityAdapter::new(EngineConfig::default())
                .backends()
                .names();
            if backends.is_empty() {
                println!("    (no explanation backends compiled in)");
            } else {
                println!("    backends: {}", backends.join(", "));
            }
        }
    }
}
