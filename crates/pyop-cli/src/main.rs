use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use pyop_core::DataType;
use pyop_plugin::{PluginCatalog, invoke_once};
use pyop_runtime::{RuntimeConfig, RuntimeLifecycle};

mod values;

use values::{TensorJson, parse_argument};

#[derive(Parser)]
#[command(name = "pyop", about = "PyOp: call embedded runtime functions as graph operators")]
struct Cli {
    /// Runtime settings file (defaults to $PYOP_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the kernel and schema descriptors the plugin registers, as JSON
    Catalog,
    /// Call a function once and print its result tensor as JSON
    Call {
        /// Module to import
        module: String,
        /// Function inside the module
        function: String,
        /// Arguments in order: a tensor JSON file, or a scalar such as `int64:10`
        args: Vec<String>,
        /// Element type the result is decoded as
        #[arg(long, default_value = "int32")]
        output_type: DataType,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::discover()?,
    };
    Ok(config)
}

fn catalog(config: RuntimeConfig) -> Result<()> {
    let lifecycle = RuntimeLifecycle::new(pyop_plugin::default_runtime(), config);
    let catalog = PluginCatalog::new(lifecycle);
    let kernels = catalog.kernels();
    let document = serde_json::json!({
        "kernels": kernels.kernels.iter().map(|k| &k.def).collect::<Vec<_>>(),
        "schemas": catalog.schemas(),
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn call(
    config: RuntimeConfig,
    module: &str,
    function: &str,
    args: &[String],
    output_type: DataType,
) -> Result<()> {
    let inputs = args
        .iter()
        .map(|arg| parse_argument(arg))
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(module, function, inputs = inputs.len(), "Calling function");

    let lifecycle = RuntimeLifecycle::new(pyop_plugin::default_runtime(), config);
    let result = invoke_once(&lifecycle, module, function, &inputs, output_type);
    if let Err(e) = lifecycle.shutdown() {
        tracing::warn!(error = %e, "Runtime shutdown failed");
    }
    let tensor = result.with_context(|| format!("{module}.{function} failed"))?;

    println!("{}", serde_json::to_string(&TensorJson::from_tensor(&tensor)?)?);
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON results.
    fmt()
        .with_env_filter(EnvFilter::from_env(pyop_plugin::LOG_ENV))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Catalog => catalog(config),
        Command::Call {
            module,
            function,
            args,
            output_type,
        } => call(config, &module, &function, &args, output_type),
    }
}
