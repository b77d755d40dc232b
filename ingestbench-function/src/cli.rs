use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use crate::config::Config;
use crate::handler::{self, Handler, RuntimeContext};
use crate::observability;

/// Object storage ingestion benchmark function.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Plan(PlanCommand),
    Version(VersionCommand),
}

/// run one invocation of the configured workload
///
/// Prints the invocation record as a JSON line to stdout. Logs are written to stderr.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// identifier grouping invocations of one experiment, generated if omitted
    #[argh(option)]
    run_id: Option<String>,
}

/// print the part layout of the configured batch workload as JSON
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "plan")]
struct PlanCommand {}

/// print the ingestbench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    if let Command::Plan(PlanCommand {}) = args.command {
        let plan = handler::plan(&config)?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand { run_id }) => {
                let handler = Handler::from_config(config, RuntimeContext::from_env()).await;
                let response = handler.invoke(run_id).await?;
                tracing::debug!(?response);
                Ok(())
            }
            Command::Plan(PlanCommand {}) | Command::Version(VersionCommand {}) => {
                unreachable!()
            }
        }
    })
}
