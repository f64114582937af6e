use anyhow::Context;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};

use lead_scout::config::{self, load_file_config, resolve_credentials, RunConfig};
use lead_scout::features::lead_sink::{recorded_post_ids, CsvLeadSink};
use lead_scout::features::operator::ConsoleOperatorGate;
use lead_scout::features::qualifier::LlmQualifier;
use lead_scout::features::session_store::{FileSessionStore, SessionStore};
use lead_scout::scraping::LinkedInDriver;
use lead_scout::{AgentController, RunOutcome, RunSummary};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

fn parse_config_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--config" {
            return args.next().map(PathBuf::from);
        } else if let Some(rest) = a.strip_prefix("--config=") {
            return Some(PathBuf::from(rest));
        }
    }
    None
}

fn print_summary(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("could not render run summary: {}", e),
    }
}

/// Ctrl-C asks the agent to stop at the next boundary; a second Ctrl-C exits.
fn install_stop_handler() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Ctrl-C received; finishing the current post then stopping (press again to force quit)");
        let _ = stop_tx.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("forced exit");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
    stop_rx
}

async fn run() -> anyhow::Result<i32> {
    let explicit = parse_config_from_args();
    let (file, source) = load_file_config(explicit.as_deref())?;
    match &source {
        Some(path) => info!("config: using {}", path.display()),
        None => info!("config: no {} found, using defaults", config::CONFIG_FILE_NAME),
    }

    let run_config = RunConfig::from_env(&file)?;
    let credentials = resolve_credentials(&file, config::env_var)?;

    // Inference endpoint must be up before a browser window appears.
    let qualifier = LlmQualifier::new(run_config.qualifier.clone())?;
    qualifier.probe().await.with_context(|| {
        format!(
            "inference endpoint {} is not reachable (is Ollama running?)",
            run_config.qualifier.base_url
        )
    })?;

    let mut store = FileSessionStore::open(&run_config.session_path)?;
    let before = store.len();
    let recorded = recorded_post_ids(&run_config.output_path)?;
    for id in &recorded {
        store.mark_seen(id)?;
    }
    if store.len() > before {
        info!(
            "session_store: merged {} post ids from existing lead file {}",
            store.len() - before,
            run_config.output_path.display()
        );
    }

    let sink = CsvLeadSink::open(&run_config.output_path)?;
    let driver = LinkedInDriver::launch(run_config.driver.clone())
        .await
        .context("could not start the browser")?;

    let controller = AgentController::new(
        run_config,
        credentials,
        Box::new(driver),
        Box::new(qualifier),
        Box::new(ConsoleOperatorGate),
        Box::new(store),
        Box::new(sink),
    )
    .with_recorded_leads(recorded.len())
    .with_stop_signal(install_stop_handler());

    match controller.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(match summary.outcome {
                RunOutcome::Interrupted => EXIT_INTERRUPTED,
                _ => EXIT_OK,
            })
        }
        Err(aborted) => {
            print_summary(&aborted.summary);
            error!("{:#}", anyhow::Error::new(aborted.error));
            Ok(EXIT_FAILURE)
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting lead-scout");

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}
