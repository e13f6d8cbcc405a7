//! medshare CLI
//!
//! ```text
//! medshare chat [--file patient.txt] [--session <id>]
//! medshare verify-consent --patient 0x.. --receiver 0x.. --receiver-role hospital ...
//! medshare eval --suite consent --input cases.csv --output results.csv --providers openai,qwen
//! medshare sessions list | delete <id>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use medshare::agent::{AgentContext, DriverConfig, Orchestrator, RunDriver, Session, SessionStore};
use medshare::assistant::{
    AssistantsClient, HttpFetcher, ResponsesSearch, RunService, SourceLibrary, VectorStoreLibrary,
};
use medshare::config::AppConfig;
use medshare::eval::{self, Evaluator, Suite};
use medshare::ledger::policy::{ConsentEvaluator, ConsentRequest, ConsentSnapshot};
use medshare::ledger::{parse_address, ConfirmationPolicy, EthLedger, Ledger};
use medshare::progress;
use medshare::sharing::{AesKey, ContentStore, PinataClient};
use medshare::tracing::{init_tracing, shutdown_tracing};
use medshare::vocab::{ConsentRequirement, Purpose, ReceiverRole};

/// Multi-agent assistant for compliant cross-border patient data sharing
#[derive(Parser, Debug)]
#[command(name = "medshare", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to ~/.medshare/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Talk to the orchestrator
    Chat {
        /// Patient data file to share
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Resume a saved session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Evaluate consent for a transfer directly against the ledger
    VerifyConsent {
        #[arg(long)]
        patient: String,
        #[arg(long)]
        receiver: String,
        /// hospital, research lab or insurance company
        #[arg(long)]
        receiver_role: String,
        #[arg(long)]
        receiver_country: String,
        #[arg(long)]
        sender_country: String,
        #[arg(long)]
        purpose: String,
        /// None, Broad, Specific or Explicit
        #[arg(long, default_value = "Broad")]
        requirement: String,
        /// Require an approving consent from the sender country's government
        #[arg(long)]
        government_required: bool,
    },

    /// Compare LLM providers on an evaluation suite
    Eval {
        /// consent, extraction, regulation, filtering or system-level
        #[arg(long)]
        suite: Suite,
        /// Input CSV
        #[arg(short, long)]
        input: PathBuf,
        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
        /// Comma-separated providers (openai, anthropic, gemini, deepseek, mistral, qwen)
        #[arg(long, value_delimiter = ',', default_value = "openai")]
        providers: Vec<String>,
    },

    /// Manage saved chat sessions
    Sessions {
        #[command(subcommand)]
        cmd: SessionsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List saved sessions, newest first
    List,
    /// Delete a saved session
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    init_tracing(&config.telemetry).map_err(|e| anyhow!("failed to initialize tracing: {}", e))?;

    let result = match cli.command {
        Commands::Chat { file, session } => chat(&config, file, session).await,
        Commands::VerifyConsent {
            patient,
            receiver,
            receiver_role,
            receiver_country,
            sender_country,
            purpose,
            requirement,
            government_required,
        } => {
            let request = ConsentRequest {
                patient: parse_address(&patient)?,
                receiver: parse_address(&receiver)?,
                receiver_role: ReceiverRole::from_label(&receiver_role)
                    .ok_or_else(|| anyhow!("unknown receiver role {:?}", receiver_role))?,
                receiver_country,
                sender_country,
                purpose: Purpose::from_label(&purpose)
                    .ok_or_else(|| anyhow!("unknown purpose {:?}", purpose))?,
                requirement: ConsentRequirement::from_label(&requirement)
                    .ok_or_else(|| anyhow!("unknown consent requirement {:?}", requirement))?,
                government_required,
            };
            verify_consent(&config, &request).await
        }
        Commands::Eval {
            suite,
            input,
            output,
            providers,
        } => run_eval(&config, suite, &input, &output, &providers).await,
        Commands::Sessions { cmd } => manage_sessions(&config, cmd),
    };

    if cli.metrics {
        println!("{}", medshare::metrics::render());
    }
    shutdown_tracing();
    result
}

async fn chat(config: &AppConfig, file: Option<PathBuf>, resume: Option<String>) -> Result<()> {
    config.validate_for_chat()?;

    let assistants = AssistantsClient::new(&config.openai.base_url, &config.openai.api_key);
    let runs: Arc<dyn RunService> = Arc::new(assistants.clone());
    let ledger: Arc<dyn Ledger> = Arc::new(EthLedger::connect(&config.ledger)?);

    let store: Option<Arc<dyn ContentStore>> = match PinataClient::new(&config.storage) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn ContentStore>),
        Err(e) => {
            warn!(error = %e, "Content storage unavailable; data sharing is disabled");
            None
        }
    };
    let aes_key = if config.sharing.aes_key.is_empty() {
        warn!("sharing.aes_key is not set; data sharing is disabled");
        None
    } else {
        Some(AesKey::from_base64(&config.sharing.aes_key).context("invalid sharing.aes_key")?)
    };
    let library: Option<Arc<dyn SourceLibrary>> = if config.assistants.vector_store.is_empty() {
        None
    } else {
        let library = VectorStoreLibrary::new(assistants, &config.assistants.vector_store);
        Some(Arc::new(library) as Arc<dyn SourceLibrary>)
    };

    let ctx = Arc::new(AgentContext {
        assistants: config.assistants.clone(),
        driver: RunDriver::new(
            runs.clone(),
            progress::sink_for(&config.telemetry),
            DriverConfig::from(&config.driver),
        ),
        search: Arc::new(ResponsesSearch::new(
            &config.openai.base_url,
            &config.openai.api_key,
            &config.openai.search_model,
        )),
        ledger,
        store,
        library,
        fetcher: Arc::new(HttpFetcher::new()),
        aes_key,
        confirmation: ConfirmationPolicy::from(&config.ledger),
        output_path: config.sharing.output_path.clone(),
    });
    let orchestrator = Orchestrator::new(ctx);

    let sessions = SessionStore::new(config.sessions_dir())?;
    let mut session = match resume {
        Some(id) => {
            let mut session = sessions
                .load(&id)
                .with_context(|| format!("failed to load session {}", id))?;
            if let Some(path) = file {
                session.attach_file(path);
            }
            println!("[MEDSHARE] Resumed session {} ({} turns)", session.id, session.turns.len());
            session
        }
        None => {
            let session = Session::start(runs.as_ref(), file).await?;
            println!("[MEDSHARE] Started session {}", session.id);
            session
        }
    };
    sessions.save(&session)?;

    println!("[MEDSHARE] Type your request, or 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        match orchestrator.turn(&mut session, input).await {
            Ok(reply) => println!("\n{}\n", reply),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Turn failed");
                println!("[MEDSHARE] ❌ {}", e);
            }
        }
        sessions.save(&session)?;
    }

    info!(session_id = %session.id, turns = session.turns.len(), "Chat ended");
    println!("[MEDSHARE] Session saved: {}", session.id);
    Ok(())
}

async fn verify_consent(config: &AppConfig, request: &ConsentRequest) -> Result<()> {
    let ledger = EthLedger::connect(&config.ledger)?;
    let snapshot = ConsentSnapshot::fetch(&ledger, request).await?;
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let verdict = ConsentEvaluator.evaluate(request, &snapshot, now);
    info!(
        specific = snapshot.specific.len(),
        role = snapshot.role.len(),
        universal = snapshot.universal.len(),
        government = snapshot.government.len(),
        valid = verdict.valid,
        "Consent evaluated"
    );
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

async fn run_eval(
    config: &AppConfig,
    suite: Suite,
    input: &std::path::Path,
    output: &std::path::Path,
    providers: &[String],
) -> Result<()> {
    if providers.is_empty() {
        bail!("no providers given (choose from {})", eval::PROVIDER_NAMES.join(", "));
    }
    let cases = eval::load_cases(input, suite)?;
    let providers = eval::build_providers(providers, &config.openai, &config.eval, suite)?;
    println!(
        "[EVAL] {} suite: {} cases x {} providers",
        suite,
        cases.len(),
        providers.len()
    );

    let rows = Evaluator::new(suite, providers).run(&cases).await;
    eval::write_results(output, suite, &rows)?;

    let summary = eval::summarize(&rows);
    info!(
        suite = %suite,
        rows = summary.rows,
        errors = summary.errors,
        parsed = summary.parsed,
        mean_latency_sec = ?summary.mean_latency_sec,
        "Evaluation finished"
    );
    println!("[EVAL] ✅ Results written to {}", output.display());
    Ok(())
}

fn manage_sessions(config: &AppConfig, cmd: SessionsCommand) -> Result<()> {
    let store = SessionStore::new(config.sessions_dir())?;
    match cmd {
        SessionsCommand::List => {
            let sessions = store.list()?;
            if sessions.is_empty() {
                println!("No saved sessions.");
            }
            for s in sessions {
                println!(
                    "{}  {}  {:>3} turns  {}",
                    s.id,
                    s.created_at.format("%Y-%m-%d %H:%M:%S"),
                    s.turns,
                    s.opening
                );
            }
        }
        SessionsCommand::Delete { id } => {
            store
                .delete(&id)
                .with_context(|| format!("failed to delete session {}", id))?;
            println!("Deleted session {}", id);
        }
    }
    Ok(())
}
