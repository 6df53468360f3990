//! legal-qa: ask the answering service one question and print the answer as
//! it streams in, followed by the cited sources.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use legal_qa_client::config::{self, Config};
use legal_qa_client::{
    AnswerService, CancellationToken, ExchangeOutcome, HttpClient, QueryOrchestrator, Role,
    SharedStore,
};

#[derive(Debug, Parser)]
#[command(name = "legal-qa", version, about = "Ask the legal Q&A service a question")]
struct Args {
    /// Config file (default: ~/.legal-qa/config.yaml)
    #[arg(long, env = "LEGAL_QA_CONFIG")]
    config: Option<PathBuf>,

    /// Answering service base URL; overrides the config file
    #[arg(long, env = "LEGAL_QA_API_URL")]
    api_url: Option<String>,

    /// Number of documents the service should retrieve
    #[arg(long)]
    max_results: Option<u32>,

    /// Question to ask; read from stdin when omitted
    question: Option<String>,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("legal_qa_client=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => match config::default_config_path() {
            Some(path) => config::load_or_default(&path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => Ok(Config::default()),
        },
    }
}

fn read_question(arg: Option<String>) -> anyhow::Result<String> {
    if let Some(question) = arg {
        return Ok(question);
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read question from stdin")?;
    Ok(line)
}

/// Writes the streaming answer incrementally to stdout.
#[derive(Default)]
struct AnswerPrinter {
    printed: String,
}

impl AnswerPrinter {
    /// Print whatever the answer gained since the last call. Output stops
    /// once the message is finalized unless `final_pass` is set.
    fn render(&mut self, store: &SharedStore, final_pass: bool) -> io::Result<()> {
        let Some(answer) = current_answer(store) else {
            return Ok(());
        };
        if !answer.is_streaming && !final_pass {
            return Ok(());
        }
        if let Some(delta) = answer.content.strip_prefix(self.printed.as_str()) {
            if !delta.is_empty() {
                let mut out = io::stdout().lock();
                write!(out, "{}", delta)?;
                out.flush()?;
                self.printed = answer.content;
            }
        }
        Ok(())
    }

    fn finish(&self, store: &SharedStore, outcome: &ExchangeOutcome) -> io::Result<ExitCode> {
        let answer = current_answer(store).unwrap_or_default();
        let mut out = io::stdout().lock();
        if !self.printed.is_empty() {
            writeln!(out)?;
        }

        match outcome {
            ExchangeOutcome::Completed => {
                let sources = answer.sources.unwrap_or_default();
                if !sources.is_empty() {
                    writeln!(out, "\nSources:")?;
                    for source in &sources {
                        writeln!(out, "  {}", source)?;
                    }
                }
                Ok(ExitCode::SUCCESS)
            }
            ExchangeOutcome::ServerError(message) => {
                eprintln!("Server error: {}", message);
                Ok(ExitCode::FAILURE)
            }
            ExchangeOutcome::TransportFailed => {
                eprintln!("Error: {}", answer.content);
                Ok(ExitCode::FAILURE)
            }
            ExchangeOutcome::Cancelled => {
                eprintln!("Cancelled.");
                Ok(ExitCode::from(130))
            }
            ExchangeOutcome::Rejected(reason) => {
                eprintln!("Error: question rejected ({:?})", reason);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

#[derive(Default)]
struct Answer {
    content: String,
    sources: Option<Vec<String>>,
    is_streaming: bool,
}

/// Latest assistant message in the selected conversation.
fn current_answer(store: &SharedStore) -> Option<Answer> {
    store.read(|s| {
        s.selected()
            .and_then(|c| c.last_message())
            .filter(|m| m.role == Role::Assistant)
            .map(|m| Answer {
                content: m.content.clone(),
                sources: m.sources.clone(),
                is_streaming: m.is_streaming,
            })
    })
}

async fn ask(
    client: HttpClient,
    question: &str,
    max_results: u32,
) -> anyhow::Result<ExitCode> {
    let client = Arc::new(client);

    let probe = client.clone();
    tokio::spawn(async move { probe.ping().await });

    let store = SharedStore::new();
    let orchestrator = QueryOrchestrator::new(client, store.clone()).with_max_results(max_results);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut revisions = store.subscribe();
    let mut exchange = pin!(orchestrator.send_message_with_cancel(question, cancel));
    let mut printer = AnswerPrinter::default();

    let outcome = loop {
        tokio::select! {
            outcome = &mut exchange => break outcome,
            changed = revisions.changed() => {
                if changed.is_ok() {
                    printer.render(&store, false)?;
                }
            }
        }
    };

    if outcome.is_success() || outcome == ExchangeOutcome::Cancelled {
        printer.render(&store, true)?;
    }
    Ok(printer.finish(&store, &outcome)?)
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let cfg = load_config(args.config.as_deref())?;
    let base_url = match args.api_url {
        Some(url) => url,
        None => cfg.resolve_base_url()?,
    };
    let max_results = args.max_results.unwrap_or_else(|| cfg.max_results());

    let question = read_question(args.question)?;
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("no question provided (pass it as an argument or on stdin)");
    }

    let client = HttpClient::with_connect_timeout(&base_url, cfg.connect_timeout())?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    rt.block_on(ask(client, question, max_results))
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
