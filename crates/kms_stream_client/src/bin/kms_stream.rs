//! kms-stream: ask the KMS service one question from the terminal.
//! Reads config, sends the question (argument or first stdin line), prints
//! the answer as it streams in, then the evidence items.

use clap::Parser;
use kms_stream_client::{config, Client, Snapshot, StreamEvent};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "KMS_STREAM_LOG";

#[derive(Debug, Parser)]
#[command(name = "kms-stream", about = "Stream an answer from the KMS service")]
struct Args {
    /// Question to ask; read from stdin when omitted.
    question: Option<String>,

    /// Config file (default: $KMS_STREAM_CONFIG or ~/.kms-stream/config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `api.url` from the config.
    #[arg(long)]
    url: Option<String>,

    /// Use a single-shot request instead of streaming.
    #[arg(long)]
    no_stream: bool,
}

fn init_logging() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    process::exit(1);
}

fn read_question(args: &Args) -> String {
    if let Some(q) = &args.question {
        return q.trim().to_string();
    }
    let mut line = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut line) {
        fail(format!("failed to read stdin: {}", e));
    }
    line.trim().to_string()
}

/// Writes only what the snapshot added; a replaced answer is reprinted whole.
struct AnswerPrinter {
    printed: String,
}

impl AnswerPrinter {
    fn update(&mut self, out: &mut impl Write, snapshot: &Snapshot) -> io::Result<()> {
        let text = &snapshot.answer_text;
        match text.strip_prefix(self.printed.as_str()) {
            Some(added) => write!(out, "{}", added)?,
            None => write!(out, "\n{}", text)?,
        }
        out.flush()?;
        self.printed.clone_from(text);
        Ok(())
    }
}

fn print_evidence(out: &mut impl Write, snapshot: &Snapshot) -> io::Result<()> {
    writeln!(out)?;
    if snapshot.evidence.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nEvidence ({}):", snapshot.evidence.len())?;
    for (i, item) in snapshot.evidence.iter().enumerate() {
        let rendered = match item {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        writeln!(out, "#{} {}", i + 1, rendered)?;
    }
    Ok(())
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

async fn run_stream(client: &Client, question: &str) -> io::Result<()> {
    let mut session = client.stream(question);
    cancel_on_ctrl_c(session.cancel_token());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut printer = AnswerPrinter {
        printed: String::new(),
    };
    let mut last = Snapshot::default();

    while let Some(event) = session.next().await {
        match event {
            StreamEvent::Snapshot(snapshot) => {
                printer.update(&mut out, &snapshot)?;
                last = snapshot;
            }
            StreamEvent::Error(e) => fail(e),
            StreamEvent::Complete => {
                if last.is_empty() {
                    tracing::warn!("service returned no answer or evidence");
                }
                print_evidence(&mut out, &last)?
            }
        }
    }
    Ok(())
}

async fn run_single(client: &Client, question: &str) -> io::Result<()> {
    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());
    let snapshot = match client.query_until_cancelled(question, &token).await {
        Ok(Some(s)) => s,
        Ok(None) => return Ok(()),
        Err(e) => fail(e),
    };
    if snapshot.is_empty() {
        tracing::warn!("service returned no answer or evidence");
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write!(out, "{}", snapshot.answer_text)?;
    print_evidence(&mut out, &snapshot)
}

fn main() {
    init_logging();
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref()).unwrap_or_else(|| {
        fail("unable to determine config path (set --config or KMS_STREAM_CONFIG)")
    });
    // An explicitly named file must exist; the default location is optional.
    let loaded = if args.config.is_some() {
        config::load(&config_path)
    } else {
        config::load_or_default(&config_path)
    };
    let mut cfg = loaded.unwrap_or_else(|e| {
        fail(format!(
            "failed to load config from {}: {}",
            config_path.display(),
            e
        ))
    });
    if let Some(url) = &args.url {
        cfg.api.url = Some(url.clone());
    }

    let question = read_question(&args);
    if question.is_empty() {
        fail("no question provided");
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to create runtime: {}", e)));

    let client = Client::from_config(&cfg);
    let streaming = cfg.streaming() && !args.no_stream;
    tracing::info!(url = cfg.api_url(), streaming, "sending query");

    let result = rt.block_on(async {
        if streaming {
            run_stream(&client, &question).await
        } else {
            run_single(&client, &question).await
        }
    });
    if let Err(e) = result {
        fail(format!("failed to write output: {}", e));
    }
}
