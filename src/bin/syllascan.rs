//! Syllascan CLI — course outline compliance checker.
//!
//! Usage:
//!   syllascan analyze <outline> [--checklist path] [--context text] [--attempts n]
//!   syllascan checklist

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use syllascan::{
    default_checklist, AnalysisConfig, AnalyzeRequest, DocumentSource, ItemStatus, OpenAiJudge,
    OpenAiJudgeConfig, SyllascanApi,
};

#[derive(Parser)]
#[command(
    name = "syllascan",
    version,
    about = "Checks course outlines against an institutional checklist"
)]
struct Cli {
    /// Log engine activity to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an outline document
    Analyze {
        /// Path to the outline (.txt, .md)
        outline: PathBuf,
        /// Custom checklist file; the built-in checklist when omitted
        #[arg(long)]
        checklist: Option<PathBuf>,
        /// Course context, e.g. "this course has no final exam"
        #[arg(long)]
        context: Option<String>,
        /// Semantic verification calls per item (0 = pattern matching only)
        #[arg(long, default_value_t = 3)]
        attempts: u32,
        /// Probe extracted links over the network
        #[arg(long)]
        live_links: bool,
        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the built-in checklist
    Checklist,
}

fn build_api(attempts: u32, live_links: bool) -> Result<SyllascanApi, String> {
    let mut config = AnalysisConfig::default();
    config.live_link_checks = live_links;

    let judge_config = OpenAiJudgeConfig::from_env();
    if attempts > 0 && judge_config.api_key.is_none() {
        eprintln!("warning: OPENAI_API_KEY not set, falling back to pattern matching only");
        config.api_attempts = 0;
    } else {
        config.api_attempts = attempts;
    }

    let judge = OpenAiJudge::new(judge_config)
        .map_err(|e| format!("failed to build judge client: {}", e))?;
    Ok(SyllascanApi::new(Arc::new(judge), config))
}

async fn cmd_analyze(
    outline: PathBuf,
    checklist: Option<PathBuf>,
    context: Option<String>,
    attempts: u32,
    live_links: bool,
    json: bool,
) -> i32 {
    let api = match build_api(attempts, live_links) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let checklist_text = match checklist {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                eprintln!("Error: cannot read checklist '{}': {}", path.display(), e);
                return 1;
            }
        },
        None => None,
    };

    let request = AnalyzeRequest {
        session: "cli".to_string(),
        document: DocumentSource::Path(outline),
        checklist: checklist_text,
        context,
        api_attempts: None,
    };

    let report = match api.analyze(request).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
        return if report.summary.missing == 0 { 0 } else { 2 };
    }

    for result in &report.results {
        let mark = match result.status {
            ItemStatus::Present => "PASS",
            ItemStatus::Missing => "FAIL",
            ItemStatus::Na => "N/A ",
        };
        println!("[{}] ({:.2}) {}", mark, result.confidence, result.item);
        if result.status == ItemStatus::Missing && !result.explanation.is_empty() {
            println!("       {}", result.explanation);
        }
    }
    println!(
        "\n{} present, {} missing, {} not applicable ({} items)",
        report.summary.present, report.summary.missing, report.summary.na, report.summary.total
    );
    if report.summary.verification_calls > 0 {
        println!(
            "{} semantic verification calls across {} items",
            report.summary.verification_calls, report.summary.ai_reviewed
        );
    }

    if report.summary.missing == 0 {
        0
    } else {
        2
    }
}

fn cmd_checklist() -> i32 {
    for (index, item) in default_checklist().iter().enumerate() {
        println!("{:>2}. {}", index + 1, item.text());
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.command {
        Commands::Analyze {
            outline,
            checklist,
            context,
            attempts,
            live_links,
            json,
        } => cmd_analyze(outline, checklist, context, attempts, live_links, json).await,
        Commands::Checklist => cmd_checklist(),
    };
    std::process::exit(code);
}
