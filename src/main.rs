use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use speccheck_core::{OutputFormat, PullRequestRef, SpecCheckConfig};
use speccheck_review::event::{self, PullRequestEvent};
use speccheck_review::github::GitHubClient;
use speccheck_review::llm::LlmClient;
use speccheck_review::pipeline::{ReviewReport, SpecReviewer};
use speccheck_review::retry::RetryPolicy;

const CONFIG_FILE: &str = ".speccheck.toml";

#[derive(Parser)]
#[command(
    name = "speccheck",
    version,
    about = "Check that a pull request does what its linked issue asked for",
    long_about = "Speccheck reviews a pull request against the specification in the issue it links.\n\n\
                   The first model pass judges the diff against the issue; the second pass\n\
                   normalizes that judgment into one of two verdicts. A failed spec gets a\n\
                   comment, a draft conversion, and a change request.\n\n\
                   Examples:\n  \
                     speccheck review --pr owner/repo#12          Review a pull request\n  \
                     speccheck review --pr owner/repo#12 --dry-run  Show what would happen\n  \
                     speccheck event                              Review from a GitHub Actions event\n  \
                     speccheck doctor                             Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .speccheck.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request against its linked issue
    #[command(long_about = "Review a pull request against its linked issue.\n\n\
        The first #N or issue/pull URL in the pull request description names the\n\
        specification. Requires GITHUB_TOKEN (or GH_TOKEN) and an LLM API key.\n\n\
        Examples:\n  speccheck review --pr owner/repo#12\n  speccheck review --pr owner/repo#12 --dry-run --format json")]
    Review {
        /// Pull request to review (format: owner/repo#123)
        #[arg(long)]
        pr: PullRequestRef,
        /// Build the verdict and action plan without touching the pull request
        #[arg(long)]
        dry_run: bool,
    },
    /// Review the pull request of a GitHub Actions event
    #[command(long_about = "Review the pull request of a GitHub Actions event.\n\n\
        Reads the event name and payload from GITHUB_EVENT_NAME and GITHUB_EVENT_PATH\n\
        unless given explicitly. Only pull_request events with action opened or\n\
        ready_for_review start a review; anything else exits successfully.")]
    Event {
        /// Event name (default: $GITHUB_EVENT_NAME)
        #[arg(long, env = "GITHUB_EVENT_NAME")]
        event_name: String,
        /// Path to the event payload (default: $GITHUB_EVENT_PATH)
        #[arg(long, env = "GITHUB_EVENT_PATH")]
        payload: PathBuf,
        /// Build the verdict and action plan without touching the pull request
        #[arg(long)]
        dry_run: bool,
    },
    /// Create a default .speccheck.toml configuration file
    #[command(long_about = "Create a default .speccheck.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .speccheck.toml already exists.")]
    Init,
    /// Check your speccheck setup and environment
    #[command(long_about = "Check your speccheck setup and environment.\n\n\
        Runs diagnostics for the config file, LLM API key, GitHub token, and\n\
        GitHub Actions event variables. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

fn load_config(path: Option<&Path>) -> Result<SpecCheckConfig> {
    let config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            SpecCheckConfig::from_file(path)?
        }
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                tracing::debug!(path = CONFIG_FILE, "loading config");
                SpecCheckConfig::from_file(default_path)?
            } else {
                tracing::debug!("no config file, using defaults");
                SpecCheckConfig::default()
            }
        }
    };
    Ok(config)
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("speccheck v{version}: does the diff do what the issue asked for?\n");

    println!("Quick start:");
    println!("  speccheck init                       Create a .speccheck.toml config file");
    println!("  speccheck review --pr owner/repo#12  Review a pull request\n");

    println!("All commands:");
    println!("  review    Review a pull request against its linked issue");
    println!("  event     Review the pull request of a GitHub Actions event");
    println!("  doctor    Check your setup and environment");
    println!("  init      Create default configuration\n");

    println!("Run 'speccheck <command> --help' for details.");
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> &'static str {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            ("fail", false) => "\u{2717}",
            (_, true) => "\x1b[33m~\x1b[0m",
            (_, false) => "~",
        }
    }
}

fn run_doctor(
    config: &SpecCheckConfig,
    config_path: &Path,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{} not found", config_path.display()),
            "run 'speccheck init' to create a default config",
        ));
    }

    let llm_env_var = config.llm.api_key_env_var();
    checks.push(CheckResult::pass(
        "llm_provider",
        format!("{} (model: {})", config.llm.provider, config.llm.model),
    ));
    if config.llm.api_key.is_some() || std::env::var(llm_env_var).is_ok() {
        checks.push(CheckResult::pass("llm_api_key", format!("{llm_env_var} set")));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            format!("{llm_env_var} not set"),
            format!("export {llm_env_var}=... or set api_key in {CONFIG_FILE}"),
        ));
    }

    if config.github.token.is_some() {
        checks.push(CheckResult::pass("github_token", "token set in config"));
    } else if std::env::var("GITHUB_TOKEN").is_ok() || std::env::var("GH_TOKEN").is_ok() {
        checks.push(CheckResult::pass("github_token", "GITHUB_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set",
            "export GITHUB_TOKEN=... (needs pull request write access)",
        ));
    }

    match (
        std::env::var("GITHUB_EVENT_NAME"),
        std::env::var("GITHUB_EVENT_PATH"),
    ) {
        (Ok(name), Ok(path)) => checks.push(CheckResult::pass(
            "actions_event",
            format!("{name} at {path}"),
        )),
        _ => checks.push(CheckResult::info(
            "actions_event",
            "not running in GitHub Actions ('speccheck event' needs --event-name and --payload)",
        )),
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("speccheck v{version} environment check\n");

            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<20} {}", check.symbol(use_color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

async fn run_review(
    config: &SpecCheckConfig,
    pr: &PullRequestRef,
    dry_run: bool,
) -> Result<ReviewReport> {
    let retry = RetryPolicy::from_config(&config.retry);
    let github = GitHubClient::new(&config.github, retry.clone())?;
    let llm = LlmClient::new(&config.llm, retry)?;

    let spinner = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        if let Ok(style) =
            indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("Reviewing {pr}..."));
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let result = SpecReviewer::new(&github, &llm, config.review.clone())
        .dry_run(dry_run)
        .review(pr)
        .await;

    if let Some(pb) = spinner {
        match &result {
            Ok(report) => pb.finish_with_message(format!("Done: {}", report.verdict.label())),
            Err(_) => pb.finish_with_message("Failed"),
        }
    }

    result.wrap_err_with(|| format!("reviewing {pr}"))
}

fn print_report(report: &ReviewReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", report.to_markdown()),
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}

/// Exit non-zero when any review action failed, so CI surfaces it.
fn exit_on_failed_actions(report: &ReviewReport) {
    for outcome in report.failed_actions() {
        tracing::error!(
            pull_request = %report.pull_request,
            action = %outcome.action,
            error = outcome.error.as_deref().unwrap_or_default(),
            "review action failed"
        );
    }
    let failed = report.failed_actions().count();
    if failed > 0 {
        eprintln!("{failed} review action(s) failed");
        std::process::exit(1);
    }
}

const DEFAULT_CONFIG: &str = r#"# speccheck configuration

[llm]
# Provider picks the API key variable: openai, anthropic, gemini
# provider = "openai"
# model = "gpt-4o"
# api_key = "..."                    # else OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
# base_url = "https://api.openai.com"
# max_tokens = 500
# timeout_secs = 120

[github]
# token = "..."                      # else GITHUB_TOKEN / GH_TOKEN
# api_base = "https://api.github.com"
# timeout_secs = 30

[review]
# What to do when the verdict matches neither template: "ignore" or "fail"
# on_unclassified = "ignore"

[retry]
# max_attempts = 3
# initial_backoff_ms = 500
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome();
        }
        Some(Command::Review { ref pr, dry_run }) => {
            let config = load_config(cli.config.as_deref())?;
            let report = run_review(&config, pr, dry_run).await?;
            print_report(&report, cli.format)?;
            exit_on_failed_actions(&report);
        }
        Some(Command::Event {
            ref event_name,
            ref payload,
            dry_run,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let event = PullRequestEvent::from_file(payload)
                .wrap_err_with(|| format!("reading event payload {}", payload.display()))?;
            let Some(pr) = event::review_target(event_name, &event) else {
                tracing::info!(event = %event_name, action = %event.action, "nothing to review");
                return Ok(());
            };
            let report = run_review(&config, &pr, dry_run).await?;
            print_report(&report, cli.format)?;
            exit_on_failed_actions(&report);
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            let config = load_config(cli.config.as_deref())?;
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            run_doctor(&config, &config_path, cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "speccheck", &mut std::io::stdout());
        }
    }

    Ok(())
}
