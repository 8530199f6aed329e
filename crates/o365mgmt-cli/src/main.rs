//! CLI interface for o365mgmt - the Office 365 Management Activity API from the terminal.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::fmt::WriteStyle;
use log::{LevelFilter, debug, info};
use o365mgmt_core::management::FacadeCompletion;
use o365mgmt_core::paths::write_default_config;
use o365mgmt_core::{
    APP_NAME, AppConfig, AppPaths, ContentType, ManagementFacade, Webhook, generate_schema,
    write_generated_files,
};
use serde::Serialize;

/// Repository URL used as the schema `$id` base.
const REPO_URL: &str = "https://github.com/byteowlz/o365mgmt";

fn main() -> anyhow::Result<()> {
    try_main()
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    // `init` must see whether the file exists before loading creates it.
    let create_default = !matches!(cli.command, Command::Init(_));
    let ctx = RuntimeContext::new(cli.common.clone(), create_default)?;
    ctx.init_logging()?;
    debug!("resolved paths: {}", ctx.paths);

    match cli.command {
        Command::Subscriptions { subcommand } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(handle_subscriptions(&ctx, subcommand))
        }
        Command::Fetch { uri } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(handle_fetch(&ctx, &uri))
        }
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "o365mgmt",
    author,
    version,
    about = "Office 365 Management Activity API from the terminal",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

/// Common CLI options shared across all subcommands.
#[derive(Debug, Clone, Args)]
pub struct CommonOpts {
    /// Override the config file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Reduce output to only errors.
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    pub quiet: bool,
    /// Increase logging verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,
    /// Enable trace logging.
    #[arg(long, global = true)]
    pub trace: bool,
    /// Output format for results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,
    /// Disable ANSI colors in output.
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    pub no_color: bool,
    /// Control color output.
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    pub color: ColorOption,
    /// Do not change anything on disk.
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorOption {
    /// Detect terminal capabilities automatically.
    Auto,
    /// Always emit ANSI color codes.
    Always,
    /// Never emit ANSI color codes.
    Never,
}

/// Result output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage subscriptions and list available content.
    Subscriptions {
        #[command(subcommand)]
        subcommand: SubscriptionsSubcommand,
    },
    /// Retrieve the audit records behind a content URI.
    Fetch {
        /// Content URI from a content listing or notification.
        uri: String,
    },
    /// Create the default configuration file.
    Init(InitCommand),
    /// Inspect and manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum SubscriptionsSubcommand {
    /// List current subscriptions.
    List,
    /// Start a subscription to a content type.
    Start {
        /// Content type (Audit.AzureActiveDirectory, Audit.Exchange,
        /// Audit.SharePoint, Audit.General, DLP.All).
        content_type: ContentType,
        #[command(flatten)]
        webhook: WebhookArgs,
    },
    /// Stop a subscription to a content type.
    Stop {
        /// Content type to stop.
        content_type: ContentType,
    },
    /// List content blobs available for a content type.
    Content {
        /// Content type to list.
        content_type: ContentType,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// List notifications sent for a content type.
    Notifications {
        /// Content type to list.
        content_type: ContentType,
        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct WebhookArgs {
    /// Webhook address that receives notifications.
    #[arg(long = "webhook-address", value_name = "URL")]
    address: Option<String>,
    /// Value echoed back in the Webhook-AuthID header.
    #[arg(long = "webhook-auth-id", requires = "address")]
    auth_id: Option<String>,
    /// Webhook expiration timestamp. Omit for a webhook that does not expire.
    #[arg(long = "webhook-expiration", requires = "address")]
    expiration: Option<String>,
}

impl WebhookArgs {
    fn into_webhook(self) -> Option<Webhook> {
        self.address.map(|address| Webhook {
            address,
            auth_id: self.auth_id,
            expiration: self.expiration,
        })
    }
}

#[derive(Debug, Clone, Copy, Args)]
struct WindowArgs {
    /// Start of the time window (UTC; RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`).
    #[arg(long, value_parser = parse_timestamp)]
    start: Option<DateTime<Utc>>,
    /// End of the time window (UTC; same formats as --start).
    #[arg(long, value_parser = parse_timestamp)]
    end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists.
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration (client secret redacted).
    Show,
    /// Print the resolved config file path.
    Path,
    /// Print the JSON schema.
    Schema,
    /// Regenerate the default configuration file.
    Reset,
    /// Write config.schema.json and an example config.toml to a directory.
    Generate {
        /// Output directory.
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{text}'"))
}

// ─── Runtime ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts, create_default: bool) -> Result<Self> {
        let paths = AppPaths::discover(common.config.as_deref())?;
        let config = if create_default {
            AppConfig::load(&paths, common.dry_run)?
        } else {
            AppConfig::load_from_path(&paths.config_file)?
        };
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());

        if let Some(ref file) = self.config.logging.file {
            let target = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .with_context(|| format!("opening log file {file}"))?;
            builder.target(env_logger::Target::Pipe(Box::new(target)));
            builder.write_style(WriteStyle::Never);
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            if disable_color {
                builder.write_style(WriteStyle::Never);
            } else if force_color {
                builder.write_style(WriteStyle::Always);
            } else {
                builder.write_style(WriteStyle::Auto);
            }
        }

        builder.try_init().or_else(|err| {
            if self.common.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    /// Flags win; without any, `logging.level` from the config applies.
    const fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self.config.logging.level.to_level_filter(),
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn facade(&self) -> Result<ManagementFacade> {
        ManagementFacade::from_config(&self.config.management)
            .context("creating management client")
    }

    fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", render(self.common.format, value)?);
        Ok(())
    }

    /// Log the exchange, then print the value or return the wrapped error.
    fn finish<T: Serialize>(&self, completion: FacadeCompletion<T>) -> Result<()> {
        if let Some(ref request) = completion.request {
            debug!("request: {} {}", request.method, request.url);
        }
        if let Some(ref response) = completion.response {
            debug!(
                "response: status {}{}",
                response.status,
                response
                    .request_id
                    .as_deref()
                    .map(|id| format!(", request-id {id}"))
                    .unwrap_or_default()
            );
            if let Some(ref next) = response.next_page_uri {
                info!("more results available: {next}");
            }
        }
        match completion.result {
            Ok(value) => self.print(&value),
            Err(err) => {
                // Structured report on stdout; the message still goes to stderr.
                self.print(&err.to_value())?;
                Err(err.into())
            }
        }
    }
}

fn render<T: Serialize>(format: OutputFormat, value: &T) -> Result<String> {
    let rendered = match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("serializing result to JSON")?
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("serializing result to YAML")?,
    };
    Ok(rendered.trim_end().to_string())
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn handle_subscriptions(
    ctx: &RuntimeContext,
    command: SubscriptionsSubcommand,
) -> Result<()> {
    let facade = ctx.facade()?;
    match command {
        SubscriptionsSubcommand::List => ctx.finish(facade.subscriptions_list().await),
        SubscriptionsSubcommand::Start {
            content_type,
            webhook,
        } => {
            let webhook = webhook.into_webhook();
            let completion = facade
                .subscriptions_start(content_type, webhook.as_ref())
                .await;
            ctx.finish(completion)
        }
        SubscriptionsSubcommand::Stop { content_type } => {
            let completion = facade.subscriptions_stop(content_type).await;
            ctx.finish(completion.and_then(|()| {
                Ok(serde_json::json!({
                    "contentType": content_type,
                    "status": "stopped",
                }))
            }))
        }
        SubscriptionsSubcommand::Content {
            content_type,
            window,
        } => {
            let completion = facade
                .subscriptions_content(content_type, window.start, window.end)
                .await;
            ctx.finish(completion)
        }
        SubscriptionsSubcommand::Notifications {
            content_type,
            window,
        } => {
            let completion = facade
                .subscriptions_notifications(content_type, window.start, window.end)
                .await;
            ctx.finish(completion)
        }
    }
}

async fn handle_fetch(ctx: &RuntimeContext, uri: &str) -> Result<()> {
    let facade = ctx.facade()?;
    ctx.finish(facade.get_content(uri).await)
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }
    if ctx.common.dry_run {
        info!(
            "dry-run: would write default config to {}",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }
    write_default_config(&ctx.paths.config_file)?;
    println!("{}", ctx.paths.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => ctx.print(&ctx.config.redacted()),
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Schema => {
            println!("{}", generate_schema(REPO_URL)?);
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
        ConfigCommand::Generate { out } => {
            if ctx.common.dry_run {
                info!("dry-run: would write generated files to {}", out.display());
                return Ok(());
            }
            write_generated_files(&out, REPO_URL)
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
}
