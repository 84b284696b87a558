// Target-specific transitive dependency split (mio/crossterm stack) is accepted for now.
#![allow(clippy::multiple_crate_versions)]

use std::error::Error as _;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dcdeploy_api::GoogleApis;
use dcdeploy_engine::{
    Backends, DeployFlags, DeployOptions, DeployOutcome, ManifestLoader, NonInteractive, Prompter,
    TOOLKIT_BINARY, ToolkitCompiler, run_deploy, run_sql_diff, run_sql_migrate,
};
use dcdeploy_report::{
    ColorChoice, OutputFormat, RenderOptions, render_error_table, render_migrated, render_plan,
    render_report, render_schema_plan,
};
use minus::{ExitStrategy, Pager, page_all};

mod config;
mod error;
mod logging;
mod prompt;

pub use config::{ConfigFile, Overrides, PROJECT_CONFIG_FILE, Settings, resolve, user_config_path};
pub use error::{CliError, ConfigError};
pub use prompt::TerminalPrompter;

#[derive(Debug, Parser)]
#[command(
    name = "dcdeploy",
    version,
    about = "Deploy Data Connect services and migrate their Cloud SQL schemas"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create, migrate and release every declared service.
    Deploy {
        /// Comma-separated `dataconnect:<service>[:<connector>|:schema]` filters.
        #[arg(long)]
        only: Option<String>,
        /// Plan without changing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or migrate one service's SQL schema.
    Sql {
        #[command(subcommand)]
        command: SqlCommands,
    },
}

#[derive(Debug, Subcommand)]
enum SqlCommands {
    /// Show the SQL the schema still needs.
    Diff { service_id: Option<String> },
    /// Run the SQL the schema needs without redeploying it.
    Migrate { service_id: Option<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Args)]
struct GlobalArgs {
    #[arg(long, global = true, env = "DCDEPLOY_PROJECT")]
    project: Option<String>,
    /// Directory searched for `dataconnect.json` manifests.
    #[arg(long, global = true, env = "DCDEPLOY_ROOT", default_value = ".")]
    root: PathBuf,
    #[arg(long, global = true, env = "DCDEPLOY_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    #[arg(long, global = true, env = "DATACONNECT_TOOLKIT_PATH")]
    toolkit: Option<PathBuf>,
    /// Accept every destructive or breaking change without asking.
    #[arg(long, global = true)]
    force: bool,
    /// Never prompt; implied when stdin is not a terminal.
    #[arg(long, global = true)]
    non_interactive: bool,
    #[arg(long, global = true, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,
    #[arg(long, global = true, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,
    #[arg(long, global = true)]
    verbose: bool,
    #[arg(long, global = true, env = "DCDEPLOY_LOG", default_value = "warn")]
    log_level: String,
}

impl GlobalArgs {
    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            color: self.color.into(),
            verbose: self.verbose,
            target: None,
        }
    }

    fn non_interactive(&self) -> bool {
        self.non_interactive || !std::io::stdin().is_terminal()
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Run the CLI using process arguments.
///
/// # Errors
///
/// Returns an error when argument parsing fails (excluding help/version),
/// configuration is incomplete, or the command fails.
pub fn run() -> Result<i32, CliError> {
    run_from(std::env::args_os())
}

fn run_from<I, T>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(error.into()),
        },
    };
    let global = &cli.global;
    logging::init(&global.log_level);

    let settings = resolve(
        Overrides {
            project: global.project.clone(),
            access_token: global.access_token.clone(),
        },
        &global.root,
        user_config_path().as_deref(),
    )?;
    let apis = GoogleApis::connect(&settings.api)?;
    let compiler = match (&cli.command, ToolkitCompiler::locate(global.toolkit.as_deref())) {
        (_, Ok(compiler)) => compiler,
        // sql commands never build, so the toolkit may be absent.
        (Commands::Sql { .. }, Err(_)) => ToolkitCompiler::new(PathBuf::from(TOOLKIT_BINARY)),
        (Commands::Deploy { .. }, Err(error)) => return Err(error.into()),
    };
    let non_interactive = global.non_interactive();
    let prompter: &dyn Prompter = if non_interactive {
        &NonInteractive
    } else {
        &TerminalPrompter
    };
    let backends = Backends {
        control_plane: &apis.control_plane,
        cloud_sql: &apis.cloud_sql,
        platform: &apis.platform,
        compiler: &compiler,
        prompter,
    };

    let loader = ManifestLoader::new(global.root.clone());
    let mut options = DeployOptions {
        project: settings.project,
        root: global.root.clone(),
        only: None,
        flags: DeployFlags {
            force: global.force,
            dry_run: false,
            non_interactive,
        },
    };
    let format: OutputFormat = global.format.into();
    let render_options = global.render_options();

    let rendered = match &cli.command {
        Commands::Deploy { only, dry_run } => {
            options.only.clone_from(only);
            options.flags.dry_run = *dry_run;
            match run_deploy(&options, &loader, backends)? {
                DeployOutcome::Planned(plan) => render_plan(&plan, format, &render_options)?,
                DeployOutcome::Deployed(report) => {
                    render_report(&report, format, &render_options)?
                }
            }
        }
        Commands::Sql {
            command: SqlCommands::Diff { service_id },
        } => {
            let plan = run_sql_diff(&options, service_id.as_deref(), &loader, backends)?;
            render_schema_plan(&plan, format, &render_options)?
        }
        Commands::Sql {
            command: SqlCommands::Migrate { service_id },
        } => {
            let migrated = run_sql_migrate(&options, service_id.as_deref(), &loader, backends)?;
            render_migrated(&migrated, format, &render_options)?
        }
    };
    emit_output(&rendered, format);
    Ok(0)
}

/// Print a failure to stderr: the message, its causes, then any error table.
pub fn report_error(error: &CliError) {
    // clap formats its own usage errors.
    if let CliError::ArgumentParse(error) = error {
        eprint!("{error}");
        return;
    }
    eprintln!("error: {error:#}");
    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    if let Some(errors) = error.graphql_errors() {
        let options = RenderOptions {
            color: ColorChoice::Never,
            ..RenderOptions::default()
        };
        eprintln!();
        eprint!("{}", render_error_table(errors, &options));
    }
}

fn emit_output(rendered: &str, format: OutputFormat) {
    if format == OutputFormat::Text && should_use_pager(rendered) && page_output(rendered).is_ok() {
        return;
    }

    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }
}

/// Page only output that would scroll off the terminal.
fn should_use_pager(rendered: &str) -> bool {
    let rows = console::Term::stdout().size().0;
    std::io::stdout().is_terminal()
        && std::env::var_os("NO_PAGER").is_none()
        && rendered.lines().count() >= usize::from(rows)
}

fn page_output(rendered: &str) -> Result<(), minus::MinusError> {
    let pager = Pager::new();
    pager.set_exit_strategy(ExitStrategy::PagerQuit)?;
    pager.set_text(rendered)?;
    page_all(pager)
}
