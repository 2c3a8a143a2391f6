use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use mind_config::{ConfigLoader, MindConfig, WarningSeverity};
use mind_core::{Mind, MindError, Result};
use mind_runtime::MindService;
use serde_json::{Map, Value};
use std::path::PathBuf;

mod delegate;
mod minds;
mod records;
mod runner;

/// Mind: persistent autonomous agents with sandboxed tools and long-term memory
#[derive(Parser)]
#[command(name = "mind", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to mind.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and update Minds
    Minds {
        #[command(subcommand)]
        action: MindAction,
    },
    /// Delegate a task to a Mind and stream its progress
    Delegate {
        /// Mind id or name
        mind: String,
        /// What the Mind should do
        description: String,
        /// Print every event as a JSON line instead of a transcript
        #[arg(long)]
        json: bool,
    },
    /// Record explicit feedback on a Mind's behavior
    Feedback {
        /// Mind id or name
        mind: String,
        /// The feedback itself
        content: String,
        /// Task the feedback refers to
        #[arg(short, long)]
        task: Option<String>,
        /// Rating from 1 (poor) to 5 (great)
        #[arg(short, long)]
        rating: Option<i64>,
        /// Free-form tag, repeatable (stored as a snake_case keyword)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Inspect tasks and their traces
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Inspect drones spawned by tasks
    Drones {
        #[command(subcommand)]
        action: DroneAction,
    },
    /// List and search long-term memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Register and list runtime tools
    Tools {
        #[command(subcommand)]
        action: ToolAction,
    },
    /// Print the runtime manifest a delegated run would see
    Manifest {
        /// Mind id or name
        mind: String,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Audit configuration and storage
    Doctor,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Show version and build info
    Version,
}

/// Charter flags shared by `minds create` and `minds update`.
#[derive(clap::Args)]
struct CharterArgs {
    /// Charter mission
    #[arg(long)]
    mission: Option<String>,
    /// Why this Mind exists
    #[arg(long)]
    reason: Option<String>,
    /// Operating principle, repeatable
    #[arg(long = "principle")]
    principles: Vec<String>,
    /// Non-goal, repeatable
    #[arg(long = "non-goal")]
    non_goals: Vec<String>,
    /// Reflection focus, repeatable
    #[arg(long = "focus")]
    focus: Vec<String>,
}

#[derive(Subcommand)]
enum MindAction {
    /// Create a new Mind
    Create {
        name: String,
        /// Personality guidance
        #[arg(short, long, default_value = "")]
        personality: String,
        /// Extra operating instructions appended to the system prompt
        #[arg(short, long, default_value = "")]
        system_prompt: String,
        /// Preference as key=value (value parsed as JSON when possible), repeatable
        #[arg(long = "pref", value_parser = parse_key_val)]
        prefs: Vec<(String, String)>,
        #[command(flatten)]
        charter: CharterArgs,
    },
    /// List all Minds
    List,
    /// Show one Mind
    Show {
        /// Mind id or name
        mind: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a Mind's profile; unset flags keep their current value
    Update {
        /// Mind id or name
        mind: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        personality: Option<String>,
        #[arg(short, long)]
        system_prompt: Option<String>,
        /// Replace all preferences with these key=value pairs
        #[arg(long = "pref", value_parser = parse_key_val)]
        prefs: Vec<(String, String)>,
        #[command(flatten)]
        charter: CharterArgs,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// List a Mind's tasks, newest first
    List { mind: String },
    /// Show one task
    Show { mind: String, task: String },
    /// Show the recorded event trace of a task
    Trace {
        mind: String,
        task: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DroneAction {
    /// List a Mind's drones
    List {
        mind: String,
        /// Only drones spawned by this task
        #[arg(short, long)]
        task: Option<String>,
    },
    /// Show the recorded event trace of a drone
    Trace {
        mind: String,
        drone: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// List memories, newest first
    List {
        mind: String,
        /// Only this category (e.g. user_feedback, mind_insight)
        #[arg(short = 'C', long)]
        category: Option<String>,
    },
    /// Full-text search over a Mind's memories
    Search {
        mind: String,
        query: String,
        /// Number of results
        #[arg(short = 'k', long, default_value = "8")]
        top_k: usize,
    },
}

#[derive(Subcommand)]
enum ToolAction {
    /// Register a runtime tool that answers with a fixed response
    Add {
        mind: String,
        /// Tool name (lowercase letters, digits, underscores)
        name: String,
        #[arg(short, long)]
        description: String,
        #[arg(short, long)]
        response: String,
    },
    /// List a Mind's runtime tools
    List { mind: String },
}

/// Parse "key=value" CLI arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Preference pairs as a JSON object; values that parse as JSON keep their type.
fn preferences(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect()
}

/// Look a Mind up by id, then by exact name.
fn resolve_mind(service: &MindService, key: &str) -> Result<Mind> {
    match service.get_mind(key) {
        Ok(mind) => Ok(mind),
        Err(MindError::NotFound(message)) => service
            .list_minds()?
            .into_iter()
            .find(|m| m.name == key)
            .ok_or(MindError::NotFound(message)),
        Err(e) => Err(e),
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        init_tracing(&config, log_level);

        match self.command {
            Commands::Minds { action } => minds::cmd_minds(config, action),
            Commands::Delegate {
                mind,
                description,
                json,
            } => delegate::cmd_delegate(config, &mind, &description, json).await,
            Commands::Feedback {
                mind,
                content,
                task,
                rating,
                tags,
            } => records::cmd_feedback(config, &mind, content, task, rating, tags),
            Commands::Tasks { action } => records::cmd_tasks(config, action),
            Commands::Drones { action } => records::cmd_drones(config, action),
            Commands::Memory { action } => records::cmd_memory(config, action),
            Commands::Tools { action } => records::cmd_tools(config, action),
            Commands::Manifest { mind } => records::cmd_manifest(config, &mind),
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Doctor => Self::cmd_doctor(&config, config_loader.path()),
            Commands::Completions { shell } => Self::cmd_completions(shell),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_config(config: &MindConfig, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| MindError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_doctor(config: &MindConfig, config_path: &std::path::Path) -> Result<()> {
        println!("🩺 Mind Doctor: configuration audit");
        println!();
        if config_path.exists() {
            println!("  config: {}", config_path.display());
        } else {
            println!("  config: {} (not found, using defaults)", config_path.display());
        }

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        let mut ok_count = 0;
        match mind_memory::Database::open(&config.store.path) {
            Ok(_) => {
                println!("  ✅ store: {} is writable and migrated", config.store.path.display());
                ok_count += 1;
            }
            Err(e) => {
                println!("  ❌ store: {e}");
                warn_count += 1;
            }
        }
        match runner::build_runner(config) {
            Ok(_) => {
                println!(
                    "  ✅ llm: provider '{}' with model '{}'",
                    config.llm.provider, config.llm.model
                );
                ok_count += 1;
            }
            Err(e) => {
                println!("  ⚠️  llm: {e}");
                warn_count += 1;
            }
        }

        println!();
        println!(
            "  ✅ {ok_count} checks passed, ⚠️  {warn_count} warnings, 💡 {info_count} suggestions"
        );
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("Mind v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "mind", &mut std::io::stdout());
        Ok(())
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries output.
fn init_tracing(config: &MindConfig, level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format.as_str() {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
}

/// Truncate to `max` characters on one line, appending "..." if truncated.
fn truncate_output(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        format!("{}...", flat.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "mind", "minds", "create", "Ada", "--pref", "tone=\"dry\"", "--principle", "Be brief",
        ])
        .unwrap();
        let Commands::Minds {
            action: MindAction::Create { name, prefs, charter, .. },
        } = cli.command
        else {
            panic!("wrong command");
        };
        assert_eq!(name, "Ada");
        assert_eq!(prefs, vec![("tone".to_string(), "\"dry\"".to_string())]);
        assert_eq!(charter.principles, vec!["Be brief"]);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["mind", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn test_preferences_keep_json_types() {
        let prefs = preferences(vec![
            ("depth".into(), "3".into()),
            ("style".into(), "terse".into()),
            ("tags".into(), "[\"a\"]".into()),
        ]);
        assert_eq!(prefs["depth"], 3);
        assert_eq!(prefs["style"], "terse");
        assert!(prefs["tags"].is_array());
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("a\nb", 10), "a b");
        assert_eq!(truncate_output("héllo wörld", 5), "héllo...");
    }
}
