use chunav::cli::{parse_filters, Cli, Commands, ConfigAction};
use chunav::config::{Config, ConfigValidator};
use chunav::engine::{InvalidateScope, QaEngine};
use chunav::error::Result;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Ask {
            question,
            filter,
            session,
            json,
        } => {
            cmd_ask(cli.config, &question, &filter, session.as_deref(), json).await?;
        }
        Commands::Stats => {
            cmd_stats(cli.config)?;
        }
        Commands::Invalidate { scope } => {
            cmd_invalidate(cli.config, &scope)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "chunav=debug" } else { "chunav=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(p) => p,
        None => Config::default_path()?,
    };

    let mut config = if path.exists() {
        Config::load(&path)?
    } else {
        tracing::info!("No config file at {}, using defaults", path.display());
        Config::default()
    };

    config.apply_env_overrides();
    ConfigValidator::validate(&config)?;
    Ok(config)
}

async fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    raw_filters: &[String],
    session: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let filters = parse_filters(raw_filters)?;

    let engine = QaEngine::from_config(&config)?;
    let session = session
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let answer = engine.answer(question, &filters, Some(&session)).await;

    if json {
        println!("{}", to_pretty_json(&answer, "answer")?);
        return Ok(());
    }

    println!("{}", answer.answer_text);

    if !answer.sources.is_empty() {
        println!("\nSources:");
        for source in &answer.sources {
            println!("  [{}] ({:.3}) {}", source.document_id, source.score, source.snippet);
        }
    }

    if answer.degraded {
        println!("\n⚠ This answer is best-effort: a component was unavailable.");
    }
    if answer.incomplete {
        println!("⚠ The question could not be fully resolved.");
    }

    Ok(())
}

fn cmd_stats(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = QaEngine::from_config(&config)?;
    let stats = engine.stats();
    println!("{}", to_pretty_json(&stats, "stats")?);
    Ok(())
}

fn to_pretty_json<T: serde::Serialize>(value: &T, context: &str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| chunav::error::ChunavError::Json {
        source: e,
        context: format!("Serializing {}", context),
    })
}

fn cmd_invalidate(config_path: Option<PathBuf>, scope: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let scope: InvalidateScope = scope.parse()?;
    let engine = QaEngine::from_config(&config)?;
    let removed = engine.invalidate_cache(scope);
    println!("✓ Invalidated {} cache entries", removed);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(p) => p,
                None => Config::default_path()?,
            };
            let mut config = Config::load(&path)?;
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration at {} is valid", path.display());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(p) => p,
                None => Config::default_path()?,
            };
            if path.exists() && !force {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
                return Ok(());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| chunav::error::ChunavError::Io {
                    source: e,
                    context: format!("Creating config directory {}", parent.display()),
                })?;
            }
            Config::default().save(&path)?;
            println!("✓ Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
