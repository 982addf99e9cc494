//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "chunav",
    version,
    about = "Natural-language query pipeline for election data",
    long_about = "Chunav answers natural-language questions about election data: it classifies \
                  each question, routes it to exact computation or semantic retrieval, and \
                  decomposes multi-step questions into simpler ones, with layered caching and \
                  adaptive search-effort tuning."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/chunav/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a natural-language question about the election data
    Ask {
        /// Question text
        question: String,

        /// Filter in key=value form (e.g. district=kaski); repeatable
        #[arg(short, long, value_name = "KEY=VALUE")]
        filter: Vec<String>,

        /// Session identifier attached to the answer
        #[arg(short, long)]
        session: Option<String>,

        /// Show the full answer in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show cache, pool, and tuner statistics
    Stats,

    /// Clear cached entries
    Invalidate {
        /// Scope: all, everything, embedding, search, structured, answer
        #[arg(default_value = "all")]
        scope: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse repeated key=value filter arguments
pub fn parse_filters(
    raw: &[String],
) -> crate::error::Result<std::collections::BTreeMap<String, String>> {
    let mut filters = std::collections::BTreeMap::new();
    for item in raw {
        match item.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                filters.insert(key.trim().to_lowercase(), value.trim().to_lowercase());
            }
            _ => {
                return Err(crate::error::ChunavError::Config(format!(
                    "Invalid filter '{}', expected key=value",
                    item
                )));
            }
        }
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_filters() {
        let filters =
            parse_filters(&["district=Kaski".to_string(), "gender=female".to_string()]).unwrap();
        assert_eq!(filters.get("district").map(String::as_str), Some("kaski"));
        assert_eq!(filters.len(), 2);
    }

    #[test]
    fn test_parse_filters_rejects_malformed() {
        assert!(parse_filters(&["district".to_string()]).is_err());
        assert!(parse_filters(&["=kaski".to_string()]).is_err());
    }
}
