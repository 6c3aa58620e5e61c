//! Command-line argument parsing for MedEase.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use medease::config::Config;
use medease::error::Result;
use medease::query::{CompiledQuery, FilterCompiler, Filters, ParamStyle};
use medease::schema::Table;
use medease::warehouse::TableCatalog;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid log format: {s}. Expected: text or json")),
        }
    }
}

/// Pharmacy inventory and prescription gateway with an SMS-capable agent.
#[derive(Parser, Debug)]
#[command(name = "medease")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, value_name = "HOST", global = true)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, value_name = "PORT", env = "PORT", global = true)]
    pub port: Option<u16>,

    /// Use the in-memory warehouse, SMS gateway and LLM
    #[arg(long, global = true)]
    pub mock: bool,

    /// LLM provider to use (gemini, openai, mock)
    #[arg(long, value_name = "PROVIDER", global = true)]
    pub llm: Option<String>,

    /// Log output format (text or json)
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    pub log_format: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print the SQL and parameters compiled for a table and filters
    Compile(CompileArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CompileArgs {
    /// Table to query (inventory, prescriptions, users)
    pub table: String,

    /// Filters as JSON, e.g. '{"currentStock": ["<=", 10]}'
    #[arg(default_value = "{}")]
    pub filters: String,

    /// Row limit
    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    /// Render values inline instead of as named parameters
    #[arg(long)]
    pub inline: bool,
}

impl CompileArgs {
    /// Compiles the filters against the table's schema.
    pub fn compile(&self, catalog: &TableCatalog) -> Result<CompiledQuery> {
        let table: Table = self
            .table
            .parse()
            .map_err(medease::error::MedeaseError::config)?;
        let filters: serde_json::Value = serde_json::from_str(&self.filters).map_err(|e| {
            medease::error::MedeaseError::config(format!("Filters are not valid JSON: {e}"))
        })?;
        let filters = Filters::from_json(&filters)?;

        let style = if self.inline {
            ParamStyle::Inline
        } else {
            ParamStyle::Named
        };
        let query = FilterCompiler::new(table.schema())
            .with_style(style)
            .compile_select(catalog.get(table), &filters, self.limit)?;
        Ok(query)
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the subcommand, defaulting to `serve`.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Parses the log format from the --log-format argument.
    pub fn parse_log_format(&self) -> std::result::Result<LogFormat, String> {
        self.log_format.parse()
    }

    /// Applies command-line overrides on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.mock {
            config.use_mocks();
        }
        if let Some(llm) = &self.llm {
            config.llm.provider = llm.clone();
        }
    }
}
