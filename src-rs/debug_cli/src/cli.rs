use chrono::NaiveDate;
use clap::Parser;
use trading_tasks_rs::helpers::load_client_config;

use crate::models::CLIConfig;

const DEFAULT_TICKER: &str = "BTC-USD";

#[derive(Debug, Parser)]
#[command(name = "trading-tasks-cli")]
#[command(about = "Interactive dashboard for trading analysis tasks")]
#[command(version = "0.1.0")]
struct Args {
    /// Backend base URL (falls back to TRADING_TASKS_URL)
    #[arg(long = "base")]
    base_url: Option<String>,

    #[arg(long, default_value = DEFAULT_TICKER, env = "TRADING_TASKS_TICKER")]
    ticker: String,

    /// Evaluation date (YYYY-MM-DD); today when omitted
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Deep-reasoning model override
    #[arg(long = "deep", env = "TRADING_TASKS_DEEP_LLM")]
    deep_think_llm: Option<String>,

    /// Fast-reasoning model override
    #[arg(long = "quick", env = "TRADING_TASKS_QUICK_LLM")]
    quick_think_llm: Option<String>,

    /// Resume with a previously issued bearer token
    #[arg(long, env = "TRADING_TASKS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print raw result payloads
    #[arg(long)]
    debug: bool,
}

pub fn parse_config() -> CLIConfig {
    let args = Args::parse();
    let mut client = load_client_config();
    if let Some(base_url) = args.base_url {
        client.base_url = base_url;
    }

    CLIConfig {
        client,
        ticker: args.ticker.trim().to_uppercase(),
        date: args.date,
        deep_think_llm: non_blank(args.deep_think_llm),
        quick_think_llm: non_blank(args.quick_think_llm),
        token: non_blank(args.token),
        debug: args.debug,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
