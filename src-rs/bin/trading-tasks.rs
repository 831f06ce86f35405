use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use trading_tasks_rs::helpers::{init_tracing, load_client_config};
use trading_tasks_rs::result::{failure_message, Decision};
use trading_tasks_rs::{AnalysisParams, Credential, HttpBackend, Session, Task, TaskEvent, TaskStatus};

#[derive(Debug, Parser)]
#[command(name = "trading-tasks")]
#[command(about = "Submit trading analyses and follow them until they finish")]
#[command(version = "0.1.0")]
struct Cli {
    /// Backend base URL (falls back to TRADING_TASKS_URL, then localhost:8000)
    #[arg(long)]
    base_url: Option<String>,

    #[arg(short, long, env = "TRADING_TASKS_USERNAME")]
    username: Option<String>,

    #[arg(short, long, env = "TRADING_TASKS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Previously issued bearer token; skips login
    #[arg(long, env = "TRADING_TASKS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account with --username/--password
    Register,
    /// Submit an analysis and wait for the outcome
    Analyze(AnalyzeArgs),
    /// Show the current status of a task id
    Status { task_id: String },
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(default_value = "BTC-USD")]
    ticker: String,

    /// Evaluation date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    deep_think_llm: Option<String>,

    #[arg(long)]
    quick_think_llm: Option<String>,

    /// Print the task id and exit without waiting
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing("trading_tasks_rs=info");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, String> {
    let mut config = load_client_config();
    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = base_url;
    }
    let mut session = Session::connect(config).map_err(|err| err.to_string())?;

    if let Command::Register = cli.command {
        let (username, password) = user_and_password(&cli)?;
        session
            .register(username, password)
            .await
            .map_err(|err| err.to_string())?;
        println!("registered {}", username);
        return Ok(ExitCode::SUCCESS);
    }

    match &cli.token {
        Some(token) => session.resume(Credential::bearer(token)),
        None => {
            let (username, password) = user_and_password(&cli)?;
            session
                .login(username, password)
                .await
                .map_err(|err| err.to_string())?;
        }
    }

    match cli.command {
        Command::Register => Ok(ExitCode::SUCCESS),
        Command::Analyze(args) => analyze(&mut session, args).await,
        Command::Status { task_id } => status(&session, &task_id).await,
    }
}

async fn analyze(session: &mut Session<HttpBackend>, args: AnalyzeArgs) -> Result<ExitCode, String> {
    let params = AnalysisParams {
        date: Some(args.date.unwrap_or_else(|| chrono::Local::now().date_naive())),
        deep_think_llm: args.deep_think_llm,
        quick_think_llm: args.quick_think_llm,
    };

    let mut events = session.subscribe();
    let task_id = session
        .submit(&args.ticker, &params)
        .await
        .map_err(|err| err.to_string())?;
    println!("submitted {} as {}", args.ticker, task_id);
    if args.no_wait {
        return Ok(ExitCode::SUCCESS);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted; {} keeps running on the backend", task_id);
                return Ok(ExitCode::from(130));
            }
            event = events.recv() => match event {
                Ok(TaskEvent::StatusChanged { task_id: id, status }) if id == task_id => {
                    println!("[{}] {}", status, id);
                    if status.is_terminal() {
                        break;
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err("event stream closed".to_string()),
            }
        }
    }

    let task = session
        .task(&task_id)
        .ok_or_else(|| format!("task {} disappeared", task_id))?;
    print_outcome(&task);
    session.logout();
    Ok(match task.status {
        TaskStatus::Success => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn status(session: &Session<HttpBackend>, task_id: &str) -> Result<ExitCode, String> {
    let report = session.lookup(task_id).await.map_err(|err| err.to_string())?;
    println!("[{}] {}", report.status, task_id);
    match report.status {
        TaskStatus::Success => print_decision(report.result.as_ref()),
        TaskStatus::Failure => println!("failed: {}", failure_message(report.result.as_ref())),
        _ => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn print_outcome(task: &Task) {
    match task.status {
        TaskStatus::Success => print_decision(task.result.as_ref()),
        _ => println!("failed: {}", failure_message(task.result.as_ref())),
    }
}

fn print_decision(result: Option<&serde_json::Value>) {
    let Some(result) = result else {
        println!("no result payload");
        return;
    };
    let decision = Decision::from_result(result);
    if decision.is_empty() {
        println!("{}", result);
        return;
    }
    println!("decision:   {}", decision.action.unwrap_or_default());
    println!("confidence: {}", decision.confidence.unwrap_or_default());
    println!("reasoning:  {}", decision.reasoning.unwrap_or_default());
}

fn user_and_password(cli: &Cli) -> Result<(&str, &str), String> {
    match (&cli.username, &cli.password) {
        (Some(user), Some(pass)) => Ok((user.as_str(), pass.as_str())),
        _ => Err("--username and --password (or TRADING_TASKS_TOKEN) are required".to_string()),
    }
}
