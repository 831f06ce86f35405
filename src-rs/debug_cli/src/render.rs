use std::io::{self, Write};

use trading_tasks_rs::result::{failure_message, Decision};
use trading_tasks_rs::{Task, TaskEvent, TaskStatus};

use crate::models::CLIConfig;

pub fn banner(cfg: &CLIConfig) {
    println!("Trading Tasks Dashboard");
    println!("API: {}", cfg.client.base_url);
    println!(
        "Ticker: {}  Deep: {}  Quick: {}",
        cfg.ticker,
        cfg.deep_think_llm.as_deref().unwrap_or("default"),
        cfg.quick_think_llm.as_deref().unwrap_or("default"),
    );
    println!("Type /help for commands.");
}

pub fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

pub fn help() {
    println!("Commands:");
    println!("  /help                     Show commands");
    println!("  /exit | /quit             Exit");
    println!("  /register <user> <pass>   Create an account");
    println!("  /login <user> <pass>      Log in and start polling");
    println!("  /token <token>            Resume with an issued token");
    println!("  /logout                   Stop polling and drop the token");
    println!("  /analyze [ticker]         Submit an analysis");
    println!("  /ticker <symbol>          Set the default ticker");
    println!("  /date <YYYY-MM-DD|today>  Set the evaluation date");
    println!("  /deep <model|->           Deep-reasoning model override");
    println!("  /quick <model|->          Fast-reasoning model override");
    println!("  /tasks                    List tracked tasks");
    println!("  /task <id>                Show one task");
    println!("  /refresh                  Poll unfinished tasks now");
    println!("  /error                    Show the last failure");
    println!("  /debug [on|off]           Toggle raw result output");
    println!("  /config                   Show current config");
    println!("  /base <url>               Update base URL (resets session)");
}

pub fn tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks submitted yet");
        return;
    }
    for task in tasks {
        println!("[{}] {} - {}", task.status, task.id, task.subject);
    }
}

pub fn task(task: &Task, debug: bool) {
    println!("task {} | ticker {}", task.id, task.subject);
    println!("  status: {}", task.status);
    println!("  submitted: {}", task.submitted_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = task.finished_at {
        println!("  finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
    match task.status {
        TaskStatus::Success => {
            if let Some(result) = &task.result {
                decision(&Decision::from_result(result));
                if debug {
                    println!("  raw: {}", result);
                }
            }
        }
        TaskStatus::Failure => println!("  failed: {}", failure_message(task.result.as_ref())),
        _ => println!("  running..."),
    }
}

fn decision(decision: &Decision) {
    if decision.is_empty() {
        println!("  (no decision in result)");
        return;
    }
    println!("  decision: {}", decision.action.as_deref().unwrap_or("-"));
    println!("  confidence: {}", decision.confidence.as_deref().unwrap_or("-"));
    if let Some(reasoning) = &decision.reasoning {
        println!("  reasoning: {}", reasoning);
    }
}

pub fn event(event: &TaskEvent) {
    match event {
        TaskEvent::Submitted { task_id, subject } => println!("submitted {} as {}", subject, task_id),
        TaskEvent::StatusChanged { task_id, status } => println!("[{}] {}", status, task_id),
        TaskEvent::PollFailed { task_id, error } => eprintln!("status check failed for {}: {}", task_id, error),
        TaskEvent::SubmissionFailed { subject, error } => eprintln!("submit failed for {}: {}", subject, error),
    }
}

pub fn config(cfg: &CLIConfig, logged_in: bool) {
    println!("config:");
    println!("  base: {}", cfg.client.base_url);
    println!("  poll: {}s", cfg.client.poll_interval.as_secs());
    println!("  ticker: {}", cfg.ticker);
    match cfg.date {
        Some(date) => println!("  date: {}", date),
        None => println!("  date: today"),
    }
    println!("  deep: {}", cfg.deep_think_llm.as_deref().unwrap_or("default"));
    println!("  quick: {}", cfg.quick_think_llm.as_deref().unwrap_or("default"));
    println!("  debug: {}", cfg.debug);
    println!("  logged in: {}", logged_in);
}

pub fn info(msg: &str) {
    println!("{}", msg);
}

pub fn error(msg: &str) {
    eprintln!("error: {}", msg);
}
