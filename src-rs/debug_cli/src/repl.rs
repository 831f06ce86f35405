use chrono::{Local, NaiveDate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use trading_tasks_rs::{Credential, HttpBackend, Session, SessionError, TaskEvent};

use crate::models::CLIConfig;
use crate::render;

pub struct REPL {
    pub config: CLIConfig,
    pub session: Session<HttpBackend>,
    session_replaced: bool,
}

impl REPL {
    pub fn new(config: CLIConfig, session: Session<HttpBackend>) -> Self {
        Self {
            config,
            session,
            session_replaced: false,
        }
    }

    pub async fn run(&mut self) {
        render::banner(&self.config);
        if let Some(token) = self.config.token.clone() {
            self.session.resume(Credential::bearer(&token));
            render::info("resumed session from token");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut events = self.session.subscribe();
        render::prompt();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line.trim().to_string(),
                        _ => break,
                    };
                    if line.starts_with('/') {
                        if self.handle_command(&line).await {
                            break;
                        }
                    } else if !line.is_empty() {
                        self.analyze(&normalize_ticker(&line)).await;
                    }
                    if self.session_replaced {
                        events = self.session.subscribe();
                        self.session_replaced = false;
                    }
                    render::prompt();
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if self.show_event(&event) {
                            render::prompt();
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        render::info(&format!("missed {} updates, run /tasks", skipped));
                    }
                    Err(RecvError::Closed) => events = self.session.subscribe(),
                }
            }
        }
    }

    async fn handle_command(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").trim_start_matches('/');
        let rest = parts.next().unwrap_or("").trim();
        match cmd {
            "exit" | "quit" => return true,
            "help" => render::help(),
            "register" => match credentials(rest) {
                Some((user, pass)) => match self.session.register(user, pass).await {
                    Ok(()) => render::info("registered, now /login"),
                    Err(SessionError::RegistrationFailed(err)) if err.is_conflict() => {
                        render::error("registration failed, the username might already be taken")
                    }
                    Err(err) => render::error(&err.to_string()),
                },
                None => render::error("usage: /register <user> <pass>"),
            },
            "login" => match credentials(rest) {
                Some((user, pass)) => match self.session.login(user, pass).await {
                    Ok(()) => render::info("logged in"),
                    Err(SessionError::LoginFailed(err)) if err.is_unauthorized() => {
                        render::error("login failed, check username and password")
                    }
                    Err(err) => render::error(&err.to_string()),
                },
                None => render::error("usage: /login <user> <pass>"),
            },
            "token" => {
                if rest.is_empty() {
                    render::error("usage: /token <token>");
                } else {
                    self.session.resume(Credential::bearer(rest));
                    render::info("token updated");
                }
            }
            "logout" => {
                self.session.logout();
                render::info("logged out");
            }
            "analyze" => {
                let ticker = if rest.is_empty() {
                    self.config.ticker.clone()
                } else {
                    normalize_ticker(rest)
                };
                self.analyze(&ticker).await;
            }
            "ticker" => {
                if rest.is_empty() {
                    render::info(&format!("ticker: {}", self.config.ticker));
                } else {
                    self.config.ticker = normalize_ticker(rest);
                    render::info("ticker updated");
                }
            }
            "date" => match parse_date(rest) {
                Some(date) => {
                    self.config.date = date;
                    render::info("date updated");
                }
                None => render::error("invalid date, use YYYY-MM-DD or today"),
            },
            "deep" => {
                self.config.deep_think_llm = parse_model(rest);
                render::info("deep-reasoning model updated");
            }
            "quick" => {
                self.config.quick_think_llm = parse_model(rest);
                render::info("fast-reasoning model updated");
            }
            "tasks" => render::tasks(&self.session.tasks()),
            "task" => match self.session.task(rest) {
                Some(task) => render::task(&task, self.config.debug),
                None => render::error("unknown task id"),
            },
            "refresh" => match self.session.refresh().await {
                Ok(outcomes) => render::info(&format!("polled {} task(s)", outcomes.len())),
                Err(err) => render::error(&err.to_string()),
            },
            "error" => match self.session.last_error() {
                Some(message) => render::info(&message),
                None => render::info("no errors"),
            },
            "debug" => {
                if rest.is_empty() {
                    self.config.debug = !self.config.debug;
                    render::info(&format!("debug: {}", self.config.debug));
                } else if let Some(flag) = parse_on_off(rest) {
                    self.config.debug = flag;
                    render::info(&format!("debug: {}", self.config.debug));
                } else {
                    render::error("invalid debug flag");
                }
            }
            "config" => render::config(&self.config, self.session.is_authenticated()),
            "base" => {
                if rest.is_empty() {
                    render::info(&format!("base: {}", self.config.client.base_url));
                } else {
                    let mut client = self.config.client.clone();
                    client.base_url = rest.to_string();
                    match Session::connect(client.clone()) {
                        Ok(session) => {
                            self.config.client = client;
                            self.session = session;
                            self.session_replaced = true;
                            render::info("base url updated, log in again");
                        }
                        Err(err) => render::error(&err.to_string()),
                    }
                }
            }
            _ => render::info("unknown command, type /help"),
        }
        false
    }

    async fn analyze(&mut self, ticker: &str) {
        let params = self.config.params(Local::now().date_naive());
        match self.session.submit(ticker, &params).await {
            Ok(id) => render::info(&format!("submitted {} as {}", ticker, id)),
            Err(SessionError::NotAuthenticated) => render::error("log in first (/login <user> <pass>)"),
            Err(err) => render::error(&format!("failed to submit task: {}", err)),
        }
    }

    /// Prints background updates. Returns whether anything was written.
    fn show_event(&self, event: &TaskEvent) -> bool {
        match event {
            // reported by the command that caused them
            TaskEvent::Submitted { .. } | TaskEvent::SubmissionFailed { .. } => false,
            TaskEvent::StatusChanged { task_id, status } => {
                println!();
                render::event(event);
                if status.is_terminal() {
                    if let Some(task) = self.session.task(task_id) {
                        render::task(&task, self.config.debug);
                    }
                }
                true
            }
            TaskEvent::PollFailed { .. } => {
                if self.config.debug {
                    println!();
                    render::event(event);
                }
                self.config.debug
            }
        }
    }
}

fn normalize_ticker(value: &str) -> String {
    value.trim().to_uppercase()
}

fn credentials(rest: &str) -> Option<(&str, &str)> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(pass), None) => Some((user, pass)),
        _ => None,
    }
}

/// `Some(None)` resets to "today".
fn parse_date(value: &str) -> Option<Option<NaiveDate>> {
    match value {
        "" | "today" => Some(None),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").ok().map(Some),
    }
}

fn parse_model(value: &str) -> Option<String> {
    match value {
        "" | "-" | "default" => None,
        other => Some(other.to_string()),
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
