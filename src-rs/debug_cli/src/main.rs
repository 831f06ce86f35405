mod cli;
mod models;
mod repl;
mod render;

use trading_tasks_rs::helpers::init_tracing;
use trading_tasks_rs::Session;

use repl::REPL;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing("trading_tasks_rs=warn");

    let config = cli::parse_config();
    let session = match Session::connect(config.client.clone()) {
        Ok(session) => session,
        Err(err) => {
            render::error(&err.to_string());
            return;
        }
    };
    let mut repl = REPL::new(config, session);
    repl.run().await;
}
