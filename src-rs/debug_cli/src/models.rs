use chrono::NaiveDate;
use trading_tasks_rs::{AnalysisParams, ClientConfig};

#[derive(Clone, Debug)]
pub struct CLIConfig {
    pub client: ClientConfig,
    pub ticker: String,
    pub date: Option<NaiveDate>,
    pub deep_think_llm: Option<String>,
    pub quick_think_llm: Option<String>,
    pub token: Option<String>,
    pub debug: bool,
}

impl CLIConfig {
    /// Overrides sent with the next `/analyze`. An unset date means today.
    pub fn params(&self, today: NaiveDate) -> AnalysisParams {
        AnalysisParams {
            date: Some(self.date.unwrap_or(today)),
            deep_think_llm: self.deep_think_llm.clone(),
            quick_think_llm: self.quick_think_llm.clone(),
        }
    }
}
