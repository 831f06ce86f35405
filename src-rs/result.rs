use serde::Serialize;
use serde_json::Value;

/// The parts of a successful analysis worth showing at a glance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Decision {
    pub action: Option<String>,
    pub confidence: Option<String>,
    pub reasoning: Option<String>,
}

impl Decision {
    pub fn from_result(result: &Value) -> Self {
        let decision = result.get("final_trade_decision");
        Self {
            action: decision.and_then(|d| d.get("action")).and_then(scalar_text),
            confidence: decision.and_then(|d| d.get("confidence")).and_then(scalar_text),
            reasoning: result.get("investment_plan").and_then(scalar_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.confidence.is_none() && self.reasoning.is_none()
    }
}

/// Text for a FAILURE payload.
pub fn failure_message(result: Option<&Value>) -> String {
    match result {
        None | Some(Value::Null) => "Unknown error".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(num) => Some(num.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
