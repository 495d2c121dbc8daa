// Knowledge-engine queries (Wolfram short-answers style API).

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::tools::handlers::Handled;
use crate::tools::types::required_str;

const KNOWLEDGE_URL: &str = "https://api.wolframalpha.com/v1/result";

pub(crate) async fn knowledge_query(
    http: &reqwest::Client,
    settings: &Settings,
    args: &Value,
) -> Result<Handled> {
    let query = required_str(args, "query")?;
    let Some(app_id) = settings.knowledge_app_id.as_deref() else {
        bail!("knowledge engine app id is not configured");
    };

    let response = http
        .get(KNOWLEDGE_URL)
        .query(&[("appid", app_id), ("i", query)])
        .send()
        .await
        .context("failed to reach the knowledge engine")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("knowledge engine returned {}: {}", status, body);
    }

    let answer = response
        .text()
        .await
        .context("failed to read the knowledge engine response")?;
    Ok((answer.clone(), Some(json!(answer))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_app_id_is_an_error() {
        let http = reqwest::Client::new();
        let settings = Settings::default();
        let err = knowledge_query(&http, &settings, &json!({"query": "2+2"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
