use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use shelfwatch_common::DeliveryError;

use super::sink::NotifySink;

/// WeCom ("enterprise WeChat") incoming webhook sink posting markdown
/// messages. The endpoint signals acceptance with `errcode == 0` in an
/// otherwise 200 response, so both the HTTP status and the application code
/// are checked.
pub struct WeComWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WeComResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl WeComWebhook {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    fn payload(content: &str) -> serde_json::Value {
        json!({
            "msgtype": "markdown",
            "markdown": { "content": content },
        })
    }
}

#[async_trait]
impl NotifySink for WeComWebhook {
    async fn post(&self, content: &str) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&Self::payload(content))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(Box::new(e)))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = %status, "Webhook returned non-success status");
            return Err(DeliveryError::Rejected {
                errcode: i64::from(status.as_u16()),
                errmsg: format!("HTTP {status}"),
            });
        }

        let body: WeComResponse = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(Box::new(e)))?;

        if body.errcode != 0 {
            warn!(errcode = body.errcode, errmsg = %body.errmsg, "Webhook rejected message");
            return Err(DeliveryError::Rejected {
                errcode: body.errcode,
                errmsg: body.errmsg,
            });
        }

        Ok(())
    }

    fn measure(&self, content: &str) -> usize {
        serde_json::to_vec(&Self::payload(content))
            .map(|v| v.len())
            .unwrap_or(usize::MAX)
    }

    fn name(&self) -> &str {
        "wecom"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_counts_wire_bytes_with_escaping() {
        let sink = WeComWebhook::new("https://example.invalid/hook".to_string());
        // The newline serializes as two bytes (\n) and the CJK char as three.
        let content = "a\n書";
        let ascii = "a-x";
        assert!(sink.measure(content) > sink.measure(ascii));

        let expected = serde_json::to_vec(&WeComWebhook::payload(content)).unwrap().len();
        assert_eq!(sink.measure(content), expected);
    }
}
