//! Model invocation.
//!
//! The pipeline talks to the model through the [`ModelInvoker`] trait so
//! tests can substitute a deterministic stand-in. The production
//! implementation, [`ChatClient`], posts to an OpenAI-compatible
//! `/chat/completions` endpoint and retries transient failures (rate limits,
//! 5xx, transport errors, timeouts) with exponential backoff *inside* the
//! call. One invocation therefore yields exactly one outcome, and the
//! pipeline never re-dispatches an assignment.

use std::time::Duration;

use serde_json::{json, Value};

use crate::config::Config;

/// Outcome of one model invocation, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// The model produced a non-empty reply.
    Text(String),
    /// Every attempt timed out.
    Timeout,
    /// The model returned an empty reply.
    Refused,
    /// Terminal transport or API failure.
    Error(String),
}

/// A re-entrant, thread-safe model invocation function.
///
/// Implementations must tolerate at least as many concurrent calls as the
/// pipeline's worker pool size.
pub trait ModelInvoker: Send + Sync {
    /// Send one `(system, user)` exchange and return the reply.
    fn call(&self, system: &str, user: &str) -> ModelReply;
}

/// Blocking chat-completions client with retry and exponential backoff.
pub struct ChatClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model_name: String,
    temperature: f64,
    max_tokens: u32,
    retry_times: u32,
    retry_delay: Duration,
}

impl ChatClient {
    /// Build a client from the runtime configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let endpoint = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        Self {
            agent,
            endpoint,
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_times: config.retry_times.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs.max(1)),
        }
    }

    /// One HTTP attempt.
    fn attempt(&self, system: &str, user: &str) -> Attempt {
        let body = json!({
            "model": self.model_name,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(body);

        match response {
            Ok(response) => match response.into_json::<Value>() {
                Ok(parsed) => Attempt::Reply(extract_content(&parsed)),
                Err(e) => Attempt::Retry(format!("malformed response body: {e}")),
            },
            // Rate limits and server errors are transient.
            Err(ureq::Error::Status(code, response)) if code == 429 || code >= 500 => {
                let detail = response.into_string().unwrap_or_default();
                Attempt::Retry(format!("HTTP {code}: {}", truncate(&detail, 200)))
            }
            // Other statuses (auth failures, bad requests) will not improve
            // on retry.
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                Attempt::Fatal(format!("HTTP {code}: {}", truncate(&detail, 200)))
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Attempt::TimedOut
                } else {
                    Attempt::Retry(format!("transport error: {transport}"))
                }
            }
        }
    }
}

impl ModelInvoker for ChatClient {
    fn call(&self, system: &str, user: &str) -> ModelReply {
        let mut last: Option<Attempt> = None;

        for attempt_no in 0..self.retry_times {
            if attempt_no > 0 {
                let delay = self.retry_delay * 2u32.pow(attempt_no - 1);
                log::warn!(
                    "retrying model call in {delay:?} (attempt {}/{})",
                    attempt_no + 1,
                    self.retry_times
                );
                std::thread::sleep(delay);
            }

            match self.attempt(system, user) {
                Attempt::Reply(Some(text)) if !text.trim().is_empty() => {
                    if attempt_no > 0 {
                        log::info!("model call succeeded on attempt {}", attempt_no + 1);
                    }
                    return ModelReply::Text(text);
                }
                Attempt::Reply(_) => return ModelReply::Refused,
                Attempt::Fatal(message) => {
                    log::error!("non-retryable model error: {message}");
                    return ModelReply::Error(message);
                }
                outcome @ (Attempt::Retry(_) | Attempt::TimedOut) => {
                    if let Attempt::Retry(message) = &outcome {
                        log::warn!("transient model error: {message}");
                    } else {
                        log::warn!("model call timed out");
                    }
                    last = Some(outcome);
                }
            }
        }

        match last {
            Some(Attempt::TimedOut) => ModelReply::Timeout,
            Some(Attempt::Retry(message)) => ModelReply::Error(message),
            _ => ModelReply::Error("model call failed with no attempts made".to_string()),
        }
    }
}

enum Attempt {
    /// HTTP 200; payload may still lack content.
    Reply(Option<String>),
    /// Transient failure worth another attempt.
    Retry(String),
    /// Attempt hit the per-request timeout.
    TimedOut,
    /// Do not retry.
    Fatal(String),
}

/// Pull `choices[0].message.content` out of a chat-completions payload.
fn extract_content(payload: &Value) -> Option<String> {
    payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Walk the error source chain looking for an IO timeout.
fn is_timeout(transport: &ureq::Transport) -> bool {
    use std::error::Error as _;
    let mut source = transport.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = inner.source();
    }
    transport.to_string().contains("timed out")
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
