//! Paper classification against a closed category set.
//!
//! [`Classifier::classify`] is total: every failure mode ends in
//! [`Category::Uncategorized`], with the cause kept in
//! [`Classification::failure`] for logging.

use std::sync::Arc;

use thiserror::Error;

use crate::api::{GenerateRequest, GenerateResponse, GenerativeApi};
use crate::category::{Category, CategorySet};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// Why a classification call fell back to `Uncategorized`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("endpoint still overloaded (HTTP {last_status}) after {attempts} attempts")]
    Overloaded { attempts: u32, last_status: u16 },
}

/// Outcome of classifying one paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// Requests made, including retries.
    pub attempts: u32,
    /// Set when the call degraded to `Uncategorized` because of an error.
    /// A well-formed reply naming no known category leaves this `None`.
    pub failure: Option<ClassifyError>,
}

impl Classification {
    fn failed(attempts: u32, error: ClassifyError) -> Self {
        Self {
            category: Category::Uncategorized,
            attempts,
            failure: Some(error),
        }
    }
}

/// Builds prompts, calls the endpoint with backoff and maps replies onto
/// the category set.
pub struct Classifier {
    api: Arc<dyn GenerativeApi>,
    categories: CategorySet,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Classifier {
    pub fn new(api: Arc<dyn GenerativeApi>, categories: CategorySet, policy: RetryPolicy) -> Self {
        Self {
            api,
            categories,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the timer used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The prompt sent for a paper. Deterministic for a given input.
    pub fn build_prompt(&self, title: &str, text: &str) -> String {
        format!(
            "Classify the following research paper into one of the predefined categories: {}.\n\
             Title: {}\n\
             Content: {}\n\
             Provide only the category name as output.",
            self.categories.joined(),
            title,
            text
        )
    }

    /// Classify one paper. Never fails; see [`Classification`].
    pub async fn classify(&self, title: &str, text: &str) -> Classification {
        let request = GenerateRequest::from_prompt(self.build_prompt(title, text));
        let mut attempt = 0;

        loop {
            attempt += 1;

            let response = match self.api.generate(&request).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(title, attempt, error = %e, "classification request failed");
                    return Classification::failed(attempt, ClassifyError::Transport(e.0));
                }
            };

            tracing::debug!(title, attempt, status = response.status, "classification response");

            if response.status == 200 {
                tracing::debug!(title, body = %response.body, "classification response body");
                return self.parse_success(title, attempt, &response.body);
            }

            if !RetryPolicy::is_retryable(response.status) {
                tracing::warn!(
                    title,
                    status = response.status,
                    body = %response.body,
                    "unexpected classification status"
                );
                return Classification::failed(
                    attempt,
                    ClassifyError::UnexpectedStatus {
                        status: response.status,
                        body: response.body,
                    },
                );
            }

            match self.policy.delay_after(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        title,
                        attempt,
                        status = response.status,
                        "endpoint overloaded, retrying in {:.0}s",
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    tracing::warn!(
                        title,
                        attempts = attempt,
                        status = response.status,
                        "endpoint overloaded, giving up"
                    );
                    return Classification::failed(
                        attempt,
                        ClassifyError::Overloaded {
                            attempts: attempt,
                            last_status: response.status,
                        },
                    );
                }
            }
        }
    }

    fn parse_success(&self, title: &str, attempts: u32, body: &str) -> Classification {
        let parsed: GenerateResponse = match serde_json::from_str(body) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(title, error = %e, "classification response is not valid JSON");
                return Classification::failed(
                    attempts,
                    ClassifyError::MalformedResponse(e.to_string()),
                );
            }
        };

        let reply = parsed.first_text();
        let category = self.categories.resolve(reply);
        if category.is_uncategorized() {
            tracing::warn!(
                title,
                reply = reply.trim(),
                "reply does not name a known category exactly"
            );
        }

        Classification {
            category,
            attempts,
            failure: None,
        }
    }
}
