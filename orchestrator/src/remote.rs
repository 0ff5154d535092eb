// External native-code evaluator backends
//
// An Evaluated implementation delegates to a remote evaluator negotiated per
// programming language. The wire format is bytes-in/bytes-out JSON; backend
// failures surface as a distinguished error kind and never crash the engine.

use async_trait::async_trait;
use std::time::Duration;
use zobject::envelope::Envelope;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::value::ZObject;

/// One evaluator backend. The engine consults backends in registration
/// order; the first backend supporting the implementation's language wins.
#[async_trait(?Send)]
pub trait RemoteEvaluator {
    fn supports_language(&self, language: &str) -> bool;

    /// Evaluates a serialized call, bounded by the caller's remaining time
    /// budget when one is set.
    async fn evaluate(
        &self,
        call: &ZObject,
        remaining: Option<Duration>,
    ) -> RuntimeResult<Envelope>;
}

/// HTTP evaluator: POSTs the serialized call, expects a `Z22` result
/// envelope back.
pub struct HttpRemoteEvaluator {
    endpoint: String,
    languages: Vec<String>,
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpRemoteEvaluator {
    pub fn new(endpoint: &str, languages: Vec<String>) -> Self {
        HttpRemoteEvaluator {
            endpoint: endpoint.to_string(),
            languages,
            client: reqwest::Client::new(),
            default_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait(?Send)]
impl RemoteEvaluator for HttpRemoteEvaluator {
    fn supports_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }

    async fn evaluate(
        &self,
        call: &ZObject,
        remaining: Option<Duration>,
    ) -> RuntimeResult<Envelope> {
        let timeout = remaining.unwrap_or(self.default_timeout);
        log::debug!(
            "delegating call to evaluator at {} (budget {:?})",
            self.endpoint,
            timeout
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(&call.to_json())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                ZError::new(
                    ErrorKind::EvaluatorFailure,
                    format!("evaluator request failed: {}", e),
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ZError::new(
                ErrorKind::EvaluatorFailure,
                format!("evaluator answered {}", status),
            ));
        }
        let body: serde_json::Value = response.json().await.map_err(|e| {
            ZError::new(
                ErrorKind::EvaluatorFailure,
                format!("evaluator response was not JSON: {}", e),
            )
        })?;
        let z = ZObject::from_json(&body).map_err(|e| {
            ZError::new(
                ErrorKind::EvaluatorFailure,
                format!("evaluator response was not a structured value: {}", e),
            )
        })?;
        Envelope::from_zobject(&z).ok_or_else(|| {
            ZError::new(
                ErrorKind::EvaluatorFailure,
                "evaluator response was not a result envelope",
            )
        })
    }
}
