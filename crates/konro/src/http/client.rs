//! Consuming a remote model endpoint as a [`Model`].

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::wire::{
    ErrorResponse, EvaluateRequest, EvaluateResponse, InfoResponse, InputSizesResponse,
    OutputSizesResponse, SizesRequest,
};
use crate::error::{Error, Result};
use crate::model::{Config, Model, Vector};

/// A [`Model`] backed by a remote server speaking the wire protocol.
///
/// One instance is bound to one named model at one base URL. The underlying
/// `reqwest::Client` pools connections and is cheap to clone with the
/// instance.
#[derive(Debug, Clone)]
pub struct HttpModel {
    client: reqwest::Client,
    base_url: String,
    name: String,
}

impl HttpModel {
    /// Points a client at `url` (e.g. `http://localhost:4242`) for the model
    /// named `name`.
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        let mut base_url = url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            name: name.into(),
        }
    }

    /// The model name requests are issued under.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// One POST exchange: encode, send, decode either the expected body or
    /// the protocol error envelope.
    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<Resp>()
                .await
                .map_err(|e| Error::Protocol(format!("malformed response body: {e}")))
        } else {
            match response.json::<ErrorResponse>().await {
                Ok(body) => Err(Error::from_wire(&body.error.kind, body.error.message)),
                Err(_) => Err(Error::Transport(format!("server returned {status}"))),
            }
        }
    }

    async fn info(&self) -> Result<InfoResponse> {
        let response = self
            .client
            .get(self.endpoint("info"))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        response
            .json::<InfoResponse>()
            .await
            .map_err(|e| Error::Protocol(format!("malformed info body: {e}")))
    }
}

#[async_trait]
impl Model for HttpModel {
    async fn evaluate(&self, input: Vec<Vector>, config: Config) -> Result<Vec<Vector>> {
        let request = EvaluateRequest {
            name: self.name.clone(),
            input,
            config,
        };
        let response: EvaluateResponse = self.post("evaluate", &request).await?;
        if response.output.len() != request.input.len() {
            return Err(Error::Protocol(format!(
                "server returned {} outputs for {} inputs",
                response.output.len(),
                request.input.len()
            )));
        }
        Ok(response.output)
    }

    async fn input_sizes(&self, config: &Config) -> Result<Vec<u64>> {
        let request = SizesRequest {
            name: self.name.clone(),
            config: config.clone(),
        };
        let response: InputSizesResponse = self.post("input_sizes", &request).await?;
        Ok(response.input_sizes)
    }

    async fn output_sizes(&self, config: &Config) -> Result<Vec<u64>> {
        let request = SizesRequest {
            name: self.name.clone(),
            config: config.clone(),
        };
        let response: OutputSizesResponse = self.post("output_sizes", &request).await?;
        Ok(response.output_sizes)
    }

    /// Resolved from the server's `/info` listing; a server that cannot be
    /// reached or does not list the model reports no evaluate support.
    async fn supports_evaluate(&self) -> bool {
        match self.info().await {
            Ok(info) => info
                .models
                .iter()
                .any(|m| m.name == self.name && m.supports_evaluate),
            Err(err) => {
                tracing::warn!(%err, model = %self.name, "info request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed() {
        let model = HttpModel::new("http://localhost:4242///", "forward");
        assert_eq!(model.endpoint("evaluate"), "http://localhost:4242/evaluate");
    }

    #[test]
    fn name_is_preserved() {
        let model = HttpModel::new("http://localhost:4242", "forward");
        assert_eq!(model.name(), "forward");
    }
}
