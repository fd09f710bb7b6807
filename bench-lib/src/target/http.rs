use std::time::Duration;

use rama::{
    Layer as _, Service as _,
    error::extra::OpaqueError,
    http::{
        BodyExtractExt as _, HeaderValue, Request, Response, Uri,
        client::EasyHttpWebClient,
        layer::{
            map_request_body::MapRequestBodyLayer, map_response_body::MapResponseBodyLayer,
            required_header::AddRequiredRequestHeadersLayer, timeout::TimeoutLayer,
        },
        service::client::HttpClientExt as _,
    },
    layer::MapErrLayer,
    service::BoxService,
    telemetry::tracing,
};

use serde::Deserialize;

use super::{PromptRequest, Target, TargetError};
use crate::{aggregate::Metadata, utils::env::client_identifier};

/// A completion endpoint reachable over HTTP(S).
///
/// Prompts are POSTed as JSON (`prompt`, `max_tokens`, `temperature` and
/// optionally `model`); the response is expected to carry a `choices`
/// array of `{ "text": ... }` objects.
pub struct HttpTarget {
    uri: Uri,
    model: Option<String>,
    client: BoxService<Request, Response, OpaqueError>,
}

impl std::fmt::Debug for HttpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTarget")
            .field("uri", &self.uri)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpTarget {
    /// Create a target for `uri`.
    ///
    /// `request_timeout` should be larger than the fail latency used by the
    /// search, so that slow responses are still observed and classified
    /// as failures by latency rather than by transport error.
    pub fn new(uri: Uri, model: Option<String>, request_timeout: Duration) -> Self {
        let client = (
            MapResponseBodyLayer::new_boxed_streaming_body(),
            MapErrLayer::into_opaque_error(),
            TimeoutLayer::new(request_timeout),
            AddRequiredRequestHeadersLayer::new()
                .with_user_agent_header_value(HeaderValue::from_static(client_identifier())),
            MapRequestBodyLayer::new_boxed_streaming_body(),
        )
            .into_layer(EasyHttpWebClient::default())
            .boxed();

        Self { uri, model, client }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

#[derive(Debug, serde::Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(flatten)]
    request: &'a PromptRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    pub(crate) choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub(crate) text: String,
}

impl Target for HttpTarget {
    async fn send_prompt(&self, request: &PromptRequest) -> Result<Vec<String>, TargetError> {
        let body = CompletionRequest {
            model: self.model.as_deref(),
            request,
        };

        let resp = self
            .client
            .post(self.uri.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| TargetError::Unavailable(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%status, uri = %self.uri, "completion endpoint returned non-success status");
            return Err(TargetError::Status(status.as_u16()));
        }

        let completion: CompletionResponse = resp
            .try_into_json()
            .await
            .map_err(|err| TargetError::InvalidResponse(err.to_string()))?;

        Ok(completion
            .choices
            .into_iter()
            .map(|choice| choice.text)
            .collect())
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("target".to_owned(), "http".to_owned());
        metadata.insert("endpoint".to_owned(), self.uri.to_string());
        if let Some(model) = &self.model {
            metadata.insert("model".to_owned(), model.clone());
        }
        metadata
    }
}
