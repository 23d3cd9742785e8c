//! HTTP client implementation

use platform_api::ErrorResponse;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::CliError;

/// HTTP client for control-plane communication
pub struct HttpClient {
    client: Client,
    base_url: String,
    access_token: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, access_token: Option<SecretString>) -> Result<Self, CliError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(format!("deckhand/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a token is configured
    pub fn authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.access_token {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }
        request
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.request(Method::GET, path).send().await?;
        decode(response, "GET", path).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, CliError> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        decode(response, "GET", path).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let response = self.request(Method::POST, path).json(body).send().await?;
        decode(response, "POST", path).await
    }

    /// Make a POST request without a body, ignoring the response body
    pub async fn post_empty(&self, path: &str) -> Result<(), CliError> {
        let response = self.request(Method::POST, path).send().await?;
        check(response, "POST", path).await.map(|_| ())
    }

    /// Make a DELETE request, ignoring the response body
    pub async fn delete(&self, path: &str) -> Result<(), CliError> {
        let response = self.request(Method::DELETE, path).send().await?;
        check(response, "DELETE", path).await.map(|_| ())
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    method: &str,
    path: &str,
) -> Result<T, CliError> {
    let response = check(response, method, path).await?;
    let body = response.json().await?;
    Ok(body)
}

/// Map non-2xx responses onto the error taxonomy
async fn check(response: Response, method: &str, path: &str) -> Result<Response, CliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("HTTP {} {} failed: {} - {}", method, path, status, body);

    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.describe().to_string())
        .unwrap_or(body);

    Err(match status {
        StatusCode::UNAUTHORIZED => CliError::NotAuthenticated(message),
        StatusCode::NOT_FOUND => CliError::NotFound(message),
        _ => CliError::ApiError {
            status: status.as_u16(),
            message,
        },
    })
}
