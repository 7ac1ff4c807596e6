use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body as HyperBody, Client, Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use url::Url;

use crate::error::{LoadError, RequestError};
use crate::models::dsl_model::{ApiKeyLocation, Auth, Body, HttpMethod, RequestStep};

pub type HttpsClient = Client<HttpsConnector<hyper::client::HttpConnector>>;

pub fn build_client() -> HttpsClient {
    let https = HttpsConnector::new();
    Client::builder().build::<_, HyperBody>(https)
}

/// What is kept of a response once its body has been drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub bytes: u64,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::DELETE => Method::DELETE,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::HEAD => Method::HEAD,
            HttpMethod::OPTIONS => Method::OPTIONS,
        }
    }
}

pub fn build_url(base_url: &str, step: &RequestStep) -> Result<Url, LoadError> {
    let raw = format!("{}{}", base_url, step.path);
    let mut url = Url::parse(&raw).map_err(|e| LoadError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;

    let api_key_in_query = match &step.auth {
        Some(Auth::ApiKey {
            key_name,
            key_value,
            add_to: ApiKeyLocation::Query,
        }) => Some((key_name, key_value)),
        _ => None,
    };

    if !step.query_params.is_empty() || api_key_in_query.is_some() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &step.query_params {
            pairs.append_pair(key, value);
        }
        if let Some((key, value)) = api_key_in_query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

pub fn build_request(base_url: &str, step: &RequestStep) -> Result<Request<HyperBody>, LoadError> {
    let url = build_url(base_url, step)?;
    let uri: Uri = url.as_str().parse().map_err(|e: hyper::http::uri::InvalidUri| {
        LoadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }
    })?;

    let mut req_builder = Request::builder().method(Method::from(step.method)).uri(uri);

    let body = match &step.body {
        Some(Body::Json(json)) => {
            req_builder = req_builder.header(CONTENT_TYPE, "application/json");
            HyperBody::from(serde_json::to_string(json)?)
        }
        Some(Body::Xml(xml)) => {
            req_builder = req_builder.header(CONTENT_TYPE, "application/xml");
            HyperBody::from(xml.clone())
        }
        None => HyperBody::empty(),
    };

    for (name, value) in &step.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LoadError::Request(format!("header '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LoadError::Request(format!("header '{name}': {e}")))?;
        req_builder = req_builder.header(name, value);
    }

    match &step.auth {
        Some(Auth::Basic { username, password }) => {
            let encoded = BASE64.encode(format!("{}:{}", username, password));
            req_builder = req_builder.header(AUTHORIZATION, format!("Basic {}", encoded));
        }
        Some(Auth::Bearer { token }) => {
            req_builder = req_builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Some(Auth::ApiKey {
            key_name,
            key_value,
            add_to: ApiKeyLocation::Header,
        }) => {
            req_builder = req_builder.header(key_name.as_str(), key_value.as_str());
        }
        Some(Auth::ApiKey {
            add_to: ApiKeyLocation::Query,
            ..
        })
        | Some(Auth::None)
        | None => {}
    }

    req_builder
        .body(body)
        .map_err(|e| LoadError::Request(e.to_string()))
}

/// Sends one request and drains the response body.
///
/// The caller bounds this with its own timeout; a hyper-level timeout is
/// still classified as [`RequestError::Timeout`].
pub async fn send_request(
    client: &HttpsClient,
    base_url: &str,
    step: &RequestStep,
) -> Result<HttpResponse, RequestError> {
    let request =
        build_request(base_url, step).map_err(|e| RequestError::Invalid(e.to_string()))?;

    let response = client.request(request).await.map_err(classify)?;
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(classify)?;

    Ok(HttpResponse {
        status,
        bytes: body.len() as u64,
    })
}

fn classify(e: hyper::Error) -> RequestError {
    if e.is_connect() {
        RequestError::Connect
    } else if e.is_timeout() {
        RequestError::Timeout
    } else if e.is_closed() || e.is_incomplete_message() {
        RequestError::Closed
    } else {
        RequestError::Other(e.to_string())
    }
}
