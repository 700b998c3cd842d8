use async_trait::async_trait;
use chrono::Utc;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client as HyperClient, Method, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use std::fmt;

use crate::api::{Api, LessonResources, ListQuery, MutationApi, Page, Reactions};
use crate::config::Config;
use crate::course::LessonId;
use crate::entity::{Draft, Entity, Envelope, Mutable, Upload};
use crate::post::{Comment, LikeStatus, NewComment, PostId};
use crate::resource::ResourceId;
use crate::validate::ValidationError;

const API_ROOT: &str = "/api/v1/";
const JSON: &str = "application/json";

#[derive(Error, Debug)]
pub enum Error {
    #[error("network error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("could not build request: {0}")]
    Http(#[from] hyper::http::Error),
    #[error("unexpected response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("the API url must use https")]
    InvalidUrl,
    #[error("{}", .0.message)]
    Response(ErrorBody),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} already has a change in progress")]
    InFlight(String),
    #[error("{0} is not loaded")]
    NotLoaded(String),
}

/// Error payload of a non-2xx response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub status_code: u16,
}

impl ErrorBody {
    pub fn from_status(status: StatusCode) -> Self {
        ErrorBody {
            id: String::new(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            request_id: String::new(),
            status_code: status.as_u16(),
        }
    }
}

impl Error {
    /// Status code of a server rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Response(body) => Some(body.status_code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Problems with the input, caught before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

struct SessionToken(String);

struct HttpClient {
    base_url: Url,
    hyper: HyperClient<HttpsConnector<HttpConnector>, Body>,
    token: Option<SessionToken>,
}

/// HTTPS client for the LMS REST API.
pub struct Client {
    http: HttpClient,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LmsClient({})", self.http.base_url)
    }
}

impl HttpClient {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Body,
        content_type: Option<&str>,
    ) -> Result<Bytes, Error> {
        debug!(%method, url = url.as_str(), "request");
        let mut request = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(ACCEPT, JSON);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.0));
        }
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = self.hyper.request(request.body(body)?).await?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await?;
        if status.is_success() {
            debug!(%method, url = url.as_str(), status = status.as_u16(), "response");
            return Ok(body);
        }

        let mut error = serde_json::from_slice::<ErrorBody>(&body)
            .unwrap_or_else(|_| ErrorBody::from_status(status));
        if error.status_code == 0 {
            error.status_code = status.as_u16();
        }
        warn!(
            %method,
            url = url.as_str(),
            status = status.as_u16(),
            request_id = error.request_id.as_str(),
            "{}",
            error.message
        );
        Err(Error::Response(error))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let body = self.send(Method::GET, url, Body::empty(), None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_json<B, T>(&self, method: Method, url: Url, payload: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(payload)?;
        let body = self
            .send(method, url, Body::from(payload), Some(JSON))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl Client {
    pub fn new(url: Url, token: Option<String>) -> Result<Self, Error> {
        if url.scheme() != "https" {
            return Err(Error::InvalidUrl);
        }

        // Append the api base
        let url = url.join(API_ROOT)?;

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_only()
            .enable_http1()
            .build();
        let client: HyperClient<_, Body> = HyperClient::builder().build(https);

        Ok(Client {
            http: HttpClient {
                base_url: url,
                hyper: client,
                token: token.map(SessionToken),
            },
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Client::new(config.base_url.clone(), config.token.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.http.base_url
    }
}

/// Builds a `multipart/form-data` body with the JSON payload followed by the
/// file. Returns the content type (carrying the boundary) and the body.
fn multipart(payload: &[u8], upload: &Upload) -> (String, Vec<u8>) {
    let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let boundary = boundary_for(&[payload, upload.bytes.as_slice()], seed);
    let file_name: String = upload
        .file_name
        .chars()
        .filter(|c| !matches!(c, '"' | '\r' | '\n'))
        .collect();
    let content_type = header_value(&upload.content_type);
    let mut body = Vec::with_capacity(payload.len() + upload.bytes.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"payload\"\r\n");
    body.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(&upload.bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

/// First boundary derived from `seed` that occurs in none of `parts`.
fn boundary_for(parts: &[&[u8]], seed: u64) -> String {
    let mut attempt = 0u32;
    loop {
        let boundary = format!("lms-client-{:x}-{}", seed, attempt);
        let needle = boundary.as_bytes();
        let clashes = parts
            .iter()
            .any(|part| part.windows(needle.len()).any(|window| window == needle));
        if !clashes {
            return boundary;
        }
        attempt += 1;
    }
}

// Line breaks in a part header would start a new header.
fn header_value(value: &str) -> String {
    let value: String = value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    if value.trim().is_empty() {
        "application/octet-stream".to_string()
    } else {
        value
    }
}

#[async_trait]
impl<E: Entity> Api<E> for Client {
    async fn list(&self, query: &ListQuery) -> Result<Page<E>, Error> {
        let mut url = self.http.endpoint(&[E::COLLECTION])?;
        url.query_pairs_mut().extend_pairs(query.query_pairs());
        self.http.get(url).await
    }

    async fn get(&self, id: &E::Id) -> Result<E, Error> {
        let id = id.to_string();
        let url = self.http.endpoint(&[E::COLLECTION, id.as_str()])?;
        self.http.get(url).await
    }
}

#[async_trait]
impl<E: Mutable> MutationApi<E> for Client {
    async fn create(&self, draft: &E::Draft) -> Result<E, Error> {
        let url = self.http.endpoint(&[E::COLLECTION])?;
        match draft.upload() {
            Some(upload) => {
                let payload = serde_json::to_vec(&Envelope::of(draft))?;
                let (content_type, body) = multipart(&payload, upload);
                let body = self
                    .http
                    .send(Method::POST, url, Body::from(body), Some(content_type.as_str()))
                    .await?;
                Ok(serde_json::from_slice(&body)?)
            }
            None => {
                self.http
                    .send_json(Method::POST, url, &Envelope::of(draft))
                    .await
            }
        }
    }

    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<E, Error> {
        let id = id.to_string();
        let url = self.http.endpoint(&[E::COLLECTION, id.as_str()])?;
        self.http.send_json(Method::PATCH, url, patch).await
    }

    async fn delete(&self, id: &E::Id) -> Result<(), Error> {
        let id = id.to_string();
        let url = self.http.endpoint(&[E::COLLECTION, id.as_str()])?;
        self.http
            .send(Method::DELETE, url, Body::empty(), None)
            .await
            .map(|_| ())
    }
}

#[derive(Serialize)]
struct SetLike {
    liked: bool,
}

#[async_trait]
impl Reactions for Client {
    async fn set_like(&self, post: &PostId, liked: bool) -> Result<LikeStatus, Error> {
        let url = self.http.endpoint(&["posts", post.as_str(), "like"])?;
        self.http
            .send_json(Method::POST, url, &SetLike { liked })
            .await
    }

    async fn comment(&self, post: &PostId, comment: &NewComment) -> Result<Comment, Error> {
        let url = self.http.endpoint(&["posts", post.as_str(), "comments"])?;
        self.http.send_json(Method::POST, url, comment).await
    }
}

#[async_trait]
impl LessonResources for Client {
    async fn attached(&self, lesson: &LessonId) -> Result<Vec<ResourceId>, Error> {
        let url = self.http.endpoint(&["lessons", lesson.as_str(), "resources"])?;
        self.http.get(url).await
    }

    async fn attach(
        &self,
        resource: &ResourceId,
        lesson: &LessonId,
    ) -> Result<Vec<ResourceId>, Error> {
        let url = self.http.endpoint(&[
            "lessons",
            lesson.as_str(),
            "resources",
            resource.as_str(),
            "attach",
        ])?;
        let body = self.http.send(Method::POST, url, Body::empty(), None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn detach(
        &self,
        resource: &ResourceId,
        lesson: &LessonId,
    ) -> Result<Vec<ResourceId>, Error> {
        let url = self.http.endpoint(&[
            "lessons",
            lesson.as_str(),
            "resources",
            resource.as_str(),
            "detach",
        ])?;
        let body = self.http.send(Method::POST, url, Body::empty(), None).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
