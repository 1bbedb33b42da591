use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pbd_core::{BoardSource, Canvas, DrawerError, PaintBackend, PaintRequest, Rgb};
use serde::Deserialize;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build http client")
}

fn join(endpoint: &str, path: &str) -> String {
    format!("{}/{path}", endpoint.trim_end_matches('/'))
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    data: Option<Value>,
}

/// `(accepted, data)` from a paintboard JSON reply. Accepted only when
/// `status` is the number 200.
fn parse_reply(body: &str) -> (bool, String) {
    match serde_json::from_str::<ApiReply>(body) {
        Ok(reply) => {
            let data = match reply.data {
                Some(Value::String(text)) => text,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            (reply.status == Some(200), data)
        }
        Err(_) => (false, body.trim().to_string()),
    }
}

/// Board snapshot fetched over HTTP. Keeps the last good snapshot when a
/// refresh fails.
pub struct HttpBoard {
    client: reqwest::Client,
    url: String,
    canvas: RwLock<Canvas>,
}

impl HttpBoard {
    pub fn new(client: reqwest::Client, endpoint: &str, width: u32, height: u32) -> Self {
        Self {
            client,
            url: join(endpoint, "board"),
            canvas: RwLock::new(Canvas::new(width, height)),
        }
    }

    pub fn snapshot(&self) -> Canvas {
        self.canvas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BoardSource for HttpBoard {
    async fn refresh(&self) -> Result<(), DrawerError> {
        debug!(event = "board_fetch", url = %self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| DrawerError::CanvasRefreshFailed(err.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|err| DrawerError::CanvasRefreshFailed(err.to_string()))?;

        let base = self.snapshot();
        let canvas = Canvas::parse_snapshot(&base, &text)?;
        *self.canvas.write().unwrap_or_else(PoisonError::into_inner) = canvas;
        info!(event = "board_refreshed", bytes = text.len());
        Ok(())
    }

    fn pixel_at(&self, x: u32, y: u32) -> Option<Rgb> {
        self.canvas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(x, y)
    }
}

pub struct HttpPainter {
    client: reqwest::Client,
    url: String,
}

impl HttpPainter {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            url: join(endpoint, "paint"),
        }
    }
}

fn paint_form(request: &PaintRequest) -> [(&'static str, String); 5] {
    [
        ("x", request.x.to_string()),
        ("y", request.y.to_string()),
        ("color", request.color.to_hex()),
        ("uid", request.uid.to_string()),
        ("token", request.token.clone()),
    ]
}

#[async_trait]
impl PaintBackend for HttpPainter {
    async fn paint(&self, request: &PaintRequest) -> Result<(), DrawerError> {
        let body = self
            .client
            .post(&self.url)
            .form(&paint_form(request))
            .send()
            .await
            .map_err(|err| DrawerError::PaintRejected(format!("network: {err}")))?
            .text()
            .await
            .map_err(|err| DrawerError::PaintRejected(format!("network: {err}")))?;

        let (accepted, data) = parse_reply(&body);
        if !accepted {
            return Err(DrawerError::PaintRejected(data));
        }
        Ok(())
    }
}

/// Exchanges a uid and its clipboard paste for a paint token.
pub struct TokenClient {
    client: reqwest::Client,
    url: String,
}

impl TokenClient {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            url: join(endpoint, "gettoken"),
        }
    }

    pub async fn fetch(&self, uid: u32, paste: &str) -> Result<String> {
        let form = [("uid", uid.to_string()), ("paste", paste.to_string())];
        let body = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .context("Could not reach token endpoint")?
            .text()
            .await
            .context("Could not read token reply")?;

        let (accepted, data) = parse_reply(&body);
        if !accepted || data.is_empty() {
            bail!("token request for {uid} refused: {data}");
        }
        info!(event = "token_fetched", uid);
        Ok(data)
    }
}
