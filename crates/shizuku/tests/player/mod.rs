mod control;

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::Url;
use serde_json::json;
use shizuku::{
    buffer::memory::{MemoryBuffer, MemorySink},
    config::{PlayerConfig, RetryConfig},
    HttpClient, HttpManifestProvider, Manifest, ManifestProvider, Player, PlayerStatus,
    ShizukuResult, SimulatedSurface, TrackKind,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

use crate::{init_logging, TIMEOUT};

pub const LOW_PATH: &str = "/media/abc/360p_video.webm";
pub const HIGH_PATH: &str = "/media/abc/720p_video.webm";
pub const AUDIO_PATH: &str = "/media/abc/audio.webm";

const SEGMENT_SIZE: usize = 1000;

/// Two video tiers with three segments each, starting at 0s, 4s and 8s.
pub fn manifest_json() -> serde_json::Value {
    manifest_json_with(HIGH_PATH)
}

/// Same as [`manifest_json`], with the high tier served from `high_url`.
pub fn manifest_json_with(high_url: &str) -> serde_json::Value {
    let timestamp_info = json!({
        "duration": 12000.0,
        "media": [
            { "timecode": 0.0, "range": "0-999" },
            { "timecode": 4.0, "range": "1000-1999" },
            { "timecode": 8.0, "range": "2000-2999" },
        ]
    });
    json!({
        "video/webm": {
            "codecs": "vp9",
            "representations": [
                { "url": LOW_PATH, "timestamp_info": timestamp_info },
                { "url": high_url, "timestamp_info": timestamp_info },
            ]
        },
        "audio/webm": {
            "codecs": "opus",
            "representations": [
                { "url": AUDIO_PATH, "timestamp_info": timestamp_info },
            ]
        }
    })
}

/// Media file whose every byte tells the tier and segment it belongs to.
pub fn media_body(tier: u8) -> Vec<u8> {
    (0..3 * SEGMENT_SIZE)
        .map(|i| tier * 16 + (i / SEGMENT_SIZE) as u8)
        .collect()
}

pub fn segment_bytes(tier: u8, segment: usize) -> Vec<u8> {
    media_body(tier)[segment * SEGMENT_SIZE..(segment + 1) * SEGMENT_SIZE].to_vec()
}

/// First and last byte of a `bytes=a-b` or `bytes=a-` header value.
fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let last = len - 1;
    let end = if end.is_empty() {
        last
    } else {
        end.parse::<usize>().ok()?.min(last)
    };
    Some((start.parse().ok()?, end))
}

/// Serves `Range: bytes=a-b` and `bytes=a-` requests out of a fixed body.
pub struct RangeResponder {
    body: Vec<u8>,
    /// Delay for requests starting at the first byte.
    head_delay: Option<Duration>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            head_delay: None,
        }
    }

    pub fn with_head_delay(mut self, delay: Duration) -> Self {
        self.head_delay = Some(delay);
        self
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some((start, end)) = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_range(value, self.body.len()))
        else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.clone());
        };

        let template = ResponseTemplate::new(206)
            .insert_header(
                "content-range",
                format!("bytes {start}-{end}/{}", self.body.len()),
            )
            .set_body_bytes(self.body[start..=end].to_vec());
        match self.head_delay {
            Some(delay) if start == 0 => template.set_delay(delay),
            _ => template,
        }
    }
}

pub async fn mount_media(server: &MockServer, high: RangeResponder) {
    mount_manifest(server, manifest_json()).await;
    Mock::given(method("GET"))
        .and(path(HIGH_PATH))
        .respond_with(high)
        .mount(server)
        .await;
}

/// Mount `manifest` along with the low video tier and the audio track.
pub async fn mount_manifest(server: &MockServer, manifest: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/manifest/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(LOW_PATH))
        .respond_with(RangeResponder::new(media_body(0)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(AUDIO_PATH))
        .respond_with(RangeResponder::new(media_body(8)))
        .mount(server)
        .await;
}

/// Serve `body` over plain HTTP/1.1, breaking the first response off after
/// `cut` bytes. Returns the address and the `Range` header of every request.
pub async fn serve_broken_once(
    body: Vec<u8>,
    cut: usize,
) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ranges = Arc::new(Mutex::new(Vec::new()));

    tokio::spawn({
        let ranges = ranges.clone();
        async move {
            let mut broken = false;
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut buf = [0; 1024];
                while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&head).to_string();
                let range = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("range"))
                    .map(|(_, value)| value.trim().to_string())
                    .unwrap_or_default();
                ranges.lock().unwrap().push(range.clone());

                let (start, end) =
                    parse_range(&range, body.len()).unwrap_or((0, body.len() - 1));
                let part = &body[start..=end];
                let response = format!(
                    "HTTP/1.1 206 Partial Content\r\ncontent-length: {}\r\ncontent-range: bytes {start}-{end}/{}\r\nconnection: close\r\n\r\n",
                    part.len(),
                    body.len()
                );
                let sent = if broken { part } else { &part[..cut] };
                broken = true;

                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(sent).await;
                let _ = stream.shutdown().await;
            }
        }
    });

    (addr, ranges)
}

/// `Range` headers of every request received for `path`, in arrival order.
pub async fn ranges_of(server: &MockServer, path: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == path)
        .filter_map(|request| {
            request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}

pub fn fast_retry() -> PlayerConfig {
    PlayerConfig::default().with_retry(RetryConfig {
        initial_delay_ms: 20,
        multiplier: 2.0,
        max_delay_ms: 200,
    })
}

pub struct TestPlayer {
    pub player: Player,
    pub sink: Arc<MemorySink>,
    pub surface: Arc<SimulatedSurface>,
}

impl TestPlayer {
    pub fn spawn(server: &MockServer, paused: bool, config: PlayerConfig) -> Self {
        let client = HttpClient::default();
        let manifests =
            HttpManifestProvider::new(client.clone(), Url::parse(&server.uri()).unwrap());
        Self::with_manifests(manifests, client, paused, config)
    }

    pub fn with_manifests(
        manifests: impl ManifestProvider,
        client: HttpClient,
        paused: bool,
        config: PlayerConfig,
    ) -> Self {
        init_logging();
        let sink = Arc::new(MemorySink::new());
        let surface = Arc::new(SimulatedSurface::new(paused));

        let player = Player::builder()
            .paused(paused)
            .client(client)
            .config(config)
            .spawn("abc", manifests, sink.clone(), surface.clone());
        Self {
            player,
            sink,
            surface,
        }
    }

    pub fn video(&self) -> Option<Arc<MemoryBuffer>> {
        self.sink.buffer(TrackKind::Video)
    }

    pub fn video_len(&self) -> usize {
        self.video().map(|buffer| buffer.data().len()).unwrap_or(0)
    }

    pub async fn wait_for(&self, condition: impl FnMut(&PlayerStatus) -> bool) -> PlayerStatus {
        let mut receiver = self.player.subscribe();
        let status = tokio::time::timeout(TIMEOUT, receiver.wait_for(condition))
            .await
            .expect("status was not reached in time")
            .expect("player stopped");
        status.clone()
    }
}

/// Hands out the same manifest for every media id.
pub struct StaticManifest(pub Manifest);

impl ManifestProvider for StaticManifest {
    async fn manifest(&self, _media_id: &str) -> ShizukuResult<Manifest> {
        Ok(self.0.clone())
    }
}
