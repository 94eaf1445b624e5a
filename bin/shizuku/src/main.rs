mod config;

use std::{
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use clap::Parser;
use config::Config;
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder, Url,
};
use shizuku::{
    buffer::file::FileSink, manifest::DEFAULT_MANIFEST_PATH, HttpClient, HttpManifestProvider,
    ManifestProvider, MediaBuffer, PlaybackSurface, Player, PlayerState, QualitySelection,
    SimulatedSurface, SurfaceEvent, TrackKind,
};

const TICK: Duration = Duration::from_millis(250);

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct ShizukuArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Server hosting manifests and media files
    #[clap(long, env = "SHIZUKU_BASE_URL")]
    base_url: Option<Url>,

    /// Manifest location relative to the base url, `{id}` is replaced by the media id
    #[clap(long)]
    manifest_path: Option<String>,

    /// Video quality tier index, or `auto`
    #[clap(short, long, default_value = "auto")]
    quality: QualitySelection,

    /// Playback rate of the simulated player
    #[clap(long, default_value = "1.0")]
    rate: f64,

    /// Directory the fetched tracks are written to
    #[clap(short, long, default_value = "./output")]
    output: PathBuf,

    /// TOML config file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Do not start playback, only buffer the look-ahead window at the start
    #[clap(long)]
    paused: bool,

    /// Print the available quality tiers and exit
    #[clap(long)]
    list: bool,

    /// Cookies used to fetch the media
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to fetch the media
    ///
    /// Custom header. eg. "Referer: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Request timeout in seconds
    #[clap(long, default_value = "60")]
    timeout: u64,

    /// Media id to play
    media_id: String,
}

impl ShizukuArgs {
    fn client(&self, config: &Config, base_url: &Url) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in config.headers.iter().chain(&self.headers) {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header: {header}");
            };
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }

        let client = HttpClient::new(
            ClientBuilder::new()
                .default_headers(headers)
                .user_agent(get_chrome_rua())
                .timeout(Duration::from_secs(self.timeout)),
        )?;
        if let Some(cookies) = &self.cookies {
            let cookies = cookies
                .split(';')
                .map(|cookie| cookie.trim().to_string())
                .filter(|cookie| !cookie.is_empty())
                .collect();
            client.add_cookies(cookies, base_url.clone())?;
        }
        Ok(client)
    }
}

async fn list(manifests: &HttpManifestProvider, media_id: &str) -> anyhow::Result<()> {
    let manifest = manifests.manifest(media_id).await?;
    println!("{}", manifest.video.content_type());
    for (index, representation) in manifest.video.representations.iter().enumerate() {
        println!(
            "  [{index}] {label}\t{duration:?}\t{segments} segments",
            label = representation.label(),
            duration = representation.timestamps.duration(),
            segments = representation.timestamps.len(),
        );
    }
    println!("{}", manifest.audio.content_type());
    Ok(())
}

async fn play(
    player: Player,
    sink: Arc<FileSink>,
    surface: Arc<SimulatedSurface>,
    quality: QualitySelection,
    preload: bool,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(TICK);
    let mut last_tick = Instant::now();
    let mut quality_applied = false;
    let mut last_segment = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::warn!("Interrupted");
                break;
            }
        }
        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();

        let status = player.status();
        let duration = match &status.state {
            PlayerState::Unavailable(reason) => {
                player.shutdown().await;
                bail!("Media is unavailable: {reason}");
            }
            PlayerState::Steady => status.duration.unwrap_or_default(),
            _ => continue,
        };
        if surface.duration().is_none() {
            surface.set_duration(duration);
        }
        if !quality_applied {
            quality_applied = true;
            if quality != QualitySelection::Automatic {
                player.change_quality(quality)?;
            }
        }

        if last_segment != Some(status.video_segment) {
            last_segment = Some(status.video_segment);
            let label = status
                .qualities
                .get(status.video_quality)
                .map(|tier| tier.label.as_str())
                .unwrap_or("unknown");
            log::info!(
                "Video segment {} at quality {label} ({})",
                status.video_segment,
                status.quality
            );
        }
        if !status.failed_tracks.is_empty() {
            log::warn!("Recovering failed tracks: {:?}", status.failed_tracks);
            player.initialize_if_needed()?;
        }

        if preload {
            if !status.video_fetching && status.buffered_to.is_some() {
                log::info!("Buffered up to {:?}", status.buffered_to.unwrap_or_default());
                break;
            }
            continue;
        }

        let buffered = sink
            .buffer(TrackKind::Video)
            .map(|buffer| buffer.buffered())
            .unwrap_or_default();
        let position = surface.advance(elapsed, &buffered);
        log::debug!(
            "Position {position:?}, buffered to {:?}",
            status.buffered_to
        );
        player.surface_event(SurfaceEvent::TimeUpdate)?;

        if surface.is_paused() && position.as_secs() >= duration.as_secs() {
            log::info!("Playback finished");
            break;
        }
    }

    player.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ShizukuArgs::parse();
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref())?;
    let base_url = match (&args.base_url, &config.base_url) {
        (Some(base_url), _) => base_url.clone(),
        (None, Some(base_url)) => Url::parse(base_url)?,
        (None, None) => bail!("No base url given, use --base-url or set it in the config"),
    };
    let manifest_path = args
        .manifest_path
        .clone()
        .or_else(|| config.manifest_path.clone())
        .unwrap_or_else(|| DEFAULT_MANIFEST_PATH.to_string());

    let client = args.client(&config, &base_url)?;
    let manifests =
        HttpManifestProvider::new(client.clone(), base_url).with_manifest_path(manifest_path);

    if args.list {
        return list(&manifests, &args.media_id).await;
    }

    let sink = Arc::new(FileSink::new(&args.output)?);
    let surface = Arc::new(SimulatedSurface::new(args.paused));
    surface.set_playback_rate(args.rate);
    log::info!(
        "Playing {} into {}",
        args.media_id,
        sink.output_dir().display()
    );

    let player = Player::builder()
        .paused(args.paused)
        .client(client)
        .config(config.player)
        .spawn(&args.media_id, manifests, sink.clone(), surface.clone());
    if args.paused {
        player.initialize_if_needed()?;
    }

    play(player, sink, surface, args.quality, args.paused).await
}
