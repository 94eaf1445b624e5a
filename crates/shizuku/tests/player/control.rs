use std::time::Duration;

use reqwest::Url;
use shizuku::{
    surface::ReadyState, HttpClient, Manifest, PlaybackSurface, PlayerState, QualitySelection,
    ShizukuError, SurfaceEvent, TrackKind,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::{
    manifest_json, media_body, mount_media, ranges_of, segment_bytes, RangeResponder,
    StaticManifest, TestPlayer, HIGH_PATH, LOW_PATH,
};
use crate::{eventually, AssertWrapper};

#[tokio::test]
async fn test_paused_player_waits_for_initialize() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_media(&server, RangeResponder::new(media_body(1))).await;

    let test = TestPlayer::spawn(&server, true, Default::default());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(test.player.status().state, PlayerState::Uninitialized);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert!(matches!(
        test.player.change_quality(QualitySelection::Manual(0)),
        Err(ShizukuError::NotReady)
    ));

    test.player.initialize_if_needed()?;
    test.wait_for(|status| status.state == PlayerState::Steady)
        .await;
    eventually(|| test.video_len() == 1000).await;
    assert!(test.surface.is_paused());

    test.player.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unavailable_without_manifest() -> anyhow::Result<()> {
    // nothing mounted, every request is answered with 404
    let server = MockServer::start().await;

    let test = TestPlayer::spawn(&server, false, Default::default());
    let status = test
        .wait_for(|status| matches!(status.state, PlayerState::Unavailable(_)))
        .await;
    assert!(status.qualities.is_empty());
    assert!(test.video().is_none());

    test.player.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unavailable_without_video_tiers() -> anyhow::Result<()> {
    let mut manifest = Manifest::from_json(
        &serde_json::to_vec(&manifest_json())?,
        &Url::parse("http://localhost/")?,
    )?;
    manifest.video.representations.clear();

    let test = TestPlayer::with_manifests(
        StaticManifest(manifest),
        HttpClient::default(),
        false,
        Default::default(),
    );
    let status = test
        .wait_for(|status| matches!(status.state, PlayerState::Unavailable(_)))
        .await;
    assert!(status.qualities.is_empty());
    assert!(test.video().is_none());

    test.player.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_while_loading_manifest() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(manifest_json())
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let test = TestPlayer::spawn(&server, false, Default::default());
    test.wait_for(|status| status.state == PlayerState::Initializing)
        .await;

    tokio::time::timeout(Duration::from_secs(1), test.player.shutdown())
        .await
        .expect("shutdown waited for the manifest");
    Ok(())
}

#[tokio::test]
async fn test_recovers_failed_track() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_media(&server, RangeResponder::new(media_body(1))).await;

    let test = TestPlayer::spawn(&server, false, Default::default());
    eventually(|| test.video_len() == 1000).await;
    test.wait_for(|status| !status.video_fetching).await;

    let video = test.video().unwrap();
    video.fail_appends(true);
    test.player.surface_event(SurfaceEvent::TimeUpdate)?;
    let status = test
        .wait_for(|status| !status.failed_tracks.is_empty())
        .await;
    assert_eq!(status.failed_tracks, [TrackKind::Video]);
    assert!(!status.video_fetching);
    assert_eq!(video.data().len(), 1000);

    // a failed track starts over at the playback position
    video.fail_appends(false);
    test.player.initialize_if_needed()?;
    eventually(|| test.video_len() == 2000).await;
    let status = test
        .wait_for(|status| status.failed_tracks.is_empty() && !status.video_fetching)
        .await;
    assert_eq!(status.video_segment, 0);
    assert_eq!(video.data()[1000..], segment_bytes(1, 0));
    assert_eq!(video.removals(), [Duration::ZERO..Duration::from_secs(12)]);
    assert_eq!(
        ranges_of(&server, HIGH_PATH).await,
        ["bytes=0-999", "bytes=1000-1999", "bytes=0-999"]
    );

    test.player.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_manual_quality_switch() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_media(&server, RangeResponder::new(media_body(1))).await;

    let test = TestPlayer::spawn(&server, false, Default::default());
    eventually(|| test.video_len() == 1000).await;
    test.wait_for(|status| !status.video_fetching).await;

    test.player
        .change_quality(QualitySelection::Manual(5))
        .assert_error();
    test.player.change_quality(QualitySelection::Manual(0))?;

    let status = test
        .wait_for(|status| status.quality == QualitySelection::Manual(0))
        .await;
    assert_eq!(status.video_quality, 0);
    assert_eq!(
        test.player
            .qualities()
            .iter()
            .map(|tier| tier.label.as_str())
            .collect::<Vec<_>>(),
        ["360p", "720p"]
    );

    // everything buffered at the old quality is dropped before refetching
    eventually(|| test.video_len() == 2000).await;
    let video = test.video().unwrap();
    assert_eq!(video.removals(), [Duration::ZERO..Duration::from_secs(12)]);
    assert_eq!(video.data()[1000..], segment_bytes(0, 0));
    assert_eq!(ranges_of(&server, LOW_PATH).await, ["bytes=0-999"]);
    assert_eq!(ranges_of(&server, HIGH_PATH).await, ["bytes=0-999"]);

    // back to automatic restores the tier automatic mode was on
    test.player.change_quality(QualitySelection::Automatic)?;
    let status = test
        .wait_for(|status| status.quality == QualitySelection::Automatic)
        .await;
    assert_eq!(status.video_quality, 1);

    test.player.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_pauses_at_end_of_media() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_media(&server, RangeResponder::new(media_body(1))).await;

    let test = TestPlayer::spawn(&server, false, Default::default());
    test.wait_for(|status| status.state == PlayerState::Steady)
        .await;

    test.surface.set_duration(Duration::from_millis(12400));
    test.surface.set_ready_state(ReadyState::HaveEnoughData);
    test.surface.seek(Duration::from_millis(11800));
    test.player.surface_event(SurfaceEvent::TimeUpdate)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!test.surface.is_paused());

    // whole seconds are compared
    test.surface.seek(Duration::from_millis(12100));
    test.player.surface_event(SurfaceEvent::TimeUpdate)?;
    eventually(|| test.surface.is_paused()).await;

    test.player.set_playing_state(true)?;
    eventually(|| !test.surface.is_paused()).await;
    let aborts = test.video().unwrap().aborts();
    test.player.surface_event(SurfaceEvent::Play)?;
    eventually(|| test.surface.is_paused()).await;
    // the video queue is reset along with the fetch
    eventually(|| test.video().unwrap().aborts() > aborts).await;
    assert!(!test.player.status().video_fetching);

    test.player.shutdown().await;
    Ok(())
}
