use std::time::Duration;

use reqwest::Url;
use shizuku::{HttpClient, HttpManifestProvider, ManifestProvider, ShizukuError, TrackKind};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{player::manifest_json, AssertWrapper};

async fn setup_mock_server(template: ResponseTemplate) -> (HttpManifestProvider, MockServer) {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/manifest/abc"))
        .respond_with(template)
        .mount(&mock_server)
        .await;

    let provider = HttpManifestProvider::new(
        HttpClient::default(),
        Url::parse(&mock_server.uri()).unwrap(),
    );
    (provider, mock_server)
}

#[tokio::test]
async fn test_http_manifest() {
    let (provider, server) =
        setup_mock_server(ResponseTemplate::new(200).set_body_json(manifest_json())).await;

    let manifest = provider.manifest("abc").await.assert_success();
    assert_eq!(manifest.video.kind, TrackKind::Video);
    assert_eq!(manifest.video.content_type(), r#"video/webm; codecs="vp9""#);
    assert_eq!(manifest.audio.content_type(), r#"audio/webm; codecs="opus""#);

    let labels: Vec<_> = manifest
        .video
        .representations
        .iter()
        .map(|representation| representation.label())
        .collect();
    assert_eq!(labels, ["360p", "720p"]);

    let high = &manifest.video.representations[1];
    assert_eq!(
        high.url.as_str(),
        format!("{}/media/abc/720p_video.webm", server.uri())
    );
    assert_eq!(high.timestamps.len(), 3);
    assert_eq!(high.timestamps.duration(), Duration::from_secs(12));
    assert_eq!(
        high.timestamps.get(1).map(|entry| entry.timecode),
        Some(Duration::from_secs(4))
    );
}

#[tokio::test]
async fn test_http_manifest_error_status() {
    let (provider, _server) = setup_mock_server(ResponseTemplate::new(500)).await;

    let result = provider.manifest("abc").await;
    assert!(matches!(
        result,
        Err(ShizukuError::HttpError(status)) if status.as_u16() == 500
    ));

    // unknown media ids are not mounted at all
    provider.manifest("missing").await.assert_error();
}

#[tokio::test]
async fn test_http_manifest_malformed() {
    let (provider, _server) =
        setup_mock_server(ResponseTemplate::new(200).set_body_string("{\"video/webm\": [")).await;

    assert!(matches!(
        provider.manifest("abc").await,
        Err(ShizukuError::JsonError(_))
    ));
}
