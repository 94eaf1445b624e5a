use futures::StreamExt;
use reqwest::{
    header::{ACCEPT, RANGE},
    Url,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    player::event::{Event, FetchId},
    util::range::ByteRange,
    HttpClient, ShizukuError, ShizukuResult, TrackKind,
};

/// One ranged request of a track.
#[derive(Debug, Clone)]
pub(crate) struct FetchRequest {
    pub track: TrackKind,
    pub fetch: FetchId,
    pub url: Url,
    pub range: ByteRange,
}

/// Issue the request and stream its body back as [`Event::Chunk`]s.
///
/// Once `token` is cancelled nothing more is reported, so a cancelled fetch
/// never looks like a failure.
pub(crate) async fn stream_segment(
    client: HttpClient,
    request: FetchRequest,
    token: CancellationToken,
    events: mpsc::UnboundedSender<Event>,
) {
    let FetchRequest {
        track,
        fetch,
        url,
        range,
    } = request;

    let response = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        response = send(&client, url, &range) => response,
    };
    let response = match response {
        Ok(response) => response,
        Err(error) => {
            let _ = events.send(Event::Rejected {
                track,
                fetch,
                error,
            });
            return;
        }
    };
    if events.send(Event::Responded { track, fetch }).is_err() {
        return;
    }

    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(data)) => Event::Chunk { track, fetch, data },
            Some(Err(e)) => Event::Finished {
                track,
                fetch,
                result: Err(e.into()),
            },
            None => Event::Finished {
                track,
                fetch,
                result: Ok(()),
            },
        };
        let done = matches!(event, Event::Finished { .. });
        if events.send(event).is_err() || done {
            return;
        }
    }
}

async fn send(
    client: &HttpClient,
    url: Url,
    range: &ByteRange,
) -> ShizukuResult<reqwest::Response> {
    let response = client
        .get(url)
        .header(ACCEPT, "*/*")
        .header(RANGE, range.to_http_range())
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        if let Ok(body) = response.text().await {
            tracing::warn!("Error body: {body}");
        }
        return Err(ShizukuError::HttpError(status));
    }

    Ok(response)
}
