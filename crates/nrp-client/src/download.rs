//! The download engine (§4.4): probe a content URL, then materialize its
//! bytes into a [`DataSink`], either as one sequential `GET` or as N
//! concurrent ranged `GET`s sharing the same part-size math as uploads.

use crate::connection::Connection;
use crate::error::RepositoryError;
use crate::limiter::Limiter;
use crate::multipart::{part_plan, MINIMAL_DOWNLOAD_PART_SIZE};
use crate::streams::DataSink;

/// What the engine learned about a content URL before transferring any
/// bytes: its final (post-redirect) URL, declared length, and whether the
/// server will honor `Range` requests.
#[derive(Debug, Clone)]
pub struct Probe {
    pub url: String,
    pub content_length: Option<u64>,
    pub accepts_ranges: bool,
}

/// Probe `url` with `HEAD`, falling back to a `Range: bytes=0-0` `GET` if
/// the server refuses `HEAD` (the typical case for pre-signed S3 URLs).
///
/// # Errors
///
/// Returns [`RepositoryError`] if both the `HEAD` and the fallback ranged
/// `GET` fail.
pub async fn probe(conn: &Connection, url: &str) -> Result<Probe, RepositoryError> {
    match conn.head(url).await {
        Ok(response) => Ok(probe_from_headers(url, response.headers())),
        Err(RepositoryError::Client { .. }) => {
            let response = conn.get_range(url, 0, 1).await?;
            Ok(probe_from_headers(url, response.headers()))
        }
        Err(other) => Err(other),
    }
}

/// Build a [`Probe`] from a response's headers: `Content-Length`,
/// `Accept-Ranges: bytes`, and a `Location` redirect target (if present,
/// replacing `url` as the final URL subsequent part requests target).
#[must_use]
pub fn probe_from_headers(url: &str, headers: &http::HeaderMap) -> Probe {
    let content_length = content_length_or_range_total(headers);
    let accepts_ranges = headers
        .get(http::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
    let final_url = headers
        .get(http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| url.to_owned(), str::to_owned);

    Probe {
        url: final_url,
        content_length,
        accepts_ranges,
    }
}

/// Read the total size out of either `Content-Length` or a
/// `Content-Range: bytes 0-0/<total>` header (the latter is what a ranged
/// fallback probe returns instead of a plain length).
#[must_use]
pub fn content_length_or_range_total(headers: &http::HeaderMap) -> Option<u64> {
    if let Some(len) = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(len);
    }
    headers
        .get(http::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.parse::<u64>().ok())
}

/// Materialize `url`'s bytes into `sink` (§4.4 steps 1-5): probe, allocate,
/// then either ranged-concurrent or single-sequential transfer depending
/// on size and range support.
///
/// # Errors
///
/// Returns [`RepositoryError`] for any transport/status/IO failure; the
/// sink is closed on every exit path, success or failure.
pub async fn download(
    conn: &Connection,
    url: &str,
    sink: &dyn DataSink,
    limiter: Limiter,
) -> Result<(), RepositoryError> {
    let probe = probe(conn, url).await?;

    if let Some(len) = probe.content_length {
        sink.allocate(len).await?;
    }

    let result = if probe
        .content_length
        .is_some_and(|len| len > MINIMAL_DOWNLOAD_PART_SIZE && probe.accepts_ranges)
    {
        download_ranged(conn, &probe.url, sink, probe.content_length.unwrap_or(0), limiter).await
    } else {
        download_sequential(conn, &probe.url, sink).await
    };

    sink.close().await?;
    result
}

/// Stream the whole object into `sink` with a single `GET` at offset 0.
///
/// # Errors
///
/// Returns [`RepositoryError`] for any transport/status/IO failure.
pub async fn download_sequential(
    conn: &Connection,
    url: &str,
    sink: &dyn DataSink,
) -> Result<(), RepositoryError> {
    let response = conn.get(url).await?;
    let bytes = response.bytes(url).await?;
    sink.write_chunk(0, bytes).await?;
    Ok(())
}

/// Split the object per [`part_plan`] and issue N concurrent ranged `GET`s
/// under `limiter`, aborting every sibling part on the first failure.
///
/// # Errors
///
/// Returns [`RepositoryError`] for any transport/status/IO failure on any
/// part, or a [`RepositoryError::MultipartMath`] if `total_size` cannot be
/// split.
pub async fn download_ranged(
    conn: &Connection,
    url: &str,
    sink: &dyn DataSink,
    total_size: u64,
    limiter: Limiter,
) -> Result<(), RepositoryError> {
    let plan = part_plan(total_size, None, None)?;

    let mut set = tokio::task::JoinSet::new();
    for part in plan.parts {
        let conn = conn.clone();
        let url = url.to_owned();
        let limiter = limiter.clone();
        set.spawn(async move {
            let _permit = limiter.acquire().await;
            download_one_part(&conn, &url, part.offset, part.length).await
        });
    }

    let mut chunks = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(chunk)) => chunks.push(chunk),
            Ok(Err(repo_err)) => {
                set.abort_all();
                return Err(repo_err);
            }
            Err(join_err) => {
                set.abort_all();
                return Err(RepositoryError::Io(std::io::Error::other(join_err.to_string())));
            }
        }
    }

    for (offset, bytes) in chunks {
        sink.write_chunk(offset, bytes).await?;
    }
    Ok(())
}

/// Fetch one ranged part, returning its offset alongside the bytes so the
/// caller can write out-of-order parts to the right place.
async fn download_one_part(
    conn: &Connection,
    url: &str,
    offset: u64,
    length: u64,
) -> Result<(u64, bytes::Bytes), RepositoryError> {
    let response = conn.get_range(url, offset, length).await?;
    let bytes = response.bytes(url).await?;
    Ok((offset, bytes))
}
