// HLS Playlist parsing: turns manifest text into an ordered list of segments,
// following variant playlists and fetching the shared decryption key.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use regex::Regex;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};
use url::{Position, Url};

use crate::hls::fetcher::Fetcher;
use crate::{DownloadError, GrabConfig};

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
const KEY_TAG: &str = "#EXT-X-KEY:";
const DURATION_TAG: &str = "#EXTINF";
const END_LIST_TAG: &str = "#EXT-X-ENDLIST";

static ATTRIBUTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z0-9-]+)=("[^"]*"|[^,]*)"#).unwrap());

// Image suffixes are accepted because some hosts disguise TS segments as images.
static MEDIA_SUFFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(ts|jpg|jpeg|jfif|pjpeg|pjp|png|webp|gif)$").unwrap()
});

/// A single downloadable segment of a media playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// File stem of the segment, unique within its playlist.
    pub name: String,
    /// Absolute URL of the segment.
    pub uri: String,
    /// The `#EXTINF` line preceding the segment, verbatim.
    pub duration_tag: String,
    /// Whether the segment must be decrypted with the playlist key.
    pub encrypted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    pub key: Bytes,
    pub iv: Bytes,
    pub segments: Vec<Segment>,
    pub base_url: String,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }
}

pub struct PlaylistParser {
    fetcher: Arc<dyn Fetcher>,
    headers: HeaderMap,
    timeout: Duration,
    max_variant_depth: usize,
}

impl PlaylistParser {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &GrabConfig) -> Self {
        Self {
            fetcher,
            headers: config.headers.clone(),
            timeout: config.playlist_timeout,
            max_variant_depth: config.max_variant_depth,
        }
    }

    /// Parses `manifest` whose relative URIs are relative to `base_url`.
    ///
    /// Variant playlists are followed until a media playlist is reached; the
    /// returned playlist is the deepest one.
    pub async fn parse(&self, manifest: &[u8], base_url: &str) -> Result<Playlist, DownloadError> {
        self.parse_at_depth(manifest, base_url, 0).await
    }

    fn parse_at_depth<'a>(
        &'a self,
        manifest: &'a [u8],
        base_url: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, Result<Playlist, DownloadError>> {
        Box::pin(async move {
            let text = String::from_utf8_lossy(manifest);
            let mut lines = text.lines();

            let mut playlist = Playlist {
                base_url: base_url.to_string(),
                ..Default::default()
            };
            let mut key_uri: Option<String> = None;
            let mut encrypted = false;
            let mut pending_duration: Option<String> = None;
            let mut names = HashSet::new();

            while let Some(raw_line) = lines.next() {
                let line = raw_line.trim();
                if line.is_empty() {
                    continue;
                }

                if line.starts_with(STREAM_INF_TAG) {
                    let variant_uri = lines.next().map(str::trim).unwrap_or_default();
                    if variant_uri.is_empty() {
                        return Err(DownloadError::playlist(
                            "variant stream declared without a playlist URI",
                        ));
                    }
                    if depth >= self.max_variant_depth {
                        return Err(DownloadError::playlist(format!(
                            "variant playlists nested deeper than {}",
                            self.max_variant_depth
                        )));
                    }

                    let variant_url = resolve_uri(variant_uri, base_url)?;
                    let variant_base = variant_base_url(variant_uri, base_url)?;
                    info!(url = %variant_url, depth = depth + 1, "Following variant playlist");

                    let variant_bytes = self
                        .fetcher
                        .fetch(&variant_url, &self.headers, self.timeout)
                        .await?;
                    return self
                        .parse_at_depth(&variant_bytes, &variant_base, depth + 1)
                        .await;
                }

                if let Some(attributes) = line.strip_prefix(KEY_TAG) {
                    encrypted = self
                        .apply_key(attributes, base_url, &mut playlist, &mut key_uri)
                        .await?;
                    continue;
                }

                if line.starts_with(DURATION_TAG) {
                    pending_duration = Some(line.to_string());
                    continue;
                }

                if line.starts_with(END_LIST_TAG) {
                    break;
                }

                if line.starts_with('#') {
                    continue;
                }

                let duration_tag = pending_duration.take().unwrap_or_default();
                let Some(stem) = media_stem(line) else {
                    debug!(line, "Skipping non-media playlist entry");
                    continue;
                };

                let name = unique_name(&mut names, stem, playlist.segments.len());

                playlist.segments.push(Segment {
                    name,
                    uri: resolve_uri(line, base_url)?,
                    duration_tag,
                    encrypted,
                });
            }

            Ok(playlist)
        })
    }

    /// Handles one `#EXT-X-KEY` declaration and returns whether the following
    /// segments are encrypted.
    async fn apply_key(
        &self,
        attributes: &str,
        base_url: &str,
        playlist: &mut Playlist,
        key_uri: &mut Option<String>,
    ) -> Result<bool, DownloadError> {
        let attributes = parse_attributes(attributes);
        let method = attributes.get("METHOD").copied().unwrap_or_default();

        match method {
            "NONE" => Ok(false),
            "AES-128" => {
                let uri = attributes
                    .get("URI")
                    .copied()
                    .filter(|uri| !uri.is_empty())
                    .ok_or_else(|| DownloadError::playlist("AES-128 key declared without a URI"))?;
                let url = resolve_uri(uri, base_url)?;

                if key_uri.as_deref() != Some(url.as_str()) {
                    if key_uri.is_some() {
                        warn!(url = %url, "Playlist rotates keys, only the latest key is kept");
                    }
                    playlist.key = self.fetcher.fetch(&url, &self.headers, self.timeout).await?;
                    debug!(url = %url, len = playlist.key.len(), "Fetched decryption key");
                    *key_uri = Some(url);
                }

                playlist.iv = match attributes.get("IV") {
                    Some(iv) => Bytes::from(decode_iv(iv)?),
                    None => Bytes::new(),
                };
                Ok(true)
            }
            other => Err(DownloadError::playlist(format!(
                "unsupported encryption method '{other}'"
            ))),
        }
    }
}

/// Claims a file name for the segment at `position`. A taken stem becomes
/// `<stem>_<position>`, then `<stem>_<position>_1`, `_2` and so on.
fn unique_name(names: &mut HashSet<String>, stem: &str, position: usize) -> String {
    if names.insert(stem.to_string()) {
        return stem.to_string();
    }

    let base = format!("{stem}_{position}");
    let mut candidate = base.clone();
    let mut attempt = 0;
    while !names.insert(candidate.clone()) {
        attempt += 1;
        candidate = format!("{base}_{attempt}");
    }
    warn!(segment = stem, renamed = %candidate, "Duplicate segment name");
    candidate
}

fn parse_attributes(list: &str) -> HashMap<&str, &str> {
    ATTRIBUTE_REGEX
        .captures_iter(list)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str().trim_matches('"');
            Some((name, value))
        })
        .collect()
}

fn decode_iv(value: &str) -> Result<Vec<u8>, DownloadError> {
    let hex_digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(hex_digits)
        .map_err(|e| DownloadError::playlist(format!("failed to decode IV '{value}': {e}")))
}

/// Returns the segment file stem if `line` references a media file.
fn media_stem(line: &str) -> Option<&str> {
    let path = strip_query(line);
    if !MEDIA_SUFFIX_REGEX.is_match(path) {
        return None;
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
}

fn strip_query(uri: &str) -> &str {
    uri.find(['?', '#']).map_or(uri, |pos| &uri[..pos])
}

fn is_absolute(uri: &str) -> bool {
    uri.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Resolves a playlist URI against the playlist's base URL.
///
/// Absolute URIs are returned unchanged, root-relative URIs keep the scheme
/// and host of the base, everything else is appended to the base.
pub fn resolve_uri(uri: &str, base_url: &str) -> Result<String, DownloadError> {
    if is_absolute(uri) {
        return Ok(uri.to_string());
    }

    if uri.starts_with('/') {
        let base = Url::parse(base_url)
            .map_err(|e| DownloadError::InvalidUrl(format!("{base_url}: {e}")))?;
        if uri.starts_with("//") {
            return Ok(format!("{}:{uri}", base.scheme()));
        }
        return Ok(format!("{}{uri}", &base[..Position::BeforePath]));
    }

    Ok(format!("{}/{uri}", base_url.trim_end_matches('/')))
}

/// Base URL for a variant playlist: the directory containing it.
fn variant_base_url(variant_uri: &str, base_url: &str) -> Result<String, DownloadError> {
    if !strip_query(variant_uri).contains('/') {
        return Ok(base_url.to_string());
    }

    let resolved = resolve_uri(variant_uri, base_url)?;
    Ok(url_directory(&resolved).unwrap_or(base_url).to_string())
}

/// Directory part of an absolute URL, without the trailing slash.
///
/// `http://h/p/index.m3u8?t=1` gives `http://h/p`. Returns `None` when the URL
/// has no path to strip.
pub fn url_directory(url: &str) -> Option<&str> {
    match strip_query(url).rsplit_once('/') {
        Some((dir, _)) if !dir.ends_with(':') && !dir.ends_with(":/") => Some(dir),
        _ => None,
    }
}
