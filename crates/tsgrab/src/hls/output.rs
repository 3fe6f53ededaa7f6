// Output: the position-ordered index of stored segments and the files derived
// from it (ffmpeg concat list, rewritten local playlist).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::DownloadError;
use crate::hls::playlist::Segment;

const LOCAL_PLAYLIST_HEADER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD";

/// Maps a segment's playlist position to the file it was stored in.
///
/// Filled concurrently by completing segments; read once after every task
/// has finished.
#[derive(Debug, Default)]
pub struct OutputIndex {
    entries: Mutex<BTreeMap<usize, PathBuf>>,
}

impl OutputIndex {
    pub fn record(&self, index: usize, path: PathBuf) {
        self.entries.lock().insert(index, path);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Recorded paths in ascending position order. Positions without a path
    /// are left out.
    pub fn ordered_paths(&self) -> Vec<PathBuf> {
        self.entries.lock().values().cloned().collect()
    }
}

/// Renders the ffmpeg concat demuxer input for `paths`.
pub fn concat_list(paths: &[PathBuf]) -> String {
    paths.iter().fold(String::new(), |mut out, path| {
        let quoted = path.display().to_string().replace('\'', r"'\''");
        let _ = writeln!(out, "file '{quoted}'");
        out
    })
}

pub async fn write_concat_list(paths: &[PathBuf], dest: &Path) -> Result<(), DownloadError> {
    tokio::fs::write(dest, concat_list(paths)).await?;
    debug!(path = %dest.display(), entries = paths.len(), "Concat list written");
    Ok(())
}

/// Renders a VOD playlist that references the stored segment files by name.
pub fn local_playlist(segments: &[Segment], extension: &str) -> String {
    let mut out = String::from(LOCAL_PLAYLIST_HEADER);
    out.push('\n');
    for segment in segments {
        let _ = writeln!(out, "{}", segment.duration_tag);
        let _ = writeln!(out, "{}.{extension}", segment.name);
    }
    out.push_str("#EXT-X-ENDLIST\n");
    out
}

pub async fn write_local_playlist(
    segments: &[Segment],
    extension: &str,
    dest: &Path,
) -> Result<(), DownloadError> {
    tokio::fs::write(dest, local_playlist(segments, extension)).await?;
    Ok(())
}

/// ffmpeg arguments that remux the concat list into `<output_name>.mp4`.
pub fn concat_command(list: &Path, output_name: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        format!("{output_name}.mp4"),
    ]
}
