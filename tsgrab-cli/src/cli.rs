use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Segmented (HLS) playlist downloader",
    long_about = "Downloads every segment of an HLS playlist, decrypting AES-128 segments,\n\
                  and writes an ffmpeg concat list of the results in playlist order.\n\
                  \n\
                  Segments already present in the work directory are reused, so an\n\
                  interrupted download can be resumed by running the same command again."
)]
pub struct CliArgs {
    /// Playlist URL or local manifest file
    #[arg(help = "Playlist URL (http/https) or path to a local manifest file")]
    pub input: String,

    /// Directory where segments and derived files are written
    #[arg(short, long, default_value = "m3u8cache")]
    pub work_dir: PathBuf,

    /// Base URL used to resolve relative URIs of a local manifest
    #[arg(
        short,
        long,
        help = "Base URL for relative URIs, required when the input is a local file"
    )]
    pub url_prefix: Option<String>,

    /// Custom HTTP headers
    #[arg(
        short = 'H',
        long = "header",
        help = "Add custom HTTP header (format: 'Name: Value'). Can be used multiple times."
    )]
    pub headers: Vec<String>,

    /// HTTP headers as a JSON object
    #[arg(long, help = "HTTP headers as a JSON object, e.g. '{\"Referer\":\"https://a/\"}'")]
    pub json_header: Option<String>,

    /// Output name, without extension
    #[arg(short, long, default_value = "out")]
    pub name: String,

    /// Maximum number of concurrent segment downloads
    #[arg(short, long, default_value = "5")]
    pub concurrency: usize,

    /// Per-segment request timeout in seconds
    #[arg(
        short = 't',
        long,
        default_value = "5",
        help = "Timeout in seconds for each segment request (0 disables it)"
    )]
    pub segment_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Show progress bar
    #[arg(short = 'P', long = "progress", help = "Display a progress bar")]
    pub show_progress: bool,

    /// Only save the manifest file into the work directory
    #[arg(long, conflicts_with = "gen_index")]
    pub manifest_only: bool,

    /// Write a local index.m3u8 instead of downloading
    #[arg(long)]
    pub gen_index: bool,

    /// Run ffmpeg on the concat list after downloading
    #[arg(long, help = "Remux the segments into <name>.mp4 with ffmpeg")]
    pub mux: bool,

    /// Keep the work directory after a successful remux
    #[arg(long, requires = "mux")]
    pub keep_cache: bool,

    /// ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["tsgrab", "http://h/p/index.m3u8"]);
        assert_eq!(args.work_dir, PathBuf::from("m3u8cache"));
        assert_eq!(args.name, "out");
        assert_eq!(args.concurrency, 5);
        assert_eq!(args.segment_timeout, 5);
        assert!(!args.mux && !args.manifest_only && !args.gen_index);
    }

    #[test]
    fn test_repeated_headers_and_flags() {
        let args = CliArgs::parse_from([
            "tsgrab",
            "local.m3u8",
            "-u",
            "http://h/p",
            "-H",
            "Referer: http://h/",
            "-H",
            "Cookie: a=b",
            "-c",
            "8",
            "--mux",
            "--keep-cache",
        ]);
        assert_eq!(args.url_prefix.as_deref(), Some("http://h/p"));
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.concurrency, 8);
        assert!(args.mux && args.keep_cache);
    }

    #[test]
    fn test_keep_cache_requires_mux() {
        assert!(CliArgs::try_parse_from(["tsgrab", "x", "--keep-cache"]).is_err());
        assert!(
            CliArgs::try_parse_from(["tsgrab", "x", "--manifest-only", "--gen-index"]).is_err()
        );
    }
}
