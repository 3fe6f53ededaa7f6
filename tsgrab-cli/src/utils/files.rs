const DEFAULT_MANIFEST_NAME: &str = "index.m3u8";

/// Whether the input names a remote playlist rather than a local file.
pub fn is_http(input: &str) -> bool {
    let lower = input.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// File name to save a remote manifest under: the last path segment of the URL.
pub fn manifest_file_name(url_str: &str) -> String {
    url_str
        .parse::<reqwest::Url>()
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_MANIFEST_NAME.to_string())
}
