use reqwest::Client;
use tracing::debug;

use crate::{ClientConfig, DownloadError};

/// Create a reqwest Client with the provided configuration.
///
/// Per-request deadlines are applied by the fetcher, so no overall timeout is
/// set on the client itself.
pub fn create_client(config: &ClientConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(8)
        .user_agent(&config.user_agent)
        .default_headers(config.default_headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    debug!(
        user_agent = %config.user_agent,
        follow_redirects = config.follow_redirects,
        "Building HTTP client"
    );

    client_builder.build().map_err(DownloadError::from)
}
