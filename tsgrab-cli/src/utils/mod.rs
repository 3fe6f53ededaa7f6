mod files;
mod format;
mod headers;
pub mod progress;

// Export utility functions
pub use self::files::{is_http, manifest_file_name};
pub use self::format::{format_bytes, format_duration};
pub use self::headers::{parse_headers, parse_json_headers};
