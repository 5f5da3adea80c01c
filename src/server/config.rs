use super::RequestsLoggingLevel;
use crate::config::DEFAULT_MAX_UPLOAD_MB;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub frontend_dir_path: Option<String>,
    /// Uploads above this size are refused with 413.
    pub max_upload_bytes: u64,
    /// If false, pass-through results are delivered for free.
    pub charge_simulated: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            frontend_dir_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            charge_simulated: true,
        }
    }
}
