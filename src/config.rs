#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_file_size: usize,
    pub elevation_api_url: String,
    /// Elevation backfill is off when no key is configured.
    pub elevation_api_key: Option<String>,
    pub elevation_batch_size: usize,
    pub default_user_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            max_file_size: 25 * 1024 * 1024,
            elevation_api_url: "https://maps.googleapis.com/maps/api/elevation/json".to_string(),
            elevation_api_key: None,
            elevation_batch_size: 100,
            default_user_id: "anonymous".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let max_file_size_mb = std::env::var("MAX_FILE_SIZE_MB")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(25);

        let elevation_api_url =
            std::env::var("ELEVATION_API_URL").unwrap_or(defaults.elevation_api_url);

        let elevation_api_key = std::env::var("ELEVATION_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let elevation_batch_size = std::env::var("ELEVATION_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&size: &usize| size > 0)
            .unwrap_or(defaults.elevation_batch_size);

        let default_user_id =
            std::env::var("DEFAULT_USER_ID").unwrap_or(defaults.default_user_id);

        Self {
            port,
            max_file_size: max_file_size_mb * 1024 * 1024,
            elevation_api_url,
            elevation_api_key,
            elevation_batch_size,
            default_user_id,
        }
    }
}
