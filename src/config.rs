use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|e| ApiError::Config(format!("invalid PORT: {e}")))?;

        let database_path =
            std::env::var("BURROW_DB").unwrap_or_else(|_| "burrow.db".to_string());

        let debug = std::env::var("DEBUG")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        Ok(Config {
            port,
            database_path,
            debug,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_truthy_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" yes "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("off"));
    }
}
