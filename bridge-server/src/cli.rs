//! Command-line arguments and environment defaulting
//!
//! Precedence: flags > environment variables > built-in defaults.

use clap::Parser;

/// Local bridge between web POS terminals and physical receipt printers
#[derive(Parser, Debug)]
#[command(name = "print-bridge", version)]
#[command(about = "Serve print commands over WebSocket and drain the cloud print queue")]
pub struct Cli {
    /// Port for the WebSocket command server
    #[arg(long, env = "PORT", default_value_t = 7171)]
    pub port: u16,

    /// Address to bind (default: all interfaces)
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Comma-separated list of allowed WebSocket origins (empty = allow all)
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Enable debug logging
    #[arg(long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long)]
    pub quiet: bool,

    /// Restaurant whose cloud print queue this bridge drains
    #[arg(long, env = "RESTAURANT_ID")]
    pub restaurant_id: Option<String>,

    /// Human-readable name reported on cloud claims
    #[arg(long, env = "DEVICE_NAME")]
    pub device_name: Option<String>,

    /// Firebase project hosting the print queue
    #[arg(long = "firebase-project", env = "FIREBASE_PROJECT")]
    pub firebase_project: Option<String>,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        let mut cli = <Self as Parser>::parse();
        // VERBOSE=1 is the documented env form; clap's bool parser only
        // accepts true/false, so it is handled here
        if !cli.verbose && std::env::var("VERBOSE").is_ok_and(|v| v == "1") {
            cli.verbose = true;
        }
        cli
    }

    /// Log level derived from --verbose / --quiet
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cli = Cli::try_parse_from(["print-bridge"]).unwrap();
        assert_eq!(cli.port, 7171);
        assert_eq!(cli.host, "0.0.0.0");
        assert!(cli.allowed_origins.is_empty());
        assert!(!cli.verbose);
        assert!(cli.restaurant_id.is_none());
    }

    #[test]
    fn equals_and_space_forms_both_parse() {
        let a = Cli::try_parse_from(["print-bridge", "--port", "8080"]).unwrap();
        let b = Cli::try_parse_from(["print-bridge", "--port=8080"]).unwrap();
        assert_eq!(a.port, 8080);
        assert_eq!(b.port, 8080);
    }

    #[test]
    fn origins_split_on_commas() {
        let cli = Cli::try_parse_from([
            "print-bridge",
            "--allowed-origins",
            "https://pos.example.com,https://admin.example.com",
        ])
        .unwrap();
        assert_eq!(
            cli.allowed_origins,
            vec!["https://pos.example.com", "https://admin.example.com"]
        );
    }

    #[test]
    fn log_level_flags() {
        let quiet = Cli::try_parse_from(["print-bridge", "--quiet"]).unwrap();
        let verbose = Cli::try_parse_from(["print-bridge", "--verbose"]).unwrap();
        let default = Cli::try_parse_from(["print-bridge"]).unwrap();
        assert_eq!(quiet.log_level(), "warn");
        assert_eq!(verbose.log_level(), "debug");
        assert_eq!(default.log_level(), "info");
    }

    #[test]
    fn restaurant_flags() {
        let cli = Cli::try_parse_from([
            "print-bridge",
            "--restaurant-id=rest-42",
            "--device-name",
            "Front Counter",
            "--firebase-project=pos-demo",
        ])
        .unwrap();
        assert_eq!(cli.restaurant_id.as_deref(), Some("rest-42"));
        assert_eq!(cli.device_name.as_deref(), Some("Front Counter"));
        assert_eq!(cli.firebase_project.as_deref(), Some("pos-demo"));
    }
}
