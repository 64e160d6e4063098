use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, Registry, filter::FilterFn, fmt::time::ChronoUtc,
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Output format of the fmt layer, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other}")),
        }
    }
}

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Parse a `LOG_LEVEL` style value, falling back to the build default.
#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    let default = default_level();

    level.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Parse a `LOG_FORMAT` style value, falling back to compact output.
#[must_use]
pub fn parse_format(format: Option<&str>) -> LogFormat {
    format.map_or_else(LogFormat::default, |format| {
        format.parse().unwrap_or_else(|err| {
            eprintln!("{err}, defaulting to compact output");
            LogFormat::Compact
        })
    })
}

/// Install the global subscriber.
///
/// Only events emitted from `mailroom*` targets are kept, so the LDAP
/// client and pool internals stay quiet unless they surface through our
/// own logging.
pub fn init() {
    let level = parse_level(std::env::var("LOG_LEVEL").ok().as_deref());
    let format = parse_format(std::env::var("LOG_FORMAT").ok().as_deref());

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_timer(ChronoUtc::rfc_3339())
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(
            layer
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("mailroom")
                })),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("warn")), LevelFilter::WARN);
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::DEBUG);
        assert_eq!(parse_level(Some("chatty")), default_level());
        assert_eq!(parse_level(None), default_level());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format(Some("json")), LogFormat::Json);
        assert_eq!(parse_format(Some("Text")), LogFormat::Compact);
        assert_eq!(parse_format(Some("xml")), LogFormat::Compact);
        assert_eq!(parse_format(None), LogFormat::Compact);
    }
}
