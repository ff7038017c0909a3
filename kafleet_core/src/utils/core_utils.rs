//! Small parsing helpers shared by the config sections and the broker properties reader.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CSV_SEPARATOR: Regex = Regex::new(r"\s*,\s*").unwrap();
    // LISTENER_NAME://host:port, the host may be empty to bind to the default interface.
    static ref LISTENER: Regex =
        Regex::new(r"^(?P<name>[A-Za-z0-9_]+)://(?P<host>\[[^\]]*\]|[^:/]*):(?P<port>\d+)$")
            .unwrap();
}

/// A `LISTENER_NAME://host:port` entry of a broker's `listeners` property.
#[derive(Debug, PartialEq, Clone)]
pub struct EndPoint {
    pub listener_name: String,
    pub host: String,
    pub port: u16,
}

/// Parses comma separated string into Vec
/// The whitespaces \s around the commas are removed
pub fn parse_csv_list(csv_list: &str) -> Vec<String> {
    CSV_SEPARATOR
        .split(csv_list.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

/// Parses a broker `listeners` value, entries that are not `NAME://host:port` are skipped.
pub fn listener_list_to_end_points(listeners: &str) -> Vec<EndPoint> {
    tracing::trace!("listener_list_to_end_points: listeners {}", listeners);
    let mut end_points = vec![];
    for listener in parse_csv_list(listeners) {
        let captures = match LISTENER.captures(&listener) {
            Some(captures) => captures,
            None => {
                tracing::warn!("Skipping unparseable listener '{}'", listener);
                continue;
            },
        };
        match captures["port"].parse::<u16>() {
            Ok(port) => end_points.push(EndPoint {
                listener_name: captures["name"].to_string(),
                host: captures["host"].to_string(),
                port,
            }),
            Err(err) => tracing::warn!("Skipping listener '{}': {}", listener, err),
        }
    }
    end_points
}
