use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_SEED_ROOMS: &str = "Room 1,Room 2,Room 3,Room 4";

/// Server settings, read from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub seed_rooms: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7878,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            seed_rooms: parse_room_list(DEFAULT_SEED_ROOMS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            port: parsed(&lookup, "ROOMBOOK_PORT").unwrap_or(defaults.port),
            bind: lookup("ROOMBOOK_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("ROOMBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "ROOMBOOK_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "ROOMBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "ROOMBOOK_METRICS_PORT"),
            seed_rooms: lookup("ROOMBOOK_SEED_ROOMS")
                .map(|s| parse_room_list(&s))
                .unwrap_or(defaults.seed_rooms),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roombook.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn parse_room_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:7878");
        assert_eq!(config.seed_rooms, ["Room 1", "Room 2", "Room 3", "Room 4"]);
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("ROOMBOOK_PORT", "9000"),
            ("ROOMBOOK_BIND", "127.0.0.1"),
            ("ROOMBOOK_DATA_DIR", "/var/lib/roombook"),
            ("ROOMBOOK_MAX_CONNECTIONS", "8"),
            ("ROOMBOOK_COMPACT_THRESHOLD", "50"),
            ("ROOMBOOK_METRICS_PORT", "9100"),
            ("ROOMBOOK_SEED_ROOMS", " Aula , ,Library"),
        ]));
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/roombook/roombook.wal"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.seed_rooms, ["Aula", "Library"]);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("ROOMBOOK_PORT", "http"),
            ("ROOMBOOK_METRICS_PORT", "-1"),
        ]));
        assert_eq!(config.port, 7878);
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn empty_seed_list_disables_seeding() {
        let config = Config::from_lookup(lookup_from(&[("ROOMBOOK_SEED_ROOMS", "")]));
        assert!(config.seed_rooms.is_empty());
    }
}
