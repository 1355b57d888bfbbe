//! Server configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use docwatch_core::{RoomTemplate, DEFAULT_FEED_CAPACITY};
use docwatch_transport::push::DEFAULT_ENDPOINT as DEFAULT_PUSH_ENDPOINT;
use docwatch_transport::{BroadcasterConfig, ServiceAccountKey};

use crate::error::Error;

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Default storage directory.
pub const DEFAULT_DATA_PATH: &str = "./data";

/// Default broadcaster request timeout in milliseconds.
pub const DEFAULT_BROADCASTER_TIMEOUT_MS: u64 = 10_000;

/// Separators trimmed from a room pattern's prefix to form its global room.
const ROOM_SEPARATORS: &[char] = &['.', '/', ':', '-', '_'];

/// A collection to watch and the rooms its changes are published to.
///
/// Parsed from `<collection>[=<rooms>]`. Without `=`, rooms are
/// `<collection>.<key>`. A `<rooms>` value without `{key}` is a prefix;
/// with `{key}` it is a pattern whose global room is the text before the
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    /// Collection name.
    pub collection: String,
    /// Room template for the collection.
    pub rooms: RoomTemplate,
}

impl WatchSpec {
    /// Watch `collection`, publishing to `<collection>.<key>`.
    pub fn new(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            rooms: RoomTemplate::prefix(collection.clone()),
            collection,
        }
    }

    /// Use a different room template.
    pub fn with_rooms(mut self, rooms: RoomTemplate) -> Self {
        self.rooms = rooms;
        self
    }
}

impl FromStr for WatchSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (collection, rooms) = match s.split_once('=') {
            Some((collection, rooms)) => (collection.trim(), Some(rooms.trim())),
            None => (s.trim(), None),
        };

        if collection.is_empty() {
            return Err(Error::Config(format!("watch {:?} names no collection", s)));
        }

        let spec = WatchSpec::new(collection);
        let rooms = match rooms {
            None => return Ok(spec),
            Some("") => {
                return Err(Error::Config(format!("watch {:?} has an empty room", s)));
            }
            Some(rooms) => rooms,
        };

        let template = match rooms.find(docwatch_core::room::KEY_PLACEHOLDER) {
            None => RoomTemplate::prefix(rooms),
            Some(index) => {
                let global = rooms[..index].trim_end_matches(ROOM_SEPARATORS);
                let global = if global.is_empty() { collection } else { global };
                RoomTemplate::new(rooms, global)?
            }
        };

        Ok(spec.with_rooms(template))
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the document store directory.
    pub data_path: PathBuf,
    /// HTTP listen address.
    pub listen_addr: String,
    /// Watched collections.
    pub watches: Vec<WatchSpec>,
    /// Load every document into the cache before watching.
    pub preheat: bool,
    /// Also publish every change to the collection's global room.
    pub global_room: bool,
    /// HTTP broadcaster, if enabled.
    pub broadcaster: Option<BroadcasterConfig>,
    /// Push service-account key, if push delivery is enabled.
    pub push_key: Option<ServiceAccountKey>,
    /// Push API endpoint.
    pub push_endpoint: String,
    /// Change feed buffer per subscriber.
    pub feed_capacity: usize,
}

impl ServerConfig {
    /// Create a configuration with the given data path and no watches.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            listen_addr: DEFAULT_LISTEN_ADDRESS.to_string(),
            watches: Vec::new(),
            preheat: false,
            global_room: false,
            broadcaster: None,
            push_key: None,
            push_endpoint: DEFAULT_PUSH_ENDPOINT.to_string(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }

    /// Set the listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Add a watched collection.
    pub fn with_watch(mut self, watch: WatchSpec) -> Self {
        self.watches.push(watch);
        self
    }

    /// Enable or disable cache preheat.
    pub fn with_preheat(mut self, preheat: bool) -> Self {
        self.preheat = preheat;
        self
    }

    /// Enable or disable global-room publishing.
    pub fn with_global_room(mut self, enabled: bool) -> Self {
        self.global_room = enabled;
        self
    }

    /// Enable the HTTP broadcaster.
    pub fn with_broadcaster(mut self, broadcaster: BroadcasterConfig) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Enable push delivery.
    pub fn with_push_key(mut self, key: ServiceAccountKey) -> Self {
        self.push_key = Some(key);
        self
    }

    /// Set the push API endpoint.
    pub fn with_push_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.push_endpoint = endpoint.into();
        self
    }

    /// Set the change feed buffer.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity.max(1);
        self
    }

    /// Check if at least one delivery channel is configured.
    pub fn has_transport(&self) -> bool {
        self.broadcaster.is_some() || self.push_key.is_some()
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = std::collections::HashSet::new();
        for watch in &self.watches {
            if !seen.insert(watch.collection.as_str()) {
                return Err(Error::Config(format!(
                    "collection {} is watched twice",
                    watch.collection
                )));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "docwatch-server")]
#[command(version, about = "Watches document collections and publishes their changes", long_about = None)]
pub struct Args {
    /// Path to the document store directory.
    #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// HTTP address to listen on.
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen: String,

    /// Collection to watch, as `<collection>[=<room prefix or pattern>]`. Repeatable.
    #[arg(short, long = "watch", value_name = "COLLECTION[=ROOMS]")]
    pub watches: Vec<WatchSpec>,

    /// Load every document into the cache before watching.
    #[arg(long)]
    pub preheat: bool,

    /// Also publish every change to the collection's global room.
    #[arg(long)]
    pub global_room: bool,

    /// Base URL of the HTTP broadcaster.
    #[arg(long, requires = "broadcaster_key")]
    pub broadcaster_url: Option<String>,

    /// Shared secret of the HTTP broadcaster.
    #[arg(long, requires = "broadcaster_url")]
    pub broadcaster_key: Option<String>,

    /// Broadcaster request timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_BROADCASTER_TIMEOUT_MS)]
    pub broadcaster_timeout_ms: u64,

    /// Base64-encoded push service-account key file.
    #[arg(long)]
    pub push_credentials: Option<String>,

    /// Push API endpoint.
    #[arg(long, default_value = DEFAULT_PUSH_ENDPOINT)]
    pub push_endpoint: String,

    /// Change feed buffer per subscriber.
    #[arg(long, default_value_t = DEFAULT_FEED_CAPACITY)]
    pub feed_capacity: usize,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> Result<ServerConfig, Error> {
        let broadcaster = match (self.broadcaster_url, self.broadcaster_key) {
            (Some(url), Some(key)) => Some(
                BroadcasterConfig::new(url, key)
                    .with_timeout(Duration::from_millis(self.broadcaster_timeout_ms)),
            ),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "--broadcaster-url and --broadcaster-key must be set together".to_string(),
                ))
            }
        };

        let push_key = self
            .push_credentials
            .as_deref()
            .map(ServiceAccountKey::from_base64)
            .transpose()?;

        let config = ServerConfig {
            data_path: self.data_path,
            listen_addr: self.listen,
            watches: self.watches,
            preheat: self.preheat,
            global_room: self.global_room,
            broadcaster,
            push_key,
            push_endpoint: self.push_endpoint,
            feed_capacity: self.feed_capacity.max(1),
        };
        config.validate()?;

        Ok(config)
    }
}
