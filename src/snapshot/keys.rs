//! Canonical status keys, where each is read from, and its documented default

use std::borrow::Cow;

use super::composite::{
    fetch_composite, metadata_map, CompositeSpec, CHAPTER_LIST, METADATA, PLAYLIST, TRACK_LIST,
};
use crate::player::{PlayerHandle, PlayerResult, PropertyValue};

/// Value substituted when a key has no fresh, cached or player-provided value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Null,
    Bool(bool),
    Int(i64),
    Text(&'static str),
    EmptyList,
    EmptyMap,
}

impl Fallback {
    pub fn to_value(self) -> PropertyValue {
        match self {
            Self::Null => PropertyValue::Absent,
            Self::Bool(b) => PropertyValue::Bool(b),
            Self::Int(i) => PropertyValue::from(i),
            Self::Text(s) => PropertyValue::from(s),
            Self::EmptyList => PropertyValue::List(Vec::new()),
            Self::EmptyMap => PropertyValue::Map(Default::default()),
        }
    }
}

#[derive(Clone, Copy)]
pub enum Source {
    /// Single property read
    Property(&'static str),
    /// Count-then-fan-out list
    List(&'static CompositeSpec),
    /// Count-then-fan-out folded into a string map
    Metadata,
}

/// How one snapshot key is produced
#[derive(Clone)]
pub struct KeySpec {
    pub key: Cow<'static, str>,
    pub source: KeySource,
    pub fallback: Fallback,
}

/// Source for canonical keys, or an arbitrary property path for ad hoc keys
#[derive(Clone)]
pub enum KeySource {
    Static(Source),
    Path(String),
}

const fn canonical(key: &'static str, source: Source, fallback: Fallback) -> KeySpec {
    KeySpec {
        key: Cow::Borrowed(key),
        source: KeySource::Static(source),
        fallback,
    }
}

const fn property(key: &'static str, fallback: Fallback) -> KeySpec {
    canonical(key, Source::Property(key), fallback)
}

/// The status object, in response order
pub static CANONICAL_KEYS: &[KeySpec] = &[
    property("pause", Fallback::Bool(false)),
    property("mute", Fallback::Bool(false)),
    property("filename", Fallback::Null),
    property("path", Fallback::Null),
    property("duration", Fallback::Int(0)),
    canonical("position", Source::Property("time-pos"), Fallback::Int(0)),
    canonical("remaining", Source::Property("time-remaining"), Fallback::Int(0)),
    property("media-title", Fallback::Null),
    property("chapter", Fallback::Int(0)),
    property("volume", Fallback::Int(0)),
    property("volume-max", Fallback::Int(100)),
    property("fullscreen", Fallback::Bool(false)),
    property("speed", Fallback::Int(1)),
    property("sub-delay", Fallback::Int(0)),
    property("sub-visibility", Fallback::Bool(true)),
    property("audio-delay", Fallback::Int(0)),
    property("sub-font-size", Fallback::Int(55)),
    property("sub-ass-override", Fallback::Text("no")),
    canonical("playlist", Source::List(&PLAYLIST), Fallback::EmptyList),
    canonical("chapter-list", Source::List(&CHAPTER_LIST), Fallback::EmptyList),
    canonical("track-list", Source::List(&TRACK_LIST), Fallback::EmptyList),
    canonical("metadata", Source::Metadata, Fallback::EmptyMap),
];

impl KeySpec {
    /// Canonical spec for `key`, or a plain property read with a null default
    pub fn lookup(key: &str) -> KeySpec {
        CANONICAL_KEYS
            .iter()
            .find(|spec| spec.key == key)
            .cloned()
            .unwrap_or_else(|| KeySpec {
                key: Cow::Owned(key.to_string()),
                source: KeySource::Path(key.to_string()),
                fallback: Fallback::Null,
            })
    }

    pub fn is_canonical(key: &str) -> bool {
        CANONICAL_KEYS.iter().any(|spec| spec.key == key)
    }

    pub fn default_value(&self) -> PropertyValue {
        self.fallback.to_value()
    }

    /// Read this key from the player. An unavailable or empty read resolves
    /// to the default; transport failures are returned so the caller can keep
    /// its last good value.
    pub async fn fetch(&self, player: &dyn PlayerHandle) -> PlayerResult<PropertyValue> {
        let result = match &self.source {
            KeySource::Path(path) => player.get(path).await,
            KeySource::Static(Source::Property(path)) => player.get(path).await,
            KeySource::Static(Source::List(spec)) => fetch_composite(player, spec)
                .await
                .map(PropertyValue::List),
            KeySource::Static(Source::Metadata) => {
                fetch_composite(player, &METADATA).await.map(metadata_map)
            }
        };

        let value = match result {
            Ok(value) => value,
            Err(e) if e.is_unavailable() => PropertyValue::Absent,
            Err(e) => return Err(e),
        };

        if value.is_absent() {
            Ok(self.default_value())
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlayer;
    use std::collections::HashSet;

    #[test]
    fn canonical_keys_are_unique() {
        let keys: HashSet<_> = CANONICAL_KEYS.iter().map(|s| s.key.as_ref()).collect();
        assert_eq!(keys.len(), CANONICAL_KEYS.len());
        assert_eq!(CANONICAL_KEYS.len(), 22);
    }

    #[test]
    fn unknown_key_gets_null_default() {
        let spec = KeySpec::lookup("estimated-vf-fps");
        assert!(!KeySpec::is_canonical("estimated-vf-fps"));
        assert_eq!(spec.default_value(), PropertyValue::Absent);
    }

    #[tokio::test]
    async fn position_reads_time_pos() {
        let player = FakePlayer::new().with("time-pos", 12.5);
        let value = KeySpec::lookup("position").fetch(&player).await.unwrap();
        assert_eq!(value, PropertyValue::from(12.5));
    }

    #[tokio::test]
    async fn unavailable_property_uses_default() {
        let player = FakePlayer::new();
        let value = KeySpec::lookup("sub-font-size").fetch(&player).await.unwrap();
        assert_eq!(value, PropertyValue::from(55i64));
    }

    #[tokio::test]
    async fn transport_failure_is_returned_not_defaulted() {
        let player = FakePlayer::new().failing("sub-ass-override");
        let result = KeySpec::lookup("sub-ass-override").fetch(&player).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failing_composite_count_is_returned() {
        let player = FakePlayer::new().failing("playlist-count");
        assert!(KeySpec::lookup("playlist").fetch(&player).await.is_err());
    }

    #[tokio::test]
    async fn metadata_key_produces_map() {
        let player = FakePlayer::new()
            .with("metadata/list/count", 1i64)
            .with("metadata/list/0/key", "title")
            .with("metadata/list/0/value", "Intro");
        let value = KeySpec::lookup("metadata").fetch(&player).await.unwrap();
        match value {
            PropertyValue::Map(map) => assert_eq!(map["title"], "Intro"),
            other => panic!("Expected map, got {:?}", other),
        }
    }
}
