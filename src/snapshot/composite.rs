//! Count-then-fan-out reads for list-shaped player state
//!
//! Playlist, track list, chapter list and metadata all follow the same shape
//! on the player: a `<name>/count` property, then indexed sub-properties
//! `<name>/<i>/<field>`. [`fetch_composite`] implements that once; each list is
//! described by a [`CompositeSpec`].
//!
//! Isolation rule: a sub-field read that fails yields `Absent` for that field
//! only. Only the count read can fail the whole list.

use futures::future::join_all;
use tracing::debug;

use crate::player::{Entry, PlayerHandle, PlayerResult, PropertyValue};

/// One indexed sub-property and the name it is exposed under
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Player sub-path (`filename` in `playlist/3/filename`)
    pub path: &'static str,
    /// Key in the resulting entry
    pub name: &'static str,
}

impl Field {
    pub const fn same(path: &'static str) -> Self {
        Self { path, name: path }
    }

    pub const fn renamed(path: &'static str, name: &'static str) -> Self {
        Self { path, name }
    }
}

pub struct CompositeSpec {
    /// Property holding the item count
    pub count: &'static str,
    /// Prefix of the indexed sub-properties
    pub prefix: &'static str,
    /// Fields read for every item, concurrently
    pub fields: &'static [Field],
    /// Extra fields chosen from the base fields (e.g. by track type)
    pub extras: fn(&Entry) -> &'static [Field],
    /// Include the item's position as `index`
    pub with_index: bool,
    /// Post-processing of a finished entry
    pub finish: fn(&mut Entry),
}

fn no_extras(_: &Entry) -> &'static [Field] {
    &[]
}

fn no_finish(_: &mut Entry) {}

// =============================================================================
// Playlist
// =============================================================================

pub static PLAYLIST: CompositeSpec = CompositeSpec {
    count: "playlist-count",
    prefix: "playlist",
    fields: &[
        Field::same("id"),
        Field::renamed("filename", "filePath"),
        Field::same("current"),
        Field::same("title"),
    ],
    extras: no_extras,
    with_index: true,
    finish: playlist_basename,
};

/// Adds `filename` (last path component) next to the full `filePath`
fn playlist_basename(entry: &mut Entry) {
    let name = entry
        .get("filePath")
        .and_then(PropertyValue::non_empty_str)
        .map(basename);
    if let Some(name) = name {
        entry.insert("filename".to_string(), PropertyValue::Text(name));
    }
}

fn basename(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

// =============================================================================
// Track list
// =============================================================================

const VIDEO_FIELDS: &[Field] = &[Field::same("demux-w"), Field::same("demux-h")];

const AUDIO_FIELDS: &[Field] = &[
    Field::same("demux-channel-count"),
    Field::same("demux-channels"),
    Field::same("demux-samplerate"),
    Field::same("demux-bitrate"),
    Field::same("lang"),
    Field::same("external-filename"),
];

const SUB_FIELDS: &[Field] = &[Field::same("lang"), Field::same("external-filename")];

pub static TRACK_LIST: CompositeSpec = CompositeSpec {
    count: "track-list/count",
    prefix: "track-list",
    fields: &[
        Field::same("id"),
        Field::same("type"),
        Field::same("selected"),
        Field::same("codec"),
    ],
    extras: track_extras,
    with_index: true,
    finish: no_finish,
};

fn track_extras(entry: &Entry) -> &'static [Field] {
    match entry.get("type").and_then(PropertyValue::as_str) {
        Some("video") => VIDEO_FIELDS,
        Some("audio") => AUDIO_FIELDS,
        Some("sub") => SUB_FIELDS,
        _ => &[],
    }
}

// =============================================================================
// Chapters
// =============================================================================

pub static CHAPTER_LIST: CompositeSpec = CompositeSpec {
    count: "chapter-list/count",
    prefix: "chapter-list",
    fields: &[Field::same("title"), Field::same("time")],
    extras: no_extras,
    with_index: false,
    finish: no_finish,
};

// =============================================================================
// Metadata
// =============================================================================

/// Key first; the value is only read for indices that have a key
pub static METADATA: CompositeSpec = CompositeSpec {
    count: "metadata/list/count",
    prefix: "metadata/list",
    fields: &[Field::same("key")],
    extras: metadata_value,
    with_index: false,
    finish: no_finish,
};

const METADATA_VALUE: &[Field] = &[Field::same("value")];

fn metadata_value(entry: &Entry) -> &'static [Field] {
    if entry.get("key").and_then(PropertyValue::non_empty_str).is_some() {
        METADATA_VALUE
    } else {
        &[]
    }
}

/// Fold metadata entries into a map; entries without key or value contribute nothing
pub fn metadata_map(entries: Vec<Entry>) -> PropertyValue {
    let map = entries
        .into_iter()
        .filter_map(|entry| {
            let key = entry.get("key")?.non_empty_str()?.to_string();
            let value = match entry.get("value")? {
                PropertyValue::Absent => return None,
                PropertyValue::Text(s) if s.is_empty() => return None,
                other => other.to_string(),
            };
            Some((key, value))
        })
        .collect();
    PropertyValue::Map(map)
}

// =============================================================================
// Fan-out
// =============================================================================

/// Read the count, then every item's fields concurrently
pub async fn fetch_composite(
    player: &dyn PlayerHandle,
    spec: &CompositeSpec,
) -> PlayerResult<Vec<Entry>> {
    let count = match player.get(spec.count).await {
        Ok(value) => value.as_u64().unwrap_or(0),
        // Nothing loaded: an empty list, not an error
        Err(e) if e.is_unavailable() => 0,
        Err(e) => return Err(e),
    };

    let items = (0..count).map(|index| fetch_item(player, spec, index));
    Ok(join_all(items).await)
}

async fn fetch_item(player: &dyn PlayerHandle, spec: &CompositeSpec, index: u64) -> Entry {
    let mut entry = Entry::new();
    if spec.with_index {
        entry.insert("index".to_string(), PropertyValue::from(index as i64));
    }

    read_fields(player, spec.prefix, index, spec.fields, &mut entry).await;

    let extras = (spec.extras)(&entry);
    if !extras.is_empty() {
        read_fields(player, spec.prefix, index, extras, &mut entry).await;
    }

    (spec.finish)(&mut entry);
    entry
}

async fn read_fields(
    player: &dyn PlayerHandle,
    prefix: &str,
    index: u64,
    fields: &[Field],
    entry: &mut Entry,
) {
    let reads = fields.iter().map(|field| async move {
        let path = format!("{}/{}/{}", prefix, index, field.path);
        let value = match player.get(&path).await {
            Ok(value) => value,
            Err(e) => {
                if !e.is_unavailable() {
                    debug!("Sub-field {} failed: {}", path, e);
                }
                PropertyValue::Absent
            }
        };
        (field.name, value)
    });

    for (name, value) in join_all(reads).await {
        entry.insert(name.to_string(), value);
    }
}
