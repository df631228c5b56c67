//! Wire types for the provider's `/zones` and `/<room>/state` responses
//!
//! Every field is optional at parse time. A mistyped field decodes as absent
//! and a member that is not an object is skipped, so one bad entry never
//! takes its zone down with it. Validation happens in the synchronizer,
//! which drops a malformed zone without failing the whole snapshot.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One playback domain as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneDescriptor {
    #[serde(default, deserialize_with = "lenient")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub coordinator: Option<MemberDescriptor>,
    #[serde(default, deserialize_with = "lenient_members")]
    pub members: Vec<MemberDescriptor>,
}

impl ZoneDescriptor {
    /// Decode a single zone, falling back to an empty (and therefore
    /// malformed) descriptor when the value has the wrong shape.
    pub fn from_value_lossy(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(zone) => zone,
            Err(e) => {
                tracing::debug!("Undecodable zone descriptor: {}", e);
                Self::default()
            }
        }
    }
}

/// A coordinator or member entry inside a zone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDescriptor {
    #[serde(default, deserialize_with = "lenient")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub room_name: Option<String>,
    /// Explicit liveness flag; absent means the provider considers it present
    #[serde(default, deserialize_with = "lenient")]
    pub online: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<StateBlock>,
}

/// Playback state of a single player
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStateBlock")]
pub struct StateBlock {
    pub volume: Option<u8>,
    pub mute: Option<bool>,
    pub playback_state: Option<String>,
    pub current_track: Option<TrackDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStateBlock {
    #[serde(default, deserialize_with = "clamped_volume")]
    volume: Option<u8>,
    #[serde(default, deserialize_with = "lenient")]
    mute: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    playback_state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    player_state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    zone_state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    current_track: Option<TrackDescriptor>,
}

impl From<RawStateBlock> for StateBlock {
    fn from(raw: RawStateBlock) -> Self {
        Self {
            volume: raw.volume,
            mute: raw.mute,
            playback_state: raw.playback_state.or(raw.player_state).or(raw.zone_state),
            current_track: raw.current_track,
        }
    }
}

/// Track metadata attached to a player state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTrackDescriptor")]
pub struct TrackDescriptor {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub uri: Option<String>,
    pub album_art: Option<String>,
}

impl TrackDescriptor {
    /// TV audio arrives over S/PDIF or HDMI ARC and has no queue to resume
    pub fn is_line_in(&self) -> bool {
        self.uri
            .as_deref()
            .map(|uri| uri.contains("spdif") || uri.contains("htastream"))
            .unwrap_or(false)
    }
}

#[derive(Deserialize)]
struct RawTrackDescriptor {
    #[serde(default, deserialize_with = "lenient")]
    artist: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    album: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    uri: Option<String>,
    #[serde(default, rename = "albumArtUri", deserialize_with = "lenient")]
    album_art_uri: Option<String>,
    #[serde(default, rename = "albumArtURI", deserialize_with = "lenient")]
    album_art_uri_upper: Option<String>,
    #[serde(default, rename = "absoluteAlbumArtUri", deserialize_with = "lenient")]
    absolute_album_art_uri: Option<String>,
}

impl From<RawTrackDescriptor> for TrackDescriptor {
    fn from(raw: RawTrackDescriptor) -> Self {
        Self {
            artist: raw.artist,
            title: raw.title,
            album: raw.album,
            uri: raw.uri,
            album_art: raw
                .album_art_uri_upper
                .or(raw.album_art_uri)
                .or(raw.absolute_album_art_uri),
        }
    }
}

fn clamped_volume<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(raw.as_f64().map(|v| v.clamp(0.0, 100.0).round() as u8))
}

/// Decode a field, treating a value of the wrong type as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::debug!("Ignoring mistyped field: {}", e);
            Ok(None)
        }
    }
}

/// Decode a member list entry by entry, skipping entries that are not members
fn lenient_members<'de, D>(deserializer: D) -> Result<Vec<MemberDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        tracing::debug!("Ignoring non-list zone members");
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(member) => Some(member),
            Err(e) => {
                tracing::debug!("Skipping undecodable zone member: {}", e);
                None
            }
        })
        .collect())
}
