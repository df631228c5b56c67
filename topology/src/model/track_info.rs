//! Track information type

use provider_client::TrackDescriptor;
use serde::{Deserialize, Serialize};

/// What a device is currently playing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub artist: String,
    pub title: String,
    pub album: String,
    /// Album art URI, possibly relative to the player
    pub art: String,
}

impl TrackInfo {
    /// Check if track info has any meaningful content
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty() && self.album.is_empty()
    }
}

impl From<&TrackDescriptor> for TrackInfo {
    fn from(track: &TrackDescriptor) -> Self {
        Self {
            artist: track.artist.clone().unwrap_or_default(),
            title: track.title.clone().unwrap_or_default(),
            album: track.album.clone().unwrap_or_default(),
            art: track.album_art.clone().unwrap_or_default(),
        }
    }
}
