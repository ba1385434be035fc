use std::collections::HashSet;

use crate::models::ResolvedTrack;

/// Insertion-ordered track collection with first-insert-wins deduplication.
///
/// Tracks are keyed by catalog id and by display string ("name - artists"),
/// so the final playlist can contain neither two entries with the same id
/// nor two identical display lines. Because seeds are inserted before
/// similarity results, "seeds win ties" is a property of insertion order
/// rather than emergent list-concatenation behavior.
#[derive(Debug, Default)]
pub struct OrderedTrackSet {
    seen_ids: HashSet<String>,
    seen_display: HashSet<String>,
    tracks: Vec<ResolvedTrack>,
}

impl OrderedTrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a track unless its id or display string is already present.
    /// Returns whether the track was added.
    pub fn insert(&mut self, track: ResolvedTrack) -> bool {
        let display = track.display();
        if !track.id.is_empty() && self.seen_ids.contains(&track.id) {
            return false;
        }
        if self.seen_display.contains(&display) {
            return false;
        }
        if !track.id.is_empty() {
            self.seen_ids.insert(track.id.clone());
        }
        self.seen_display.insert(display);
        self.tracks.push(track);
        true
    }

    /// Last-resort insert used when backfilling a remix to its target
    /// length: a duplicate display line is tolerated, duplicate ids are not.
    pub fn force_insert(&mut self, track: ResolvedTrack) -> bool {
        if !track.id.is_empty() && self.seen_ids.contains(&track.id) {
            return false;
        }
        if !track.id.is_empty() {
            self.seen_ids.insert(track.id.clone());
        }
        self.seen_display.insert(track.display());
        self.tracks.push(track);
        true
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[ResolvedTrack] {
        &self.tracks
    }

    pub fn into_vec(self) -> Vec<ResolvedTrack> {
        self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeedSource;

    fn track(id: &str, name: &str, source: SeedSource) -> ResolvedTrack {
        ResolvedTrack {
            id: id.to_string(),
            name: name.to_string(),
            artists: "Artist".to_string(),
            artist_ids: Vec::new(),
            album_name: String::new(),
            album_image_url: String::new(),
            year: None,
            duration_ms: 0,
            popularity: None,
            source,
        }
    }

    #[test]
    fn first_insert_wins_on_id_collision() {
        let mut set = OrderedTrackSet::new();
        assert!(set.insert(track("t1", "Seed Version", SeedSource::LlmSeed)));
        assert!(!set.insert(track("t1", "Similarity Version", SeedSource::Similarity)));

        assert_eq!(set.len(), 1);
        assert_eq!(set.tracks()[0].source, SeedSource::LlmSeed);
    }

    #[test]
    fn display_collisions_are_dropped_even_with_new_ids() {
        let mut set = OrderedTrackSet::new();
        assert!(set.insert(track("t1", "Same Song", SeedSource::LlmSeed)));
        assert!(!set.insert(track("t2", "Same Song", SeedSource::Similarity)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn idless_tracks_dedupe_by_display_only() {
        let mut set = OrderedTrackSet::new();
        assert!(set.insert(track("", "Song A", SeedSource::Playlist)));
        assert!(!set.insert(track("", "Song A", SeedSource::Playlist)));
        assert!(set.insert(track("", "Song B", SeedSource::Playlist)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut set = OrderedTrackSet::new();
        for id in ["t3", "t1", "t2"] {
            set.insert(track(id, &format!("Song {id}"), SeedSource::LlmSeed));
        }
        let ids: Vec<&str> = set.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn force_insert_allows_display_duplicates_but_not_id_duplicates() {
        let mut set = OrderedTrackSet::new();
        set.insert(track("t1", "Same Song", SeedSource::Playlist));
        assert!(set.force_insert(track("t2", "Same Song", SeedSource::Playlist)));
        assert!(!set.force_insert(track("t1", "Same Song", SeedSource::Playlist)));
        assert_eq!(set.len(), 2);
    }
}
