//! Per-room track queue with wraparound navigation.
//!
//! Insertion order is playback order. Additions are idempotent by video id.
//! Only ever touched from inside a room session's serial loop, so no
//! synchronization is needed here.

use crate::track::Track;

/// Ordered track queue plus the current playback position.
#[derive(Debug, Default)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    /// Index of the current track. Meaningless while `tracks` is empty;
    /// invariant `current < tracks.len()` otherwise.
    current: usize,
}

impl TrackQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the queue holds no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Returns the number of queued tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns the queued tracks in playback order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Returns the current track, if any.
    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current)
    }

    /// Appends a track unless one with the same video id is already queued.
    ///
    /// Returns `true` if the track was appended.
    pub fn add(&mut self, track: Track) -> bool {
        if self.position_of(&track.video_id).is_some() {
            return false;
        }
        self.tracks.push(track);
        true
    }

    /// Makes the given track current, appending it first if absent.
    ///
    /// Returns the now-current track.
    pub fn select(&mut self, track: Track) -> &Track {
        let idx = match self.position_of(&track.video_id) {
            Some(idx) => idx,
            None => {
                self.tracks.push(track);
                self.tracks.len() - 1
            }
        };
        self.current = idx;
        &self.tracks[self.current]
    }

    /// Advances to the next track, wrapping to the start past the end.
    ///
    /// Returns `None` when the queue is empty.
    pub fn next(&mut self) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.tracks.len();
        Some(&self.tracks[self.current])
    }

    /// Retreats to the previous track, wrapping to the end before the start.
    ///
    /// Returns `None` when the queue is empty.
    pub fn previous(&mut self) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.current = self.current.checked_sub(1).unwrap_or(self.tracks.len() - 1);
        Some(&self.tracks[self.current])
    }

    fn position_of(&self, video_id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.video_id == video_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::new(format!("Track {}", id), id).unwrap()
    }

    #[test]
    fn add_is_idempotent_by_video_id() {
        let mut queue = TrackQueue::new();
        assert!(queue.add(track("abc12345678")));
        assert!(!queue.add(track("abc12345678")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn next_wraps_around() {
        let mut queue = TrackQueue::new();
        queue.add(track("aaaaaaaaaa1"));
        queue.add(track("aaaaaaaaaa2"));
        queue.add(track("aaaaaaaaaa3"));

        // current starts at index 0
        assert_eq!(queue.next().unwrap().video_id, "aaaaaaaaaa2");
        assert_eq!(queue.next().unwrap().video_id, "aaaaaaaaaa3");
        // index 2 -> next wraps to index 0
        assert_eq!(queue.next().unwrap().video_id, "aaaaaaaaaa1");
    }

    #[test]
    fn previous_wraps_around() {
        let mut queue = TrackQueue::new();
        queue.add(track("aaaaaaaaaa1"));
        queue.add(track("aaaaaaaaaa2"));
        queue.add(track("aaaaaaaaaa3"));

        // index 0 -> previous wraps to index 2
        assert_eq!(queue.previous().unwrap().video_id, "aaaaaaaaaa3");
        assert_eq!(queue.previous().unwrap().video_id, "aaaaaaaaaa2");
    }

    #[test]
    fn empty_queue_navigation_is_noop() {
        let mut queue = TrackQueue::new();
        assert!(queue.next().is_none());
        assert!(queue.previous().is_none());
        assert!(queue.current_track().is_none());
    }

    #[test]
    fn select_existing_track_moves_current() {
        let mut queue = TrackQueue::new();
        queue.add(track("aaaaaaaaaa1"));
        queue.add(track("aaaaaaaaaa2"));

        queue.select(track("aaaaaaaaaa2"));
        assert_eq!(queue.current_track().unwrap().video_id, "aaaaaaaaaa2");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn select_unknown_track_appends() {
        let mut queue = TrackQueue::new();
        queue.add(track("aaaaaaaaaa1"));

        queue.select(track("aaaaaaaaaa9"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.current_track().unwrap().video_id, "aaaaaaaaaa9");
    }

    #[test]
    fn single_track_wraps_to_itself() {
        let mut queue = TrackQueue::new();
        queue.add(track("aaaaaaaaaa1"));
        assert_eq!(queue.next().unwrap().video_id, "aaaaaaaaaa1");
        assert_eq!(queue.previous().unwrap().video_id, "aaaaaaaaaa1");
    }
}
