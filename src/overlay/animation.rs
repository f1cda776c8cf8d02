//! Flip animation between two faces.
//!
//! A flip collapses the outgoing face to scale-Y 0, swaps visibility and
//! expands the incoming face back to 1. The midpoint is a deadline owned by
//! the overlay service loop, so cancelling a flip can never race with its
//! second half.

use std::time::Duration;

use tokio::time::Instant;

use super::display::Face;
use super::view::UiMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFlip {
    from: Face,
    to: Face,
    midpoint: Instant,
}

/// At most one flip in flight.
#[derive(Debug, Clone)]
pub struct FlipAnimator {
    half: Duration,
    pending: Option<PendingFlip>,
}

impl FlipAnimator {
    /// `half` is the duration of each half of the flip.
    pub fn new(half: Duration) -> Self {
        Self {
            half,
            pending: None,
        }
    }

    fn half_ms(&self) -> u64 {
        u64::try_from(self.half.as_millis()).unwrap_or(u64::MAX)
    }

    /// Starts a flip, replacing any running one. Returns the first half.
    pub fn start(&mut self, from: Face, to: Face, now: Instant) -> UiMessage {
        self.pending = Some(PendingFlip {
            from,
            to,
            midpoint: now + self.half,
        });
        UiMessage::Animate {
            face: from,
            scale_y: 0.0,
            duration_ms: self.half_ms(),
        }
    }

    /// Drops the running flip, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// When the second half is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.midpoint)
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    /// Finishes the running flip. Returns the swap and the second half.
    pub fn complete(&mut self) -> Vec<UiMessage> {
        match self.pending.take() {
            Some(PendingFlip { from, to, .. }) => vec![
                UiMessage::SwapFaces { from, to },
                UiMessage::Animate {
                    face: to,
                    scale_y: 1.0,
                    duration_ms: self.half_ms(),
                },
            ],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_sequence() {
        let mut flip = FlipAnimator::new(Duration::from_millis(200));
        let now = Instant::now();
        assert_eq!(
            flip.start(Face::Time, Face::Emoji, now),
            UiMessage::Animate {
                face: Face::Time,
                scale_y: 0.0,
                duration_ms: 200
            }
        );
        assert_eq!(flip.deadline(), Some(now + Duration::from_millis(200)));

        assert_eq!(
            flip.complete(),
            vec![
                UiMessage::SwapFaces {
                    from: Face::Time,
                    to: Face::Emoji
                },
                UiMessage::Animate {
                    face: Face::Emoji,
                    scale_y: 1.0,
                    duration_ms: 200
                },
            ]
        );
        assert!(!flip.is_running());
    }

    #[test]
    fn test_cancelled_flip_has_no_second_half() {
        let mut flip = FlipAnimator::new(Duration::from_millis(200));
        flip.start(Face::Emoji, Face::Icon, Instant::now());
        flip.cancel();
        assert!(flip.deadline().is_none());
        assert!(flip.complete().is_empty());
    }

    #[test]
    fn test_new_flip_replaces_running_one() {
        let mut flip = FlipAnimator::new(Duration::from_millis(200));
        let now = Instant::now();
        flip.start(Face::Time, Face::Emoji, now);
        flip.start(Face::Emoji, Face::Icon, now + Duration::from_millis(50));
        assert_eq!(
            flip.complete()[0],
            UiMessage::SwapFaces {
                from: Face::Emoji,
                to: Face::Icon
            }
        );
    }
}
