//! The four-stage progress contract for the chat UI.
//!
//! Analyzing → searching → drafting → verifying, shown in strict order.
//! These are cosmetic states layered over a single request/stream - no
//! stage gates any network operation. The state machine ships here so
//! the contract is tested, with events mapping to the real milestones:
//! the first two stages complete on a short artificial delay / receipt
//! of response headers, drafting completes at the first streamed token,
//! verifying when the stream ends.

use std::time::Duration;

use serde::Serialize;

/// Advisory delay after which the UI completes "analyzing" on its own.
pub const ANALYZING_DELAY: Duration = Duration::from_millis(700);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Analyzing,
    Searching,
    Drafting,
    Verifying,
}

pub const STAGE_ORDER: [ProgressStage; 4] = [
    ProgressStage::Analyzing,
    ProgressStage::Searching,
    ProgressStage::Drafting,
    ProgressStage::Verifying,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Active,
    Complete,
}

/// Milestones of the underlying request/stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The send was initiated.
    Started,
    /// The artificial analyzing delay elapsed.
    AnalyzingDelayElapsed,
    /// Response headers arrived.
    HeadersReceived,
    /// First streamed token arrived.
    FirstToken,
    /// The stream ended cleanly.
    StreamEnded,
    /// The send failed; the indicator clears entirely.
    Failed,
}

/// Monotonic progress indicator. Events only ever advance the cursor,
/// so a fast stream that delivers its first token before the artificial
/// delay fires cannot move a stage backwards.
#[derive(Debug, Default)]
pub struct ProgressIndicator {
    cursor: u8,
    cleared: bool,
}

impl ProgressIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ProgressEvent) {
        if event == ProgressEvent::Failed {
            self.cleared = true;
            self.cursor = 0;
            return;
        }
        let target = match event {
            ProgressEvent::Started => 1,
            ProgressEvent::AnalyzingDelayElapsed => 2,
            ProgressEvent::HeadersReceived => 3,
            ProgressEvent::FirstToken => 4,
            ProgressEvent::StreamEnded => 5,
            ProgressEvent::Failed => unreachable!(),
        };
        self.cleared = false;
        self.cursor = self.cursor.max(target);
    }

    pub fn state_of(&self, stage: ProgressStage) -> StageState {
        if self.cleared || self.cursor == 0 {
            return StageState::Pending;
        }
        let index = match stage {
            ProgressStage::Analyzing => 1,
            ProgressStage::Searching => 2,
            ProgressStage::Drafting => 3,
            ProgressStage::Verifying => 4,
        };
        if self.cursor > index {
            StageState::Complete
        } else if self.cursor == index {
            StageState::Active
        } else {
            StageState::Pending
        }
    }

    /// Snapshot in display order.
    pub fn stages(&self) -> [(ProgressStage, StageState); 4] {
        STAGE_ORDER.map(|stage| (stage, self.state_of(stage)))
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_complete_in_strict_order() {
        let mut progress = ProgressIndicator::new();
        progress.apply(ProgressEvent::Started);
        assert_eq!(progress.state_of(ProgressStage::Analyzing), StageState::Active);
        assert_eq!(progress.state_of(ProgressStage::Verifying), StageState::Pending);

        progress.apply(ProgressEvent::AnalyzingDelayElapsed);
        assert_eq!(progress.state_of(ProgressStage::Analyzing), StageState::Complete);
        assert_eq!(progress.state_of(ProgressStage::Searching), StageState::Active);

        progress.apply(ProgressEvent::HeadersReceived);
        assert_eq!(progress.state_of(ProgressStage::Searching), StageState::Complete);
        assert_eq!(progress.state_of(ProgressStage::Drafting), StageState::Active);

        progress.apply(ProgressEvent::FirstToken);
        assert_eq!(progress.state_of(ProgressStage::Drafting), StageState::Complete);
        assert_eq!(progress.state_of(ProgressStage::Verifying), StageState::Active);

        progress.apply(ProgressEvent::StreamEnded);
        assert!(progress.is_finished());
        for (_, state) in progress.stages() {
            assert_eq!(state, StageState::Complete);
        }
    }

    #[test]
    fn fast_stream_never_moves_backwards() {
        let mut progress = ProgressIndicator::new();
        progress.apply(ProgressEvent::Started);
        // First token beats the artificial delay.
        progress.apply(ProgressEvent::FirstToken);
        assert_eq!(progress.state_of(ProgressStage::Verifying), StageState::Active);

        // The late delay tick must not regress anything.
        progress.apply(ProgressEvent::AnalyzingDelayElapsed);
        assert_eq!(progress.state_of(ProgressStage::Verifying), StageState::Active);
        assert_eq!(progress.state_of(ProgressStage::Drafting), StageState::Complete);
    }

    #[test]
    fn failure_clears_the_indicator() {
        let mut progress = ProgressIndicator::new();
        progress.apply(ProgressEvent::Started);
        progress.apply(ProgressEvent::HeadersReceived);
        progress.apply(ProgressEvent::Failed);

        assert!(progress.is_cleared());
        for (_, state) in progress.stages() {
            assert_eq!(state, StageState::Pending);
        }
    }

    #[test]
    fn display_order_is_fixed() {
        let progress = ProgressIndicator::new();
        let order: Vec<ProgressStage> = progress.stages().iter().map(|(s, _)| *s).collect();
        assert_eq!(order, STAGE_ORDER.to_vec());
    }
}
