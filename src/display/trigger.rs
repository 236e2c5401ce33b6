use log::debug;

use crate::display::buffer::DisplayBuffer;

/// Wraparound policy for one channel set, evaluated once per aggregation
/// pass on channel 0's cursor so that all traces stay time-aligned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TriggerState {
    /// No trigger source: the cursor wraps unconditionally at the right edge.
    FreeRunning,
    /// Armed but nothing observed since the last wrap: passes are skipped.
    WaitingForTrigger,
    /// A trigger was consumed; accumulating columns from pixel 0.
    Accumulating,
}

/// What the aggregator should do with the current pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassDecision {
    /// Keep emitting pixels from the current cursors.
    Proceed,
    /// Emit nothing this pass; stale data must not reach the screen.
    Skip,
    /// Wrap every screen cursor to 0. When triggered, also jump every
    /// display-buffer read cursor to the given ring position.
    Wrap { fast_forward: Option<usize> },
}

pub struct TriggerController {
    state: TriggerState,
    /// Look-back window ahead of the trigger, in pixels at the current ratio.
    pub lookback_px: usize,
    /// Hard cap on the look-back, as a fraction of the display buffer.
    pub max_lookback_fraction: f32,
}

impl TriggerController {
    pub fn new() -> Self {
        Self {
            state: TriggerState::FreeRunning,
            lookback_px: 10,
            max_lookback_fraction: 0.25,
        }
    }

    /// Re-arm after a configuration change.
    pub fn reset(&mut self, armed: bool) {
        self.state = if armed {
            TriggerState::WaitingForTrigger
        } else {
            TriggerState::FreeRunning
        };
    }

    pub fn is_waiting(&self) -> bool {
        self.state == TriggerState::WaitingForTrigger
    }

    /// Decide the fate of one aggregation pass. `cursor` is channel 0's
    /// screen-buffer index before the pass.
    pub fn evaluate(
        &mut self,
        display: &mut DisplayBuffer,
        cursor: usize,
        visible_width: usize,
        ratio: f32,
    ) -> PassDecision {
        // Follow the source configuration wherever it changed from.
        let armed = display.trigger_source().is_some();
        match (armed, self.state) {
            (false, TriggerState::FreeRunning) => {}
            (false, _) => self.state = TriggerState::FreeRunning,
            (true, TriggerState::FreeRunning) => self.state = TriggerState::WaitingForTrigger,
            (true, _) => {}
        }

        match self.state {
            TriggerState::FreeRunning => {
                if cursor >= visible_width {
                    PassDecision::Wrap { fast_forward: None }
                } else {
                    PassDecision::Proceed
                }
            }
            TriggerState::Accumulating => {
                if cursor >= visible_width {
                    self.state = TriggerState::WaitingForTrigger;
                    self.consume_trigger(display, ratio)
                } else {
                    PassDecision::Proceed
                }
            }
            TriggerState::WaitingForTrigger => self.consume_trigger(display, ratio),
        }
    }

    fn consume_trigger(&mut self, display: &mut DisplayBuffer, ratio: f32) -> PassDecision {
        let Some(trigger_pos) = display.latest_trigger() else {
            return PassDecision::Skip;
        };
        let len = display.num_samples();
        let lookback = self.lookback_samples(len, ratio);
        let fast_forward = (trigger_pos + len - lookback) % len;
        display.acknowledge_trigger();
        self.state = TriggerState::Accumulating;
        debug!(
            "trigger at ring position {}, fast-forwarding read cursor to {}",
            trigger_pos, fast_forward
        );
        PassDecision::Wrap {
            fast_forward: Some(fast_forward),
        }
    }

    fn lookback_samples(&self, buffer_len: usize, ratio: f32) -> usize {
        let ratio = ratio.max(0.0);
        let requested = self.lookback_px as f32 * ratio;
        let cap = buffer_len as f32 * self.max_lookback_fraction;
        requested.min(cap) as usize
    }
}

impl Default for TriggerController {
    fn default() -> Self {
        Self::new()
    }
}
