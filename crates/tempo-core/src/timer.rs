//! Per-actor channel timers.
//!
//! Every actor in the active set owns one [`ChannelTimer`] per
//! [`ActionKind`]. Channels are independent: arming, firing or cancelling one
//! never touches another, except under [`TimerPolicy::Shared`] where an
//! accepted action also pushes every channel's next-allowed time forward.
//!
//! ```text
//! Idle --arm--> Pending --due--> Fired --settle--> Idle
//!                  |                 \--re-arm--> Pending
//!                  \--cancel--> Idle
//! ```

use serde::{Deserialize, Serialize};

use tempo_audit::ActionKind;

use crate::action::ActionDescriptor;
use crate::actor::ActorId;

/// A timing channel. Channels are the four action kinds.
pub type Channel = ActionKind;

/// How an accepted action affects the other channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerPolicy {
    /// Each channel gates only itself.
    Independent,
    /// One shared next-allowed time gates all channels.
    Shared,
}

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    /// Nothing scheduled.
    #[default]
    Idle,
    /// An accepted action is waiting for its due time.
    Pending,
    /// The ready-timer fired this tick and no follow-up has been armed yet.
    Fired,
}

/// An accepted action waiting for its channel to become ready again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedAction {
    /// What was accepted.
    pub action: ActionDescriptor,
    /// Acceptance time.
    pub accepted_at_ms: u64,
    /// Delay the formula promised.
    pub expected_ms: u64,
    /// Resolution outcome, once delivered: did the action consume its resource?
    pub resource_consumed: Option<bool>,
    /// Delay native timing would have applied, when shadowing.
    pub native_ms: Option<u64>,
}

impl ArmedAction {
    /// Time the channel becomes ready.
    #[must_use]
    pub const fn due_ms(&self) -> u64 {
        self.accepted_at_ms + self.expected_ms
    }
}

/// One channel of one actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTimer {
    next_allowed_ms: u64,
    state: ChannelState,
    armed: Option<ArmedAction>,
    resolution_due_ms: Option<u64>,
}

impl ChannelTimer {
    /// Earliest time a new action may be accepted.
    #[must_use]
    pub const fn next_allowed_ms(&self) -> u64 {
        self.next_allowed_ms
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// The armed action, if pending.
    #[must_use]
    pub const fn armed(&self) -> Option<&ArmedAction> {
        self.armed.as_ref()
    }

    /// When the pending resolution is due, if one is scheduled.
    #[must_use]
    pub const fn resolution_due_ms(&self) -> Option<u64> {
        self.resolution_due_ms
    }

    /// When the ready-timer is due, if armed.
    #[must_use]
    pub fn due_ms(&self) -> Option<u64> {
        self.armed.map(|a| a.due_ms())
    }

    /// True if nothing is scheduled on this channel.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == ChannelState::Idle && self.armed.is_none() && self.resolution_due_ms.is_none()
    }
}

/// All channel timers of one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorTimerState {
    actor: ActorId,
    channels: [ChannelTimer; ActionKind::COUNT],
    last_activity_ms: u64,
}

impl ActorTimerState {
    /// Fresh state, all channels idle and permitted.
    #[must_use]
    pub fn new(actor: ActorId, now_ms: u64) -> Self {
        Self {
            actor,
            channels: [ChannelTimer::default(); ActionKind::COUNT],
            last_activity_ms: now_ms,
        }
    }

    /// Owning actor.
    #[must_use]
    pub const fn actor(&self) -> ActorId {
        self.actor
    }

    /// One channel.
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &ChannelTimer {
        &self.channels[channel.index()]
    }

    /// Last time any channel was armed, resolved or fired.
    #[must_use]
    pub const fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    /// Marks activity at `now_ms`.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = self.last_activity_ms.max(now_ms);
    }

    /// True if a new action on `channel` may be accepted at `now_ms`.
    #[must_use]
    pub fn is_permitted(&self, channel: Channel, now_ms: u64) -> bool {
        let timer = self.channel(channel);
        timer.state != ChannelState::Pending && now_ms >= timer.next_allowed_ms
    }

    /// Time until `channel` is permitted (0 if it already is).
    #[must_use]
    pub fn remaining_ms(&self, channel: Channel, now_ms: u64) -> u64 {
        let timer = self.channel(channel);
        let until = timer
            .armed
            .map_or(timer.next_allowed_ms, |a| a.due_ms().max(timer.next_allowed_ms));
        until.saturating_sub(now_ms)
    }

    /// True if every channel is idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.channels.iter().all(ChannelTimer::is_idle)
    }

    /// Arms `channel` with an accepted action and its resolution time.
    pub fn arm(&mut self, armed: ArmedAction, resolution_due_ms: u64, policy: TimerPolicy) {
        let due = armed.due_ms();
        let timer = &mut self.channels[armed.action.kind.index()];
        timer.next_allowed_ms = due;
        timer.state = ChannelState::Pending;
        timer.armed = Some(armed);
        timer.resolution_due_ms = Some(resolution_due_ms);

        if policy == TimerPolicy::Shared {
            for other in &mut self.channels {
                other.next_allowed_ms = other.next_allowed_ms.max(due);
            }
        }
        self.touch(armed.accepted_at_ms);
    }

    /// Takes the pending resolution of `channel` if it is due.
    pub fn take_due_resolution(&mut self, channel: Channel, now_ms: u64) -> Option<ArmedAction> {
        let timer = &mut self.channels[channel.index()];
        match (timer.resolution_due_ms, timer.armed) {
            (Some(due), Some(armed)) if due <= now_ms => {
                timer.resolution_due_ms = None;
                self.last_activity_ms = self.last_activity_ms.max(now_ms);
                Some(armed)
            }
            _ => None,
        }
    }

    /// Records the resolution outcome on the armed action.
    ///
    /// Returns false if nothing is armed on `channel`.
    pub fn note_resolution(&mut self, channel: Channel, resource_consumed: bool) -> bool {
        match self.channels[channel.index()].armed.as_mut() {
            Some(armed) => {
                armed.resource_consumed = Some(resource_consumed);
                true
            }
            None => false,
        }
    }

    /// Fires the ready-timer of `channel` if it is due.
    ///
    /// The channel moves to [`ChannelState::Fired`]; a resolution that was
    /// never delivered is dropped.
    pub fn take_due_fire(&mut self, channel: Channel, now_ms: u64) -> Option<ArmedAction> {
        let timer = &mut self.channels[channel.index()];
        let armed = timer.armed.filter(|a| a.due_ms() <= now_ms)?;
        timer.armed = None;
        timer.resolution_due_ms = None;
        timer.state = ChannelState::Fired;
        self.last_activity_ms = self.last_activity_ms.max(now_ms);
        Some(armed)
    }

    /// Returns a fired channel to idle. No-op in any other state.
    pub fn settle(&mut self, channel: Channel) {
        let timer = &mut self.channels[channel.index()];
        if timer.state == ChannelState::Fired {
            timer.state = ChannelState::Idle;
        }
    }

    /// Ends the action on `channel` early and frees the channel at `now_ms`.
    ///
    /// Used when an action completes before its due time (an interrupted
    /// cast). Returns the action that was armed.
    pub fn complete_early(&mut self, channel: Channel, now_ms: u64) -> Option<ArmedAction> {
        let timer = &mut self.channels[channel.index()];
        let armed = timer.armed.take()?;
        timer.resolution_due_ms = None;
        timer.state = ChannelState::Idle;
        timer.next_allowed_ms = now_ms;
        self.last_activity_ms = self.last_activity_ms.max(now_ms);
        Some(armed)
    }

    /// Cancels `channel`: clears its due fields so the tick will not fire it.
    ///
    /// The next-allowed time is kept, so cancelling does not shorten the delay.
    pub fn cancel(&mut self, channel: Channel) -> Option<ArmedAction> {
        let timer = &mut self.channels[channel.index()];
        timer.resolution_due_ms = None;
        timer.state = ChannelState::Idle;
        timer.armed.take()
    }

    /// Cancels every channel.
    pub fn cancel_all(&mut self) {
        for channel in ActionKind::ALL {
            self.cancel(channel);
        }
    }
}
