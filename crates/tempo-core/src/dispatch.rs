//! Per-actor action handling: accept, resolve, fire.
//!
//! [`Dispatch`] bundles borrowed references to everything a channel
//! operation needs, so the scheduler and the request path share one
//! implementation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tempo_audit::{AuditRecorder, RawSample, ShadowSample};

use crate::action::ActionDescriptor;
use crate::error::RoutineError;
use crate::formula::TimingFormula;
use crate::native::NativeTiming;
use crate::routines::{check_status, FollowUp, HostEffects, InvalidState, RejectReason, Resolution, RoutineTable};
use crate::table::TimingTable;
use crate::timer::{ActorTimerState, ArmedAction, Channel, TimerPolicy};

/// An accepted action's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    /// Delay the formula computed.
    pub expected_ms: u64,
    /// When the channel becomes ready again.
    pub due_ms: u64,
    /// When the resolution is delivered.
    pub resolution_due_ms: u64,
}

/// What a resolution step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    /// Nothing was due.
    Nothing,
    /// Resolution applied; the channel stays pending.
    Resolved,
    /// The action was interrupted and completed early.
    Interrupted,
    /// The host no longer knows the actor; the channel was cancelled.
    Cancelled,
}

/// What a ready-timer step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// Nothing was due.
    NotDue,
    /// Fired and returned to idle.
    Settled,
    /// Fired and re-armed with a follow-up action.
    Rearmed,
}

/// Borrowed engine context for one channel operation.
pub struct Dispatch<'a> {
    /// Host collaborator.
    pub host: &'a mut dyn HostEffects,
    /// Channel routines.
    pub routines: &'a RoutineTable,
    /// Delay provider.
    pub formula: &'a dyn TimingFormula,
    /// Table for resource costs.
    pub table: &'a TimingTable,
    /// Audit sink.
    pub recorder: &'a mut AuditRecorder,
    /// Native timing for shadow comparison, when enabled.
    pub native: Option<&'a dyn NativeTiming>,
    /// Channel coupling.
    pub policy: TimerPolicy,
}

impl Dispatch<'_> {
    /// Validates and, if allowed, arms an action on its channel.
    ///
    /// On acceptance the channel is armed at `now + delay`, the resolution is
    /// scheduled at `now + offset` and the visible effect plays now.
    ///
    /// # Errors
    ///
    /// The [`RejectReason`]; nothing is changed on rejection.
    pub fn request(
        &mut self,
        state: &mut ActorTimerState,
        action: ActionDescriptor,
        now_ms: u64,
    ) -> Result<Acceptance, RejectReason> {
        let actor = state.actor();
        let kind = action.kind;
        let snapshot = self
            .host
            .snapshot(actor)
            .ok_or(RejectReason::InvalidState(InvalidState::Disconnected))?;
        check_status(&snapshot)?;

        if !state.is_permitted(kind, now_ms) {
            return Err(RejectReason::NotReady {
                remaining_ms: state.remaining_ms(kind, now_ms),
            });
        }

        let routine = self.routines.get(kind);
        let cost = self
            .table
            .get(action.entry)
            .filter(|e| e.kind == kind)
            .map_or(0, |e| e.resource_cost);
        routine.check(&snapshot, cost)?;

        let expected_ms = self.formula.compute_delay(&action, &snapshot.stats);
        let offset_ms = self.formula.resolution_offset(&action, expected_ms);

        let armed = ArmedAction {
            action,
            accepted_at_ms: now_ms,
            expected_ms,
            resource_consumed: None,
            native_ms: self.native.and_then(|native| native.native_delay_ms(&action, &snapshot.stats)),
        };
        state.arm(armed, now_ms + offset_ms, self.policy);

        if let Err(err) = routine.begin(&mut *self.host, &snapshot, &action) {
            warn!(actor = %actor, action = %action, error = %err, "visible effect failed");
        }

        debug!(actor = %actor, action = %action, expected_ms, "action accepted");
        Ok(Acceptance {
            expected_ms,
            due_ms: armed.due_ms(),
            resolution_due_ms: now_ms + offset_ms,
        })
    }

    /// Delivers `channel`'s resolution if it is due.
    ///
    /// # Errors
    ///
    /// Routine or host failure; the caller isolates it.
    pub fn deliver_resolution(
        &mut self,
        state: &mut ActorTimerState,
        channel: Channel,
        now_ms: u64,
    ) -> Result<Delivered, RoutineError> {
        let Some(armed) = state.take_due_resolution(channel, now_ms) else {
            return Ok(Delivered::Nothing);
        };
        let actor = state.actor();
        let Some(snapshot) = self.host.snapshot(actor) else {
            state.cancel(channel);
            debug!(actor = %actor, channel = %channel, "actor gone before resolution, channel cancelled");
            return Ok(Delivered::Cancelled);
        };

        match self.routines.get(channel).resolve(&mut *self.host, &snapshot, &armed.action)? {
            Resolution::Completed(outcome) => {
                state.note_resolution(channel, outcome.resource_consumed);
                Ok(Delivered::Resolved)
            }
            Resolution::Interrupted => {
                if let Some(done) = state.complete_early(channel, now_ms) {
                    self.emit_sample(state, &done, now_ms, false);
                }
                Ok(Delivered::Interrupted)
            }
        }
    }

    /// Fires `channel`'s ready-timer if it is due, records the sample and
    /// runs the routine's follow-up.
    ///
    /// # Errors
    ///
    /// Routine failure; the caller isolates it.
    pub fn fire(&mut self, state: &mut ActorTimerState, channel: Channel, now_ms: u64) -> Result<Fired, RoutineError> {
        let Some(armed) = state.take_due_fire(channel, now_ms) else {
            return Ok(Fired::NotDue);
        };
        self.emit_sample(state, &armed, now_ms, armed.resource_consumed.unwrap_or(false));
        self.emit_shadow(state, &armed, now_ms);

        let snapshot = self.host.snapshot(state.actor());
        let outcome = match self.routines.get(channel).follow_up(snapshot.as_ref(), &armed.action) {
            FollowUp::Idle => Fired::Settled,
            FollowUp::Rearm(next) => match self.request(state, next, now_ms) {
                Ok(_) if next.kind == channel => Fired::Rearmed,
                Ok(_) => Fired::Settled,
                Err(reason) => {
                    debug!(actor = %state.actor(), action = %next, %reason, "follow-up refused");
                    Fired::Settled
                }
            },
        };
        state.settle(channel);
        Ok(outcome)
    }

    /// Pairs the realized delay with what native timing would have given.
    fn emit_shadow(&mut self, state: &ActorTimerState, armed: &ArmedAction, now_ms: u64) {
        if let Some(native_ms) = armed.native_ms {
            self.recorder.record_shadow(ShadowSample {
                kind: armed.action.kind,
                actor: state.actor().as_u64(),
                engine_ms: now_ms.saturating_sub(armed.accepted_at_ms),
                native_ms,
                at_ms: now_ms,
            });
        }
    }

    fn emit_sample(&mut self, state: &ActorTimerState, armed: &ArmedAction, now_ms: u64, resource_consumed: bool) {
        let sample = self.recorder.sample(RawSample {
            kind: armed.action.kind,
            actor: state.actor().as_u64(),
            expected_ms: armed.expected_ms,
            actual_ms: now_ms.saturating_sub(armed.accepted_at_ms),
            at_ms: now_ms,
            resource_consumed,
        });
        if sample.is_double_fire() {
            warn!(
                actor = %state.actor(),
                action = %armed.action,
                expected_ms = sample.expected_ms(),
                actual_ms = sample.actual_ms(),
                "double-fire recorded"
            );
        }
    }
}
