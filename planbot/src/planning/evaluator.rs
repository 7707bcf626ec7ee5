// Rule evaluation: event dispatch and the two queuing policies

use std::sync::Arc;

use super::change::{PlanChangeList, PlanChangeType};
use super::context::PlanningContext;
use super::events;
use super::plan::Plan;
use super::rules::Rule;
use crate::dialogs::{DialogEvent, DialogResult};
use crate::recognizer::{Recognizer, RecognizerResult};

/// Evaluates registered rules, in registration order, against dialog events
/// and queues the accepted change lists on the planning context.
#[derive(Clone, Default)]
pub struct RuleEvaluator {
    rules: Vec<Arc<dyn Rule>>,
    recognizer: Option<Arc<dyn Recognizer>>,
}

impl RuleEvaluator {
    pub fn new(rules: Vec<Arc<dyn Rule>>, recognizer: Option<Arc<dyn Recognizer>>) -> Self {
        Self { rules, recognizer }
    }

    /// Dispatch `event` and everything it expands into. Returns true when
    /// some rule's changes were queued.
    ///
    /// - `beginDialog`/`consultDialog`: first match, else `activityReceived`
    /// - `activityReceived`: first match, else recognize a message into
    ///   `utteranceRecognized` or dispatch an event activity by its name
    /// - `utteranceRecognized`: best matches, else `fallback`
    /// - `fallback`: first match, only while no plan is running
    /// - anything else: first match
    pub async fn evaluate(
        &self,
        planning: &PlanningContext<'_>,
        event: DialogEvent,
    ) -> DialogResult<bool> {
        let mut event = event;
        loop {
            log::debug!("evaluate rules for '{}'", event.name);
            match event.name.as_str() {
                events::BEGIN_DIALOG | events::CONSULT_DIALOG => {
                    if self.first_match(planning, &event).await? {
                        return Ok(true);
                    }
                    let activity = serde_json::to_value(planning.activity())?;
                    event = DialogEvent::new(events::ACTIVITY_RECEIVED).with_value(Some(activity));
                }
                events::ACTIVITY_RECEIVED => {
                    if self.first_match(planning, &event).await? {
                        return Ok(true);
                    }
                    let activity = planning.activity();
                    if activity.is_message() {
                        let recognized = match &self.recognizer {
                            Some(recognizer) => recognizer.recognize(planning.turn()).await?,
                            None => RecognizerResult::unrecognized(
                                activity.message_text().unwrap_or_default(),
                            ),
                        };
                        if let Some((intent, score)) = recognized.top_intent() {
                            log::debug!("recognized '{}' ({:.2})", intent, score);
                        }
                        event = DialogEvent::new(events::UTTERANCE_RECOGNIZED)
                            .with_value(Some(serde_json::to_value(&recognized)?));
                    } else if activity.is_event() {
                        let Some(name) = activity.name.as_deref() else {
                            return Ok(false);
                        };
                        let named = DialogEvent::new(name).with_value(activity.value.clone());
                        if matches!(
                            name,
                            events::BEGIN_DIALOG
                                | events::CONSULT_DIALOG
                                | events::ACTIVITY_RECEIVED
                        ) {
                            // Reserved names would restart the dispatch
                            return self.first_match(planning, &named).await;
                        }
                        event = named;
                    } else {
                        return Ok(false);
                    }
                }
                events::UTTERANCE_RECOGNIZED => {
                    if self.best_matches(planning, &event).await? {
                        return Ok(true);
                    }
                    event = DialogEvent::new(events::FALLBACK).with_value(event.value.take());
                }
                events::FALLBACK => {
                    if planning.plan().map_or(true, Plan::is_ended) {
                        return self.first_match(planning, &event).await;
                    }
                    log::debug!("plan in progress absorbs unrecognized utterance");
                    return Ok(false);
                }
                _ => return self.first_match(planning, &event).await,
            }
        }
    }

    /// Queue the first change list of the first rule that produces any
    pub async fn first_match(
        &self,
        planning: &PlanningContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        for rule in &self.rules {
            let changes = rule.evaluate(planning, event).await?;
            if let Some(change) = changes.into_iter().next() {
                log::info!("rule matched '{}' with {:?}", event.name, change.change_type);
                planning.queue_changes(change);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Collect every rule's changes and queue the non-overlapping best ones
    pub async fn best_matches(
        &self,
        planning: &PlanningContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        let mut candidates = Vec::new();
        for rule in &self.rules {
            candidates.extend(rule.evaluate(planning, event).await?);
        }
        let selected = select_best_matches(candidates);
        if selected.is_empty() {
            return Ok(false);
        }
        log::info!("{} change list(s) selected for '{}'", selected.len(), event.name);
        for change in selected {
            planning.queue_changes(change);
        }
        Ok(true)
    }
}

/// Pick non-overlapping winners from `candidates`, best coverage first.
///
/// The candidate with the most matched intents wins, then the most matched
/// entities, then the earliest discovered. Candidates overlapping a winner
/// are dropped. Winners come back in discovery order, except that with
/// several winners the first one starting a plan moves to the front and the
/// other plan starters are demoted to `DoStepsLater`.
pub fn select_best_matches(candidates: Vec<PlanChangeList>) -> Vec<PlanChangeList> {
    let mut remaining: Vec<(usize, PlanChangeList)> = candidates.into_iter().enumerate().collect();
    let mut winners: Vec<(usize, PlanChangeList)> = Vec::new();

    while !remaining.is_empty() {
        let mut best = 0;
        for (i, (_, candidate)) in remaining.iter().enumerate().skip(1) {
            if coverage(candidate) > coverage(&remaining[best].1) {
                best = i;
            }
        }
        let winner = remaining.remove(best);
        remaining.retain(|(_, candidate)| !candidate.overlaps(&winner.1));
        winners.push(winner);
    }

    winners.sort_by_key(|(order, _)| *order);
    let mut winners: Vec<PlanChangeList> = winners.into_iter().map(|(_, change)| change).collect();

    if winners.len() > 1 {
        if let Some(position) = winners.iter().position(|c| c.change_type.starts_plan()) {
            let first = winners.remove(position);
            for change in winners.iter_mut() {
                if change.change_type.starts_plan() {
                    change.change_type = PlanChangeType::DoStepsLater;
                }
            }
            winners.insert(0, first);
        }
    }
    winners
}

fn coverage(change: &PlanChangeList) -> (usize, usize) {
    (change.intents_matched.len(), change.entities_matched.len())
}
