// Turn context: the incoming activity plus everything scoped to one turn

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::activity::Activity;
use crate::dialogs::Cancellation;

/// Per-turn context shared by every dialog context created during the turn.
///
/// Outgoing activities are buffered here; the host decides how to deliver
/// them. Turn state is dropped with the context and never persisted.
pub struct TurnContext {
    activity: Activity,
    responses: Mutex<Vec<Activity>>,
    turn_state: Mutex<HashMap<String, Box<dyn Any + Send>>>,
    cancellation: Mutex<Option<Cancellation>>,
}

impl TurnContext {
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            responses: Mutex::new(Vec::new()),
            turn_state: Mutex::new(HashMap::new()),
            cancellation: Mutex::new(None),
        }
    }

    /// The activity that started this turn
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Queue an outgoing activity
    pub fn send_activity(&self, activity: Activity) {
        log::debug!(
            "outgoing {:?} activity: {}",
            activity.activity_type,
            activity.text.as_deref().unwrap_or("")
        );
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(activity);
    }

    /// Queue a text reply to the incoming activity
    pub fn send_text(&self, text: &str) {
        self.send_activity(self.activity.reply_text(text));
    }

    /// Activities sent so far this turn
    pub fn responses(&self) -> Vec<Activity> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_responses(&self) -> Vec<Activity> {
        std::mem::take(&mut *self.responses.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Mutate a typed turn-state slot, creating it with `T::default()` when
    /// absent or holding another type.
    pub fn update_turn_state<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Any + Send + Default,
    {
        let mut state = self.turn_state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state
            .entry(key.to_string())
            .or_insert_with(|| Box::new(T::default()));
        if !slot.is::<T>() {
            *slot = Box::new(T::default());
        }
        match slot.downcast_mut::<T>() {
            Some(value) => f(value),
            None => f(&mut T::default()),
        }
    }

    /// Remove a typed turn-state slot
    pub fn take_turn_state<T: Any + Send>(&self, key: &str) -> Option<T> {
        let mut state = self.turn_state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state.remove(key)?;
        slot.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Record that the whole dialog tree is being cancelled this turn.
    /// The first request wins.
    pub fn request_cancellation(&self, cancellation: Cancellation) {
        let mut slot = self.cancellation.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(cancellation);
        }
    }

    pub fn cancellation(&self) -> Option<Cancellation> {
        self.cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_cancellation(&self) -> Option<Cancellation> {
        self.cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_state_slots() {
        let turn = TurnContext::new(Activity::message("test", "c", "u", "hi"));
        turn.update_turn_state::<Vec<u32>, _>("queue", |q| q.push(1));
        turn.update_turn_state::<Vec<u32>, _>("queue", |q| q.push(2));
        assert_eq!(turn.take_turn_state::<Vec<u32>>("queue"), Some(vec![1, 2]));
        assert!(turn.take_turn_state::<Vec<u32>>("queue").is_none());
    }

    #[test]
    fn test_send_text_replies_to_incoming() {
        let turn = TurnContext::new(Activity::message("test", "c", "u", "hi"));
        turn.send_text("hello");
        let sent = turn.take_responses();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text.as_deref(), Some("hello"));
        assert!(turn.responses().is_empty());
    }
}
