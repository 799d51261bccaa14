//! One-shot deferred tasks keyed off the match clock.
//!
//! Timers cannot be cancelled. A later state change is expected to make an
//! earlier task's effect harmless instead. Only [`Timers::clear`] drops them,
//! which the session does on restart.

struct TimerEntry<T> {
    due_at: u64,
    task: T,
}

pub struct Timers<T> {
    entries: Vec<TimerEntry<T>>,
}

impl<T> Timers<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Schedule `task` to fire once `now >= due_at`
    pub fn schedule(&mut self, due_at: u64, task: T) {
        self.entries.push(TimerEntry { due_at, task });
    }

    /// Remove and return every task that is due, ordered by due time
    /// (ties keep scheduling order).
    pub fn take_due(&mut self, now: u64) -> Vec<T> {
        let mut due: Vec<TimerEntry<T>> = Vec::new();
        let mut pending = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..) {
            if entry.due_at <= now {
                due.push(entry);
            } else {
                pending.push(entry);
            }
        }
        self.entries = pending;

        due.sort_by_key(|e| e.due_at);
        due.into_iter().map(|e| e.task).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Timers<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_when_due() {
        let mut timers = Timers::new();
        timers.schedule(300, "restore");

        assert!(timers.take_due(299).is_empty());
        assert_eq!(timers.take_due(300), vec!["restore"]);
        assert!(timers.take_due(1000).is_empty());
    }

    #[test]
    fn due_tasks_come_out_in_time_order() {
        let mut timers = Timers::new();
        timers.schedule(500, 'b');
        timers.schedule(200, 'a');
        timers.schedule(900, 'c');
        timers.schedule(500, 'd');

        assert_eq!(timers.take_due(600), vec!['a', 'b', 'd']);
        assert_eq!(timers.len(), 1);
    }
}
