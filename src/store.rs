use crate::models::{CustomLabel, Enrichment, Folder, Message, Task, TaskStatus};

/// Progress of the current synchronization, shown in the message panel title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub fetching: bool,
    pub enriching: bool,
    pub enriched: usize,
    pub total: usize,
    pub last_error: Option<String>,
}

/// Inverse of an optimistic transition, replayed when the provider rejects it.
/// Only the flags the transition touched are recorded, and the replay is
/// dropped once a newer synchronization has replaced the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollback {
    Reinsert {
        generation: u64,
        index: usize,
        message: Message,
        was_selected: bool,
    },
    Flags {
        generation: u64,
        id: String,
        is_unread: Option<bool>,
        is_starred: Option<bool>,
    },
}

/// Session state. Every method is one synchronous transition; callers share
/// the store behind a mutex so transitions never interleave.
#[derive(Debug, Clone)]
pub struct InboxStore {
    pub folder: Folder,
    pub search: Option<String>,
    pub messages: Vec<Message>,
    pub selected: Option<Message>,
    pub tasks: Vec<Task>,
    pub custom_labels: Vec<CustomLabel>,
    pub status: SyncStatus,
    generation: u64,
}

impl Default for InboxStore {
    fn default() -> Self {
        Self {
            folder: Folder::Inbox,
            search: None,
            messages: Vec::new(),
            selected: None,
            tasks: Vec::new(),
            custom_labels: Vec::new(),
            status: SyncStatus::default(),
            generation: 0,
        }
    }
}

impl InboxStore {
    pub fn with_labels(custom_labels: Vec<CustomLabel>) -> Self {
        Self {
            custom_labels,
            ..Default::default()
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Start a new synchronization for `folder`; results tagged with an older
    /// generation are ignored from now on.
    pub fn begin_sync(&mut self, folder: Folder, search: Option<String>) -> u64 {
        if self.folder != folder {
            self.messages.clear();
            self.selected = None;
        }
        self.folder = folder;
        self.search = search.filter(|s| !s.trim().is_empty());
        self.generation += 1;
        self.status = SyncStatus {
            fetching: true,
            ..Default::default()
        };
        self.generation
    }

    pub fn publish(&mut self, generation: u64, messages: Vec<Message>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if let Some(selected) = &self.selected {
            self.selected = messages.iter().find(|m| m.id == selected.id).cloned();
        }
        self.status.fetching = false;
        self.status.total = messages.len();
        self.messages = messages;
        true
    }

    /// Paint a cached list while the real fetch is still running.
    pub fn paint_cached(&mut self, generation: u64, messages: Vec<Message>) -> bool {
        if !self.is_current(generation) || messages.is_empty() {
            return false;
        }
        self.messages = messages;
        true
    }

    pub fn set_enriching(&mut self, generation: u64, enriching: bool) {
        if self.is_current(generation) {
            self.status.enriching = enriching;
        }
    }

    pub fn fail_sync(&mut self, generation: u64, error: String) {
        if self.is_current(generation) {
            self.status.fetching = false;
            self.status.enriching = false;
            self.status.last_error = Some(error);
        }
    }

    /// Merge enrichment into the message with `id`. Envelope and flag fields
    /// are left alone. Returns false for stale generations and unknown ids.
    pub fn merge_enrichment(&mut self, generation: u64, id: &str, enrichment: Enrichment) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };

        let new_tasks: Vec<Task> = enrichment
            .tasks
            .iter()
            .map(|t| Task::from_extracted(id, t))
            .collect();
        message.enrichment = Some(enrichment);
        let updated = message.clone();

        if self.selected.as_ref().is_some_and(|s| s.id == id) {
            self.selected = Some(updated);
        }
        self.tasks.extend(new_tasks);
        self.status.enriched += 1;
        true
    }

    pub fn select(&mut self, id: &str) -> bool {
        self.selected = self.messages.iter().find(|m| m.id == id).cloned();
        self.selected.is_some()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Optimistically drop a message (trash/archive/unarchive).
    pub fn remove_message(&mut self, id: &str) -> Option<Rollback> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        let message = self.messages.remove(index);
        let was_selected = self.selected.as_ref().is_some_and(|s| s.id == id);
        if was_selected {
            self.selected = None;
        }
        Some(Rollback::Reinsert {
            generation: self.generation,
            index,
            message,
            was_selected,
        })
    }

    /// Optimistically set flags. `None` leaves a flag unchanged.
    pub fn set_flags(
        &mut self,
        id: &str,
        is_unread: Option<bool>,
        is_starred: Option<bool>,
    ) -> Option<Rollback> {
        let generation = self.generation;
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        let rollback = Rollback::Flags {
            generation,
            id: id.to_string(),
            is_unread: is_unread.map(|_| message.is_unread),
            is_starred: is_starred.map(|_| message.is_starred),
        };
        if let Some(unread) = is_unread {
            message.is_unread = unread;
        }
        if let Some(starred) = is_starred {
            message.is_starred = starred;
        }
        let (unread, starred) = (message.is_unread, message.is_starred);

        if let Some(selected) = self.selected.as_mut().filter(|s| s.id == id) {
            selected.is_unread = unread;
            selected.is_starred = starred;
        }
        Some(rollback)
    }

    pub fn rollback(&mut self, rollback: Rollback) {
        match rollback {
            Rollback::Reinsert {
                generation,
                index,
                message,
                was_selected,
            } => {
                if !self.is_current(generation)
                    || self.messages.iter().any(|m| m.id == message.id)
                {
                    return;
                }
                let index = index.min(self.messages.len());
                if was_selected {
                    self.selected = Some(message.clone());
                }
                self.messages.insert(index, message);
            }
            Rollback::Flags {
                generation,
                id,
                is_unread,
                is_starred,
            } => {
                if self.is_current(generation) {
                    self.set_flags(&id, is_unread, is_starred);
                }
            }
        }
    }

    pub fn toggle_task(&mut self, task_id: &str) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.status = match task.status {
                    TaskStatus::Active => TaskStatus::Done,
                    TaskStatus::Done => TaskStatus::Active,
                };
                true
            }
            None => false,
        }
    }

    pub fn delete_task(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        self.tasks.len() != before
    }

    /// Returns false when a label with the same name already exists.
    pub fn add_label(&mut self, label: CustomLabel) -> bool {
        if self
            .custom_labels
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(&label.name))
        {
            return false;
        }
        self.custom_labels.push(label);
        true
    }

    /// Delete a rule. Returns true when the current view was scoped to it and
    /// the caller must switch back to the inbox.
    pub fn delete_label(&mut self, name: &str) -> bool {
        self.custom_labels.retain(|l| l.name != name);
        matches!(&self.folder, Folder::Label(current) if current == name)
    }

    /// Plain-text digest of the current list, fed to the chat prompt.
    pub fn inbox_context(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let summary = m
                    .enrichment
                    .as_ref()
                    .map(|e| e.summary.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(m.snippet.as_str());
                format!("From: {}\nSubject: {}\nSummary: {}\n", m.from, m.subject, summary)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Category, ExtractedTask};

    pub(crate) fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            thread_id: format!("t-{}", id),
            subject: format!("Subject {}", id),
            from: "Ada".to_string(),
            from_address: "ada@example.com".to_string(),
            to: "me@example.com".to_string(),
            cc: String::new(),
            date: "Mon, 1 Jan 2024 10:00:00 +0000".to_string(),
            snippet: format!("snippet {}", id),
            body: "body".to_string(),
            has_attachment: false,
            is_unread: true,
            is_starred: false,
            enrichment: None,
        }
    }

    pub(crate) fn enrichment(summary: &str) -> Enrichment {
        Enrichment {
            category: Category::Important,
            summary: summary.to_string(),
            requires_reply: false,
            draft_reply: String::new(),
            tasks: Vec::new(),
            applied_labels: Vec::new(),
        }
    }

    fn populated() -> (InboxStore, u64) {
        let mut store = InboxStore::default();
        let generation = store.begin_sync(Folder::Inbox, None);
        store.publish(generation, vec![message("a"), message("b"), message("c")]);
        (store, generation)
    }

    #[test]
    fn test_merge_only_touches_enrichment() {
        let (mut store, generation) = populated();
        store.set_flags("b", None, Some(true));
        assert!(store.merge_enrichment(generation, "b", enrichment("hello")));

        let b = store.message("b").unwrap();
        assert!(b.is_starred);
        assert_eq!(b.subject, "Subject b");
        assert_eq!(b.enrichment.as_ref().unwrap().summary, "hello");
    }

    #[test]
    fn test_star_toggle_and_merge_on_different_ids_both_survive() {
        let (mut store, generation) = populated();
        store.merge_enrichment(generation, "a", enrichment("for a"));
        store.set_flags("c", None, Some(true));
        store.merge_enrichment(generation, "c", enrichment("for c"));
        store.set_flags("a", Some(false), Some(true));

        let a = store.message("a").unwrap();
        assert!(a.is_starred && !a.is_unread);
        assert_eq!(a.enrichment.as_ref().unwrap().summary, "for a");
        let c = store.message("c").unwrap();
        assert!(c.is_starred);
        assert_eq!(c.enrichment.as_ref().unwrap().summary, "for c");
    }

    #[test]
    fn test_flag_toggle_keeps_enrichment() {
        let (mut store, generation) = populated();
        store.merge_enrichment(generation, "a", enrichment("kept"));
        store.set_flags("a", Some(false), Some(true));
        store.set_flags("a", None, Some(false));
        assert_eq!(
            store.message("a").unwrap().enrichment.as_ref().unwrap().summary,
            "kept"
        );
    }

    #[test]
    fn test_merge_refreshes_selected_copy() {
        let (mut store, generation) = populated();
        assert!(store.select("b"));
        store.merge_enrichment(generation, "b", enrichment("fresh"));
        assert_eq!(
            store.selected.as_ref().unwrap().enrichment.as_ref().unwrap().summary,
            "fresh"
        );
        store.merge_enrichment(generation, "a", enrichment("other"));
        assert_eq!(store.selected.as_ref().unwrap().id, "b");
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let (mut store, old) = populated();
        let new = store.begin_sync(Folder::Starred, None);
        assert!(store.messages.is_empty());
        assert!(!store.publish(old, vec![message("x")]));
        assert!(store.publish(new, vec![message("a")]));
        assert!(!store.merge_enrichment(old, "a", enrichment("late")));
        assert!(store.message("a").unwrap().enrichment.is_none());
    }

    #[test]
    fn test_merge_for_unknown_id_is_a_miss() {
        let (mut store, generation) = populated();
        assert!(!store.merge_enrichment(generation, "zzz", enrichment("nope")));
    }

    #[test]
    fn test_merge_appends_extracted_tasks() {
        let (mut store, generation) = populated();
        let mut e = enrichment("task");
        e.tasks = vec![ExtractedTask {
            title: "Pay invoice".to_string(),
            date: "Friday".to_string(),
            is_urgent: true,
            is_past_due: false,
        }];
        store.merge_enrichment(generation, "a", e.clone());
        store.merge_enrichment(generation, "a", e);
        assert_eq!(store.tasks.len(), 2);
        assert_eq!(store.tasks[0].message_id, "a");
        assert_ne!(store.tasks[0].id, store.tasks[1].id);

        let id = store.tasks[0].id.clone();
        assert!(store.toggle_task(&id));
        assert_eq!(store.tasks[0].status, TaskStatus::Done);
        assert!(store.delete_task(&id));
        assert_eq!(store.tasks.len(), 1);
    }

    #[test]
    fn test_remove_and_rollback_restores_position_and_selection() {
        let (mut store, _) = populated();
        store.select("b");
        let rollback = store.remove_message("b").unwrap();
        assert!(store.selected.is_none());
        assert_eq!(store.messages.len(), 2);

        store.rollback(rollback);
        let ids: Vec<_> = store.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.selected.as_ref().unwrap().id, "b");
    }

    #[test]
    fn test_flag_rollback_restores_previous_state() {
        let (mut store, _) = populated();
        let rollback = store.set_flags("a", None, Some(true)).unwrap();
        store.rollback(rollback);
        assert!(!store.message("a").unwrap().is_starred);
    }

    #[test]
    fn test_flag_rollback_keeps_other_confirmed_flag() {
        let (mut store, _) = populated();
        let read = store.set_flags("a", Some(false), None).unwrap();
        store.set_flags("a", None, Some(true));
        store.rollback(read);

        let a = store.message("a").unwrap();
        assert!(a.is_unread);
        assert!(a.is_starred);
    }

    #[test]
    fn test_rollback_after_folder_switch_is_dropped() {
        let (mut store, _) = populated();
        let removed = store.remove_message("a").unwrap();
        let flagged = store.set_flags("b", None, Some(true)).unwrap();

        let generation = store.begin_sync(Folder::Starred, None);
        let mut s1 = message("s1");
        s1.is_starred = true;
        store.publish(generation, vec![s1]);
        store.rollback(removed);
        store.rollback(flagged);

        let ids: Vec<_> = store.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);
        assert!(store.message("s1").unwrap().is_starred);
    }

    #[test]
    fn test_delete_label_evicts_scoped_view() {
        let mut store = InboxStore::with_labels(vec![
            CustomLabel::new("Invoices", "bills", "green", true).unwrap(),
        ]);
        store.begin_sync(Folder::Label("Invoices".to_string()), None);
        assert!(store.delete_label("Invoices"));
        assert!(store.custom_labels.is_empty());
        assert!(!store.delete_label("Other"));
    }

    #[test]
    fn test_add_label_rejects_duplicates() {
        let mut store = InboxStore::default();
        let label = CustomLabel::new("Invoices", "bills", "green", true).unwrap();
        assert!(store.add_label(label.clone()));
        assert!(!store.add_label(label));
    }
}
