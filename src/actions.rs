use crate::gmail::{LabelChange, MailProvider, ModifyOutcome, ProviderError};
use crate::models::{INBOX, STARRED, TRASH, UNREAD};
use crate::store::Rollback;
use crate::sync::{SharedStore, lock_store};
use tracing::{info, warn};

/// Per-message quick actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailAction {
    Trash,
    Archive,
    Unarchive,
    Read,
    Unread,
    Star,
    Unstar,
}

impl MailAction {
    pub fn label_change(self) -> LabelChange {
        match self {
            MailAction::Trash => LabelChange::new(&[TRASH], &[INBOX]),
            MailAction::Archive => LabelChange::new(&[], &[INBOX]),
            MailAction::Unarchive => LabelChange::new(&[INBOX], &[]),
            MailAction::Unread => LabelChange::new(&[UNREAD], &[]),
            MailAction::Read => LabelChange::new(&[], &[UNREAD]),
            MailAction::Star => LabelChange::new(&[STARRED], &[]),
            MailAction::Unstar => LabelChange::new(&[], &[STARRED]),
        }
    }

    /// Whether the message leaves the current view.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MailAction::Trash | MailAction::Archive | MailAction::Unarchive
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            MailAction::Trash => "trash",
            MailAction::Archive => "archive",
            MailAction::Unarchive => "unarchive",
            MailAction::Read => "mark as read",
            MailAction::Unread => "mark as unread",
            MailAction::Star => "star",
            MailAction::Unstar => "unstar",
        }
    }
}

/// Apply the optimistic half of `action` to the store.
pub fn apply_optimistic(store: &SharedStore, id: &str, action: MailAction) -> Option<Rollback> {
    let mut store = lock_store(store);
    match action {
        MailAction::Trash | MailAction::Archive | MailAction::Unarchive => store.remove_message(id),
        MailAction::Read => store.set_flags(id, Some(false), None),
        MailAction::Unread => store.set_flags(id, Some(true), None),
        MailAction::Star => store.set_flags(id, None, Some(true)),
        MailAction::Unstar => store.set_flags(id, None, Some(false)),
    }
}

/// Optimistic update, provider confirmation, and rollback on failure.
pub async fn perform(
    provider: &dyn MailProvider,
    store: &SharedStore,
    token: Option<&str>,
    id: &str,
    action: MailAction,
) -> Result<ModifyOutcome, ProviderError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(ProviderError::Unauthorized)?;

    let rollback = apply_optimistic(store, id, action);
    match provider.modify_labels(token, id, &action.label_change()).await {
        Ok(outcome) => {
            info!(id, action = action.description(), "action confirmed");
            Ok(outcome)
        }
        Err(e) => {
            warn!(id, action = action.description(), "action failed, rolling back: {}", e);
            if let Some(rollback) = rollback {
                lock_store(store).rollback(rollback);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Folder;
    use crate::store::InboxStore;
    use crate::store::tests::{enrichment, message};
    use crate::sync::tests::FakeProvider;
    use std::sync::{Arc, Mutex};

    fn store_with(ids: &[&str]) -> SharedStore {
        let mut store = InboxStore::default();
        let generation = store.begin_sync(Folder::Inbox, None);
        store.publish(generation, ids.iter().map(|id| message(id)).collect());
        store.merge_enrichment(generation, ids[0], enrichment("kept"));
        Arc::new(Mutex::new(store))
    }

    #[test]
    fn test_label_changes_match_provider_semantics() {
        assert_eq!(
            MailAction::Trash.label_change(),
            LabelChange::new(&["TRASH"], &["INBOX"])
        );
        assert_eq!(MailAction::Read.label_change(), LabelChange::new(&[], &["UNREAD"]));
        for action in [
            MailAction::Trash,
            MailAction::Archive,
            MailAction::Unarchive,
            MailAction::Read,
            MailAction::Unread,
            MailAction::Star,
            MailAction::Unstar,
        ] {
            assert!(!action.label_change().is_empty());
        }
    }

    #[tokio::test]
    async fn test_star_confirmed_keeps_enrichment() {
        let provider = FakeProvider::default();
        let store = store_with(&["a", "b"]);

        let outcome = perform(&provider, &store, Some("token"), "a", MailAction::Star)
            .await
            .unwrap();
        assert_eq!(outcome, ModifyOutcome::Applied);

        let store = lock_store(&store);
        let a = store.message("a").unwrap();
        assert!(a.is_starred);
        assert_eq!(a.enrichment.as_ref().unwrap().summary, "kept");
        assert_eq!(provider.modifies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_trash_rolls_back() {
        let provider = FakeProvider {
            reject_modify: true,
            ..Default::default()
        };
        let store = store_with(&["a", "b", "c"]);
        lock_store(&store).select("b");

        let result = perform(&provider, &store, Some("token"), "b", MailAction::Trash).await;
        assert!(result.is_err());

        let store = lock_store(&store);
        let ids: Vec<_> = store.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.selected.as_ref().unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_failed_star_restores_flag() {
        let provider = FakeProvider {
            reject_modify: true,
            ..Default::default()
        };
        let store = store_with(&["a"]);
        let _ = perform(&provider, &store, Some("token"), "a", MailAction::Star).await;
        assert!(!lock_store(&store).message("a").unwrap().is_starred);
    }

    #[tokio::test]
    async fn test_missing_token_blocks_action() {
        let provider = FakeProvider::default();
        let store = store_with(&["a"]);
        let result = perform(&provider, &store, None, "a", MailAction::Archive).await;
        assert!(matches!(result, Err(ProviderError::Unauthorized)));
        assert_eq!(lock_store(&store).messages.len(), 1);
        assert!(provider.modifies.lock().unwrap().is_empty());
    }
}
