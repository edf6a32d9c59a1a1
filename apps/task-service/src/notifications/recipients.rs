//! Recipient-set computation for task and comment events. Sets are keyed by
//! user id, never contain the initiator, and are emitted sorted by id so
//! downstream output is stable.

use std::collections::BTreeSet;
use uuid::Uuid;

fn collect(candidates: &[Option<Uuid>], initiator: Uuid) -> Vec<Uuid> {
    candidates
        .iter()
        .flatten()
        .copied()
        .filter(|id| *id != initiator)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Task creation notifies the assignee and the reporter.
pub fn task_created(
    assignee_id: Option<Uuid>,
    reporter_id: Option<Uuid>,
    initiator_id: Uuid,
) -> Vec<Uuid> {
    collect(&[assignee_id, reporter_id], initiator_id)
}

/// Task updates additionally notify the previous assignee, passed only when
/// the assignee actually changed.
pub fn task_updated(
    assignee_id: Option<Uuid>,
    reporter_id: Option<Uuid>,
    previous_assignee_id: Option<Uuid>,
    initiator_id: Uuid,
) -> Vec<Uuid> {
    collect(&[assignee_id, reporter_id, previous_assignee_id], initiator_id)
}

/// Task deletion notifies whoever the task pointed at just before deletion.
pub fn task_deleted(
    assignee_id: Option<Uuid>,
    reporter_id: Option<Uuid>,
    initiator_id: Uuid,
) -> Vec<Uuid> {
    collect(&[assignee_id, reporter_id], initiator_id)
}

/// A new comment notifies the task's assignee and reporter plus the author
/// of the parent comment on a reply.
pub fn comment_created(
    task_assignee_id: Option<Uuid>,
    task_reporter_id: Option<Uuid>,
    parent_author_id: Option<Uuid>,
    author_id: Uuid,
) -> Vec<Uuid> {
    collect(
        &[task_assignee_id, task_reporter_id, parent_author_id],
        author_id,
    )
}

/// Mention targets: resolved users minus the author minus anyone already
/// notified by the companion comment event.
pub fn mention_targets(resolved: &[Uuid], author_id: Uuid, already_notified: &[Uuid]) -> Vec<Uuid> {
    let suppress: BTreeSet<Uuid> = already_notified.iter().copied().collect();
    resolved
        .iter()
        .copied()
        .filter(|id| *id != author_id && !suppress.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn creation_excludes_the_initiator() {
        // Initiator is the assignee: only the reporter is left.
        let recipients = task_created(Some(uuid(2)), Some(uuid(3)), uuid(2));
        assert_eq!(recipients, vec![uuid(3)]);
    }

    #[test]
    fn creation_collapses_assignee_equal_reporter() {
        let recipients = task_created(Some(uuid(2)), Some(uuid(2)), uuid(1));
        assert_eq!(recipients, vec![uuid(2)]);
    }

    #[test]
    fn creation_with_no_candidates_is_empty() {
        assert!(task_created(None, None, uuid(1)).is_empty());
        assert!(task_created(Some(uuid(1)), None, uuid(1)).is_empty());
    }

    #[test]
    fn reassignment_notifies_old_and_new_assignee() {
        // U1 reassigns U2's task to U4; reporter is U3.
        let recipients = task_updated(Some(uuid(4)), Some(uuid(3)), Some(uuid(2)), uuid(1));
        assert_eq!(recipients, vec![uuid(2), uuid(3), uuid(4)]);
    }

    #[test]
    fn update_without_reassignment_skips_previous_assignee() {
        let recipients = task_updated(Some(uuid(2)), Some(uuid(3)), None, uuid(3));
        assert_eq!(recipients, vec![uuid(2)]);
    }

    #[test]
    fn comment_notifies_parent_author() {
        let recipients = comment_created(Some(uuid(2)), Some(uuid(3)), Some(uuid(4)), uuid(1));
        assert_eq!(recipients, vec![uuid(2), uuid(3), uuid(4)]);
    }

    #[test]
    fn comment_excludes_author_even_as_assignee() {
        let recipients = comment_created(Some(uuid(1)), Some(uuid(3)), None, uuid(1));
        assert_eq!(recipients, vec![uuid(3)]);
    }

    #[test]
    fn mention_targets_are_disjoint_from_prior_recipients() {
        let resolved = vec![uuid(2), uuid(5)];
        let already = vec![uuid(2), uuid(3)];
        assert_eq!(mention_targets(&resolved, uuid(1), &already), vec![uuid(5)]);
    }

    #[test]
    fn mention_targets_never_include_the_author() {
        assert!(mention_targets(&[uuid(1)], uuid(1), &[]).is_empty());
    }

    #[test]
    fn emission_is_sorted_by_id() {
        let recipients = task_updated(Some(uuid(9)), Some(uuid(1)), Some(uuid(5)), uuid(7));
        assert_eq!(recipients, vec![uuid(1), uuid(5), uuid(9)]);
    }
}
