//! Orchestration of comment notifications: combine the committed task and
//! comment state with mention resolution into the recipient sets the
//! publisher needs. A single batched directory call covers all distinct
//! handles in one comment; resolution failures degrade to "no mentions"
//! rather than failing the committed mutation.

use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use core_lib::events::{CommentPayload, UserRef};
use core_lib::{ResolvedUser, UserDirectory};

use crate::domain::{CommentRow, TaskRow};
use crate::notifications::{mentions, recipients};

/// Committed state a comment event is derived from.
pub struct CommentContext<'a> {
    pub organization_id: Uuid,
    pub task: &'a TaskRow,
    pub comment: &'a CommentRow,
    pub parent_author_id: Option<Uuid>,
    pub author: UserRef,
}

/// Recipients for the pair of events a comment creation may emit. Either
/// set may be empty; the two are disjoint by construction.
pub struct CommentEventPlan {
    pub payload: CommentPayload,
    pub created_recipients: Vec<Uuid>,
    pub mention_recipients: Vec<Uuid>,
}

/// Recipients for the single event a comment edit may emit: only the newly
/// introduced mentions.
pub struct CommentUpdatePlan {
    pub payload: CommentPayload,
    pub recipients: Vec<Uuid>,
}

fn payload_for(ctx: &CommentContext<'_>, mentioned_users: Option<Vec<String>>) -> CommentPayload {
    CommentPayload {
        comment_id: ctx.comment.id,
        task_id: ctx.task.id,
        task_title: ctx.task.title.clone(),
        content: ctx.comment.content.clone(),
        parent_comment_id: ctx.comment.parent_comment_id,
        author_id: ctx.comment.author_id,
        author: Some(ctx.author.clone()),
        mentioned_users,
    }
}

async fn resolve(
    directory: &dyn UserDirectory,
    organization_id: Uuid,
    usernames: &[String],
) -> HashMap<String, ResolvedUser> {
    if usernames.is_empty() {
        return HashMap::new();
    }
    match directory.resolve_usernames(organization_id, usernames).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Mention resolution failed, skipping mentions: {}", e);
            HashMap::new()
        }
    }
}

pub async fn plan_comment_created(
    directory: &dyn UserDirectory,
    ctx: &CommentContext<'_>,
) -> CommentEventPlan {
    let created_recipients = recipients::comment_created(
        ctx.task.assignee_id,
        Some(ctx.task.reporter_id),
        ctx.parent_author_id,
        ctx.comment.author_id,
    );

    let usernames = mentions::extract_mentions(&ctx.comment.content);
    let resolved = resolve(directory, ctx.organization_id, &usernames).await;
    let resolved_ids: Vec<Uuid> = usernames
        .iter()
        .filter_map(|name| resolved.get(name))
        .map(|user| user.user_id)
        .collect();
    let mention_recipients =
        recipients::mention_targets(&resolved_ids, ctx.comment.author_id, &created_recipients);

    let mentioned_users = if usernames.is_empty() {
        None
    } else {
        Some(usernames)
    };

    CommentEventPlan {
        payload: payload_for(ctx, mentioned_users),
        created_recipients,
        mention_recipients,
    }
}

pub async fn plan_comment_update(
    directory: &dyn UserDirectory,
    ctx: &CommentContext<'_>,
    previous_content: &str,
) -> CommentUpdatePlan {
    let previous: HashSet<String> = mentions::extract_mentions(previous_content)
        .into_iter()
        .collect();
    let introduced: Vec<String> = mentions::extract_mentions(&ctx.comment.content)
        .into_iter()
        .filter(|name| !previous.contains(name))
        .collect();

    let resolved = resolve(directory, ctx.organization_id, &introduced).await;
    let resolved_ids: Vec<Uuid> = introduced
        .iter()
        .filter_map(|name| resolved.get(name))
        .map(|user| user.user_id)
        .collect();
    let recipients = recipients::mention_targets(&resolved_ids, ctx.comment.author_id, &[]);

    let mentioned_users = if introduced.is_empty() {
        None
    } else {
        Some(introduced)
    };

    CommentUpdatePlan {
        payload: payload_for(ctx, mentioned_users),
        recipients,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_lib::adapters::in_memory_user_directory::InMemoryUserDirectory;

    fn task(assignee: Option<Uuid>, reporter: Uuid) -> TaskRow {
        TaskRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            title: "Fix login".into(),
            description: None,
            status: "todo".into(),
            priority: "high".into(),
            assignee_id: assignee,
            reporter_id: reporter,
            due_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn comment(task: &TaskRow, author: Uuid, content: &str) -> CommentRow {
        CommentRow {
            id: Uuid::new_v4(),
            task_id: task.id,
            author_id: author,
            content: content.into(),
            parent_comment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx<'a>(task: &'a TaskRow, comment: &'a CommentRow) -> CommentContext<'a> {
        CommentContext {
            organization_id: task.organization_id,
            task,
            comment,
            parent_author_id: None,
            author: UserRef {
                username: Some("ann".into()),
                first_name: Some("Ann".into()),
                last_name: Some("Lee".into()),
            },
        }
    }

    #[tokio::test]
    async fn mentions_overlapping_comment_recipients_are_suppressed() {
        // Task assignee U2, reporter U3; author U1 writes "@bob @carol":
        // bob resolves to U2 (already notified), carol to U5.
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();
        let u5 = Uuid::new_v4();
        let directory = InMemoryUserDirectory::new();
        directory.seed("bob", u2);
        directory.seed("carol", u5);

        let task = task(Some(u2), u3);
        let comment = comment(&task, u1, "@bob @carol thoughts?");
        let plan = plan_comment_created(&directory, &ctx(&task, &comment)).await;

        let mut expected_created = vec![u2, u3];
        expected_created.sort();
        assert_eq!(plan.created_recipients, expected_created);
        assert_eq!(plan.mention_recipients, vec![u5]);
        assert_eq!(
            plan.payload.mentioned_users.as_deref(),
            Some(&["bob".to_string(), "carol".to_string()][..])
        );
        assert_eq!(directory.lookup_count(), 1);
    }

    #[tokio::test]
    async fn unknown_handles_are_dropped_silently() {
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();
        let directory = InMemoryUserDirectory::new();

        let task = task(Some(u2), u3);
        let comment = comment(&task, Uuid::new_v4(), "@ghost are you there?");
        let plan = plan_comment_created(&directory, &ctx(&task, &comment)).await;

        assert!(plan.mention_recipients.is_empty());
        assert_eq!(plan.created_recipients.len(), 2);
    }

    #[tokio::test]
    async fn comment_without_mentions_makes_no_directory_call() {
        let directory = InMemoryUserDirectory::new();
        let task = task(Some(Uuid::new_v4()), Uuid::new_v4());
        let comment = comment(&task, Uuid::new_v4(), "no handles here");
        let plan = plan_comment_created(&directory, &ctx(&task, &comment)).await;

        assert!(plan.payload.mentioned_users.is_none());
        assert_eq!(directory.lookup_count(), 0);
    }

    #[tokio::test]
    async fn edits_notify_only_newly_introduced_mentions() {
        let u2 = Uuid::new_v4();
        let u5 = Uuid::new_v4();
        let directory = InMemoryUserDirectory::new();
        directory.seed("bob", u2);
        directory.seed("carol", u5);

        let task = task(None, Uuid::new_v4());
        let author = Uuid::new_v4();
        let comment = comment(&task, author, "@bob @carol updated thoughts");
        let plan =
            plan_comment_update(&directory, &ctx(&task, &comment), "@bob original").await;

        assert_eq!(plan.recipients, vec![u5]);
        assert_eq!(
            plan.payload.mentioned_users.as_deref(),
            Some(&["carol".to_string()][..])
        );
    }

    #[tokio::test]
    async fn edit_with_no_new_mentions_notifies_nobody() {
        let directory = InMemoryUserDirectory::new();
        directory.seed("bob", Uuid::new_v4());

        let task = task(None, Uuid::new_v4());
        let comment = comment(&task, Uuid::new_v4(), "@bob still you");
        let plan = plan_comment_update(&directory, &ctx(&task, &comment), "@bob before").await;

        assert!(plan.recipients.is_empty());
        assert!(plan.payload.mentioned_users.is_none());
    }

    #[tokio::test]
    async fn self_mention_on_edit_is_ignored() {
        let author = Uuid::new_v4();
        let directory = InMemoryUserDirectory::new();
        directory.seed("ann", author);

        let task = task(None, Uuid::new_v4());
        let comment = comment(&task, author, "note to @ann");
        let plan = plan_comment_update(&directory, &ctx(&task, &comment), "note").await;
        assert!(plan.recipients.is_empty());
    }
}
