//! Account content phases: feed posts, preferences, notifications and
//! cross-references.

use super::catalog::Catalog;
use crate::Result;
use crate::models::{
    CrossReference, EntityKind, Metadata, Notification, NotificationKind, Post,
};
use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};

/// Days ahead of `as_of` that count as "upcoming".
pub const UPCOMING_DAYS: i64 = 7;

/// Handle of a teammate as stored for `owner`. Teammates are per owner so
/// that two workspaces never fight over a handle.
pub fn teammate_handle(owner: &str, handle: &str) -> String {
    format!("{}.{}", handle, owner_slug(owner))
}

/// Lowercase alphanumeric form of an owner id, for handles and emails.
pub fn owner_slug(owner: &str) -> String {
    let slug: String = owner
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug
    }
}

/// Create the catalog's feed posts. Returns the number created.
pub fn create_posts(storage: &Storage, owner: &str, catalog: &Catalog, as_of: DateTime<Utc>) -> Result<usize> {
    let mut created = 0;
    for spec in &catalog.posts {
        let (topic, _) = storage.find_or_create_topic(spec.topic, None)?;
        let author = catalog
            .teammates
            .get(spec.author)
            .map(|t| teammate_handle(owner, t.handle))
            .unwrap_or_else(|| owner_slug(owner));

        let mut metadata = Metadata::new();
        if let Some(process) = spec.process {
            metadata.insert("process_title".to_string(), process.into());
        }

        let post = Post {
            id: 0,
            owner: owner.to_string(),
            author,
            topic_id: Some(topic.id),
            title: spec.title.to_string(),
            body: spec.body.to_string(),
            metadata,
            created_at: as_of - Duration::days(spec.days_ago),
        };
        if storage.find_or_create_post(&post)?.1 {
            created += 1;
        }
    }
    Ok(created)
}

/// Set the catalog's preferences without overriding the owner's choices.
pub fn apply_preferences(storage: &Storage, owner: &str, catalog: &Catalog) -> Result<usize> {
    let mut created = 0;
    for (key, value) in &catalog.preferences {
        if storage.default_preference(owner, key, value)? {
            created += 1;
        }
    }
    Ok(created)
}

/// Notify about upcoming events, instances with open steps and feed posts.
pub fn create_notifications(storage: &Storage, owner: &str, as_of: DateTime<Utc>) -> Result<usize> {
    let today = as_of.date_naive();
    let horizon = today + Duration::days(UPCOMING_DAYS);
    let mut pending = Vec::new();

    for event in storage.list_events(owner, Some(today), Some(horizon))? {
        pending.push((
            NotificationKind::UpcomingEvent,
            format!("event:{}", event.id),
            format!("{} on {} at {}", event.title, event.date, event.time),
        ));
    }

    for process in storage.list_processes(Some(owner), Some(false))? {
        if !process.is_instance() {
            continue;
        }
        let progress = storage.process_progress(process.id)?;
        if progress.completed < progress.total {
            pending.push((
                NotificationKind::OpenSteps,
                format!("process:{}", process.id),
                format!(
                    "{}: {} of {} steps still open",
                    process.title,
                    progress.total - progress.completed,
                    progress.total
                ),
            ));
        }
    }

    for post in storage.list_posts(owner)? {
        pending.push((
            NotificationKind::FeedActivity,
            format!("post:{}", post.id),
            format!("{} posted \"{}\"", post.author, post.title),
        ));
    }

    let mut created = 0;
    for (kind, subject, message) in pending {
        let notification = Notification {
            id: 0,
            owner: owner.to_string(),
            kind,
            subject,
            message,
            read: false,
            created_at: as_of,
        };
        if storage.find_or_create_notification(&notification)?.1 {
            created += 1;
        }
    }
    Ok(created)
}

/// Link events to their processes, processes to their directories, and
/// posts to the templates they mention.
pub fn create_cross_references(storage: &Storage, owner: &str) -> Result<usize> {
    let mut refs = Vec::new();

    for event in storage.list_events(owner, None, None)? {
        if let Some(process_id) = event.process_id {
            refs.push((EntityKind::Event, event.id, EntityKind::Process, process_id));
        }
    }

    for process in storage.list_processes(Some(owner), None)? {
        if let Some(directory_id) = process.directory_id {
            refs.push((EntityKind::Process, process.id, EntityKind::Directory, directory_id));
        }
    }

    for post in storage.list_posts(owner)? {
        let title = post.metadata.get("process_title").and_then(|v| v.as_str());
        if let Some(template) = title.map(|t| storage.find_template(owner, t)).transpose()?.flatten() {
            refs.push((EntityKind::Post, post.id, EntityKind::Process, template.id));
        }
    }

    let mut created = 0;
    for (source_kind, source_id, target_kind, target_id) in refs {
        let xref = CrossReference {
            owner: owner.to_string(),
            source_kind,
            source_id,
            target_kind,
            target_id,
        };
        if storage.add_cross_reference(&xref)? {
            created += 1;
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Process;
    use crate::synthesis::catalog;
    use crate::test_utils::{TestEnv, as_of};

    #[test]
    fn test_owner_slug() {
        assert_eq!(owner_slug("Alice Smith"), "alice-smith");
        assert_eq!(owner_slug("u_42"), "u-42");
        assert_eq!(owner_slug("!!!"), "user");
        assert_eq!(teammate_handle("Alice", "ada"), "ada.alice");
    }

    #[test]
    fn test_posts_and_preferences_are_idempotent() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let catalog = catalog::for_role(Some("dev"));

        let posts = create_posts(&storage, "alice", &catalog, as_of()).unwrap();
        assert_eq!(posts, catalog.posts.len());
        assert_eq!(create_posts(&storage, "alice", &catalog, as_of()).unwrap(), 0);

        assert!(apply_preferences(&storage, "alice", &catalog).unwrap() > 0);
        storage.set_preference("alice", "theme", "dark").unwrap();
        assert_eq!(apply_preferences(&storage, "alice", &catalog).unwrap(), 0);
        assert_eq!(
            storage.get_preference("alice", "theme").unwrap(),
            Some("dark".to_string())
        );
    }

    #[test]
    fn test_notifications_for_open_instances() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let template = storage.insert_process(&Process::template("alice", "Audit")).unwrap();
        storage.add_step(template, "Collect", None).unwrap();
        crate::forking::fork(&storage, template, "alice", as_of()).unwrap();

        assert_eq!(create_notifications(&storage, "alice", as_of()).unwrap(), 1);
        assert_eq!(create_notifications(&storage, "alice", as_of()).unwrap(), 0);
        let notes = storage.list_notifications("alice").unwrap();
        assert_eq!(notes[0].kind, NotificationKind::OpenSteps);
        assert!(notes[0].message.contains("1 of 1"));
    }

    #[test]
    fn test_cross_references_from_posts() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let catalog = catalog::for_role(Some("dev"));
        let standup = storage
            .insert_process(&Process::template("alice", "Team Standup"))
            .unwrap();
        create_posts(&storage, "alice", &catalog, as_of()).unwrap();

        create_cross_references(&storage, "alice").unwrap();
        let refs = storage.list_cross_references("alice").unwrap();
        assert!(refs.iter().any(|r| r.source_kind == EntityKind::Post
            && r.target_kind == EntityKind::Process
            && r.target_id == standup));
        assert_eq!(create_cross_references(&storage, "alice").unwrap(), 0);
    }
}
