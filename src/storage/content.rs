//! Account content: users, topics, feed posts, preferences, notifications,
//! cross-references and insight reports.

use super::{Storage, fmt_ts, parse_enum, parse_metadata, parse_ts};
use crate::models::{
    CrossReference, EntityKind, InsightReport, Notification, NotificationKind, Post, Topic, User,
};
use crate::{Error, Result};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        handle: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        role_tag: row.get(4)?,
        created_at: parse_ts(5, &created_at)?,
    })
}

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(Post {
        id: row.get(0)?,
        owner: row.get(1)?,
        author: row.get(2)?,
        topic_id: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        metadata: parse_metadata(6, &metadata)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    Ok(Notification {
        id: row.get(0)?,
        owner: row.get(1)?,
        kind: parse_enum::<NotificationKind>(2, &kind)?,
        subject: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
    })
}

fn row_to_cross_ref(row: &Row) -> rusqlite::Result<CrossReference> {
    let source_kind: String = row.get(1)?;
    let target_kind: String = row.get(3)?;
    Ok(CrossReference {
        owner: row.get(0)?,
        source_kind: parse_enum::<EntityKind>(1, &source_kind)?,
        source_id: row.get(2)?,
        target_kind: parse_enum::<EntityKind>(3, &target_kind)?,
        target_id: row.get(4)?,
    })
}

fn row_to_report(row: &Row) -> rusqlite::Result<InsightReport> {
    let metrics: String = row.get(2)?;
    let generated_at: String = row.get(3)?;
    Ok(InsightReport {
        owner: row.get(0)?,
        period: row.get(1)?,
        metrics: serde_json::from_str(&metrics).map_err(|e| super::conversion_err(2, e))?,
        generated_at: parse_ts(3, &generated_at)?,
    })
}

/// Per-owner entity totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnerCounts {
    pub directories: usize,
    pub processes: usize,
    pub events: usize,
    pub posts: usize,
    pub notifications: usize,
    pub reports: usize,
}

/// Row counts across the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreTotals {
    pub users: usize,
    pub directories: usize,
    pub templates: usize,
    pub processes: usize,
    pub steps: usize,
    pub events: usize,
}

impl Storage {
    // === Users ===

    /// Find a user by id or create it.
    ///
    /// Fails if the handle or email already belongs to a different user.
    pub fn find_or_create_user(&self, user: &User) -> Result<(User, bool)> {
        let created = self.conn().execute(
            "INSERT INTO users (id, handle, email, display_name, role_tag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT DO NOTHING",
            params![
                user.id,
                user.handle,
                user.email,
                user.display_name,
                user.role_tag,
                fmt_ts(user.created_at),
            ],
        )? > 0;
        let stored = self.get_user(&user.id)?.ok_or_else(|| {
            Error::InvalidInput(format!(
                "Handle '{}' or email '{}' is taken by another user",
                user.handle, user.email
            ))
        })?;
        Ok((stored, created))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, handle, email, display_name, role_tag, created_at
                 FROM users WHERE id = ?1",
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, handle, email, display_name, role_tag, created_at
             FROM users ORDER BY handle",
        )?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // === Topics ===

    pub fn find_or_create_topic(&self, name: &str, description: Option<&str>) -> Result<(Topic, bool)> {
        let created = self.conn().execute(
            "INSERT INTO topics (name, description) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            params![name, description],
        )? > 0;
        let topic = self
            .conn()
            .query_row(
                "SELECT id, name, description FROM topics WHERE name = ?1",
                [name],
                |row| {
                    Ok(Topic {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )?;
        Ok((topic, created))
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, description FROM topics ORDER BY name")?;
        let topics = stmt
            .query_map([], |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(topics)
    }

    // === Posts ===

    /// Find a post by `(owner, title)` or create it.
    pub fn find_or_create_post(&self, post: &Post) -> Result<(Post, bool)> {
        let created = self.conn().execute(
            "INSERT INTO posts (owner, author, topic_id, title, body, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) ON CONFLICT DO NOTHING",
            params![
                post.owner,
                post.author,
                post.topic_id,
                post.title,
                post.body,
                serde_json::to_string(&post.metadata)?,
                fmt_ts(post.created_at),
            ],
        )? > 0;
        let stored = self.conn().query_row(
            "SELECT id, owner, author, topic_id, title, body, metadata, created_at
             FROM posts WHERE owner = ?1 AND title = ?2",
            params![post.owner, post.title],
            row_to_post,
        )?;
        Ok((stored, created))
    }

    pub fn list_posts(&self, owner: &str) -> Result<Vec<Post>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner, author, topic_id, title, body, metadata, created_at
             FROM posts WHERE owner = ?1 ORDER BY created_at, id",
        )?;
        let posts = stmt
            .query_map([owner], row_to_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    // === Preferences ===

    /// Upsert a preference. Returns true if the stored value changed.
    pub fn set_preference(&self, owner: &str, key: &str, value: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "INSERT INTO preferences (owner, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner, key) DO UPDATE SET value = excluded.value
             WHERE preferences.value != excluded.value",
            params![owner, key, value],
        )?;
        Ok(changed > 0)
    }

    /// Insert a preference only if the owner has not set it.
    pub fn default_preference(&self, owner: &str, key: &str, value: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "INSERT INTO preferences (owner, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![owner, key, value],
        )?;
        Ok(changed > 0)
    }

    pub fn get_preference(&self, owner: &str, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE owner = ?1 AND key = ?2",
                params![owner, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn list_preferences(&self, owner: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT key, value FROM preferences WHERE owner = ?1 ORDER BY key")?;
        let prefs = stmt
            .query_map([owner], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(prefs)
    }

    // === Notifications ===

    /// Find a notification by `(owner, kind, subject)` or create it.
    pub fn find_or_create_notification(
        &self,
        notification: &Notification,
    ) -> Result<(Notification, bool)> {
        let kind = notification.kind.to_string();
        let created = self.conn().execute(
            "INSERT INTO notifications (owner, kind, subject, message, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT DO NOTHING",
            params![
                notification.owner,
                kind,
                notification.subject,
                notification.message,
                notification.read,
                fmt_ts(notification.created_at),
            ],
        )? > 0;
        let stored = self.conn().query_row(
            "SELECT id, owner, kind, subject, message, read, created_at
             FROM notifications WHERE owner = ?1 AND kind = ?2 AND subject = ?3",
            params![notification.owner, kind, notification.subject],
            row_to_notification,
        )?;
        Ok((stored, created))
    }

    pub fn list_notifications(&self, owner: &str) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner, kind, subject, message, read, created_at
             FROM notifications WHERE owner = ?1 ORDER BY id",
        )?;
        let notifications = stmt
            .query_map([owner], row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()
            .execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Notification not found: {}", id)));
        }
        Ok(())
    }

    // === Cross-references ===

    /// Record a cross-reference. Returns true if it was new.
    pub fn add_cross_reference(&self, xref: &CrossReference) -> Result<bool> {
        if xref.source_kind == xref.target_kind && xref.source_id == xref.target_id {
            return Err(Error::InvalidInput(
                "An entity cannot reference itself".to_string(),
            ));
        }
        let changed = self.conn().execute(
            "INSERT INTO cross_refs (owner, source_kind, source_id, target_kind, target_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT DO NOTHING",
            params![
                xref.owner,
                xref.source_kind.to_string(),
                xref.source_id,
                xref.target_kind.to_string(),
                xref.target_id,
                fmt_ts(chrono::Utc::now()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn list_cross_references(&self, owner: &str) -> Result<Vec<CrossReference>> {
        let mut stmt = self.conn().prepare(
            "SELECT owner, source_kind, source_id, target_kind, target_id
             FROM cross_refs WHERE owner = ?1
             ORDER BY source_kind, source_id, target_kind, target_id",
        )?;
        let refs = stmt
            .query_map([owner], row_to_cross_ref)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    // === Insight reports ===

    /// Insert or replace the report for `(owner, period)`.
    pub fn upsert_insight_report(&self, report: &InsightReport) -> Result<()> {
        self.conn().execute(
            "INSERT INTO insight_reports (owner, period, metrics, generated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner, period) DO UPDATE SET
                metrics = excluded.metrics, generated_at = excluded.generated_at",
            params![
                report.owner,
                report.period,
                serde_json::to_string(&report.metrics)?,
                fmt_ts(report.generated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_insight_report(&self, owner: &str, period: &str) -> Result<Option<InsightReport>> {
        let report = self
            .conn()
            .query_row(
                "SELECT owner, period, metrics, generated_at FROM insight_reports
                 WHERE owner = ?1 AND period = ?2",
                params![owner, period],
                row_to_report,
            )
            .optional()?;
        Ok(report)
    }

    pub fn list_insight_reports(&self, owner: &str) -> Result<Vec<InsightReport>> {
        let mut stmt = self.conn().prepare(
            "SELECT owner, period, metrics, generated_at FROM insight_reports
             WHERE owner = ?1 ORDER BY period",
        )?;
        let reports = stmt
            .query_map([owner], row_to_report)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reports)
    }

    // === Counts ===

    fn count_owned(&self, table: &str, owner: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE owner = ?1", table);
        let count: i64 = self.conn().query_row(&sql, [owner], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn count_rows(&self, sql: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Totals across all owners.
    pub fn store_totals(&self) -> Result<StoreTotals> {
        Ok(StoreTotals {
            users: self.count_rows("SELECT COUNT(*) FROM users")?,
            directories: self.count_rows("SELECT COUNT(*) FROM directories")?,
            templates: self.count_rows("SELECT COUNT(*) FROM processes WHERE is_template = 1")?,
            processes: self.count_rows("SELECT COUNT(*) FROM processes WHERE is_template = 0")?,
            steps: self.count_rows("SELECT COUNT(*) FROM steps")?,
            events: self.count_rows("SELECT COUNT(*) FROM events")?,
        })
    }

    /// Totals of everything an owner holds.
    pub fn owner_counts(&self, owner: &str) -> Result<OwnerCounts> {
        Ok(OwnerCounts {
            directories: self.count_owned("directories", owner)?,
            processes: self.count_owned("processes", owner)?,
            events: self.count_owned("events", owner)?,
            posts: self.count_owned("posts", owner)?,
            notifications: self.count_owned("notifications", owner)?,
            reports: self.count_owned("insight_reports", owner)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::test_utils::{TestEnv, as_of};

    fn user(id: &str, handle: &str) -> User {
        User {
            id: id.to_string(),
            handle: handle.to_string(),
            email: format!("{}@example.com", handle),
            display_name: handle.to_string(),
            role_tag: Some("dev".to_string()),
            created_at: as_of(),
        }
    }

    #[test]
    fn test_users_are_unique_by_handle() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let (_, created) = storage.find_or_create_user(&user("u1", "ada")).unwrap();
        assert!(created);
        let (_, created) = storage.find_or_create_user(&user("u1", "ada")).unwrap();
        assert!(!created);

        // Another id claiming the same handle is refused
        assert!(matches!(
            storage.find_or_create_user(&user("u2", "ada")),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(storage.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_topics_and_posts_are_idempotent() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let (topic, created) = storage.find_or_create_topic("Releases", None).unwrap();
        assert!(created);
        let (again, created) = storage.find_or_create_topic("Releases", Some("ignored")).unwrap();
        assert!(!created);
        assert_eq!(topic.id, again.id);

        let post = Post {
            id: 0,
            owner: "alice".to_string(),
            author: "ada".to_string(),
            topic_id: Some(topic.id),
            title: "Shipped 1.2".to_string(),
            body: "Notes inside".to_string(),
            metadata: Metadata::new(),
            created_at: as_of(),
        };
        let (first, created) = storage.find_or_create_post(&post).unwrap();
        assert!(created);
        let (second, created) = storage.find_or_create_post(&post).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(storage.list_posts("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_preferences_upsert() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        assert!(storage.set_preference("alice", "theme", "dark").unwrap());
        assert!(!storage.set_preference("alice", "theme", "dark").unwrap());
        assert!(storage.set_preference("alice", "theme", "light").unwrap());
        assert!(!storage.default_preference("alice", "theme", "dark").unwrap());
        assert_eq!(
            storage.get_preference("alice", "theme").unwrap(),
            Some("light".to_string())
        );
    }

    #[test]
    fn test_notifications_keyed_by_subject() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let n = Notification {
            id: 0,
            owner: "alice".to_string(),
            kind: NotificationKind::UpcomingEvent,
            subject: "event:1".to_string(),
            message: "Sync tomorrow".to_string(),
            read: false,
            created_at: as_of(),
        };
        let (stored, created) = storage.find_or_create_notification(&n).unwrap();
        assert!(created);
        let (_, created) = storage.find_or_create_notification(&n).unwrap();
        assert!(!created);

        storage.mark_notification_read(stored.id).unwrap();
        assert!(storage.list_notifications("alice").unwrap()[0].read);
    }

    #[test]
    fn test_cross_references_deduplicate() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let xref = CrossReference {
            owner: "alice".to_string(),
            source_kind: EntityKind::Event,
            source_id: 1,
            target_kind: EntityKind::Process,
            target_id: 1,
        };
        assert!(storage.add_cross_reference(&xref).unwrap());
        assert!(!storage.add_cross_reference(&xref).unwrap());
        assert_eq!(storage.list_cross_references("alice").unwrap(), vec![xref]);

        let self_ref = CrossReference {
            owner: "alice".to_string(),
            source_kind: EntityKind::Post,
            source_id: 3,
            target_kind: EntityKind::Post,
            target_id: 3,
        };
        assert!(storage.add_cross_reference(&self_ref).is_err());
    }

    #[test]
    fn test_insight_report_replaces_metrics() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let mut report = InsightReport {
            owner: "alice".to_string(),
            period: "2026-03".to_string(),
            metrics: serde_json::json!({"events": 1}),
            generated_at: as_of(),
        };
        storage.upsert_insight_report(&report).unwrap();
        report.metrics = serde_json::json!({"events": 2});
        storage.upsert_insight_report(&report).unwrap();

        let stored = storage.get_insight_report("alice", "2026-03").unwrap().unwrap();
        assert_eq!(stored.metrics["events"], 2);
        assert_eq!(storage.owner_counts("alice").unwrap().reports, 1);
    }

    #[test]
    fn test_store_totals() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        assert_eq!(storage.store_totals().unwrap(), StoreTotals::default());

        let template = storage
            .insert_process(&crate::models::Process::template("alice", "Audit"))
            .unwrap();
        storage.add_step(template, "Collect", None).unwrap();
        storage
            .insert_process(&crate::models::Process::new("bob", "Errands"))
            .unwrap();
        storage.find_or_create_user(&user("alice", "alice")).unwrap();

        let totals = storage.store_totals().unwrap();
        assert_eq!(totals.templates, 1);
        assert_eq!(totals.processes, 1);
        assert_eq!(totals.steps, 1);
        assert_eq!(totals.users, 1);
    }
}
