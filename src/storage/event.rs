//! Event log. Appended to while a resource lives, purged once it is deleted.

use rusqlite::Row;
use tracing::{debug, warn};

use crate::model::{Event, EventReason, EventType, NotificationId, ResourceKey};
use crate::notify::Recorder;

use super::{Result, Storage, StorageError, parse_timestamp};

impl Storage {
    /// Appends one event.
    pub fn append_event(&self, event: &Event) -> Result<()> {
        let conn = self.open_db()?;
        conn.execute(
            "INSERT INTO event (id, namespace, name, type, reason, message, notification_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                event.id.to_string(),
                &event.key.namespace,
                &event.key.name,
                event.event_type.as_str(),
                event.reason.as_str(),
                &event.message,
                event.notification_id.as_ref().map(NotificationId::as_str),
                event.recorded_at.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Deletes every event of one resource. Returns how many were removed.
    pub fn delete_events(&self, key: &ResourceKey) -> Result<usize> {
        let conn = self.open_db()?;
        let rows = conn.execute(
            "DELETE FROM event WHERE namespace = ?1 AND name = ?2",
            rusqlite::params![&key.namespace, &key.name],
        )?;
        Ok(rows)
    }

    /// Lists events oldest first, optionally for one resource.
    pub fn list_events(&self, key: Option<&ResourceKey>) -> Result<Vec<Event>> {
        let conn = self.open_db()?;
        let select = "SELECT id, namespace, name, type, reason, message, notification_id, recorded_at
                      FROM event";
        let mut rows = Vec::new();
        match key {
            Some(key) => {
                let mut stmt = conn.prepare(&format!(
                    "{select} WHERE namespace = ?1 AND name = ?2 ORDER BY recorded_at, rowid"
                ))?;
                for row in stmt.query_map(
                    rusqlite::params![&key.namespace, &key.name],
                    read_columns,
                )? {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{select} ORDER BY recorded_at, rowid"))?;
                for row in stmt.query_map([], read_columns)? {
                    rows.push(row?);
                }
            }
        }
        rows.into_iter().map(event_from_columns).collect()
    }
}

impl Recorder for Storage {
    fn record(&self, event: Event) {
        if let Err(e) = self.append_event(&event) {
            warn!(app = %event.key, reason = %event.reason, "failed to record event: {e}");
        }
    }

    fn forget(&self, key: &ResourceKey) {
        match self.delete_events(key) {
            Ok(removed) => debug!(app = %key, removed, "removed events"),
            Err(e) => warn!(app = %key, "failed to remove events: {e}"),
        }
    }
}

struct EventColumns {
    id: String,
    namespace: String,
    name: String,
    event_type: String,
    reason: String,
    message: String,
    notification_id: Option<String>,
    recorded_at: String,
}

fn read_columns(row: &Row<'_>) -> rusqlite::Result<EventColumns> {
    Ok(EventColumns {
        id: row.get(0)?,
        namespace: row.get(1)?,
        name: row.get(2)?,
        event_type: row.get(3)?,
        reason: row.get(4)?,
        message: row.get(5)?,
        notification_id: row.get(6)?,
        recorded_at: row.get(7)?,
    })
}

fn event_from_columns(columns: EventColumns) -> Result<Event> {
    let event_type = match columns.event_type.as_str() {
        "Normal" => EventType::Normal,
        "Warning" => EventType::Warning,
        other => return Err(StorageError::Corrupt(format!("invalid event type: {other}"))),
    };
    let reason = EventReason::parse(&columns.reason)
        .ok_or_else(|| StorageError::Corrupt(format!("invalid event reason: {}", columns.reason)))?;
    let id = columns
        .id
        .parse()
        .map_err(|e| StorageError::Corrupt(format!("invalid event id: {e}")))?;

    Ok(Event {
        id,
        key: ResourceKey {
            namespace: columns.namespace,
            name: columns.name,
        },
        event_type,
        reason,
        message: columns.message,
        notification_id: columns.notification_id.map(NotificationId::from),
        recorded_at: parse_timestamp("recorded_at", &columns.recorded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;
    use tempfile::TempDir;

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        (dir, storage)
    }

    fn sample_event(name: &str, reason: EventReason, secs: i64) -> Event {
        Event::new(
            ResourceKey::new("argocd", name),
            EventType::Normal,
            reason,
            "created a comment",
            Timestamp::new(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    #[test]
    fn recorded_events_are_listed_in_order() {
        let (_dir, storage) = test_storage();
        let id = NotificationId::derive(&["uid", "phase-comment", "Synced"]);
        let first = sample_event("app1", EventReason::CreatedComment, 0).with_notification(&id);
        let second = sample_event("app1", EventReason::DeploymentAlreadyUpToDate, 5);

        storage.record(second.clone());
        storage.record(first.clone());

        let events = storage.list_events(None).unwrap();
        assert_eq!(events, vec![first, second]);
    }

    #[test]
    fn list_events_filters_by_resource() {
        let (_dir, storage) = test_storage();
        storage.record(sample_event("app1", EventReason::CreatedComment, 0));
        storage.record(sample_event("app2", EventReason::DeploymentNotFound, 1));

        let events = storage
            .list_events(Some(&ResourceKey::new("argocd", "app2")))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, EventReason::DeploymentNotFound);
        assert_eq!(events[0].notification_id, None);
    }

    #[test]
    fn forget_drops_only_that_resource() {
        let (_dir, storage) = test_storage();
        storage.record(sample_event("app1", EventReason::CreatedComment, 0));
        storage.record(sample_event("app1", EventReason::DeploymentNotFound, 1));
        storage.record(sample_event("app2", EventReason::CreatedComment, 2));

        let app1 = ResourceKey::new("argocd", "app1");
        storage.forget(&app1);

        assert!(storage.list_events(Some(&app1)).unwrap().is_empty());
        let rest = storage.list_events(None).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key.name, "app2");
        assert_eq!(storage.delete_events(&app1).unwrap(), 0);
    }

    #[test]
    fn unknown_reason_is_corrupt() {
        let (_dir, storage) = test_storage();
        storage.record(sample_event("app1", EventReason::CreatedComment, 0));
        storage
            .open_db()
            .unwrap()
            .execute("UPDATE event SET reason = 'Bogus'", [])
            .unwrap();

        let err = storage.list_events(None).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
