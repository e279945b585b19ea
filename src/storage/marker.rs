//! Marker storage with optimistic concurrency on `resource_version`.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::model::{NotificationMarker, NotificationState, ResourceKey, SubMachine};
use crate::notify::MarkerStore;

use super::{Result, Storage, StorageError, parse_timestamp};

const COLUMNS: &str = "namespace, name, owner_uid, current_state, last_notified_state,
    phase_observed, phase_notified, health_observed, health_notified,
    resource_version, updated_at";

impl MarkerStore for Storage {
    fn get_marker(&self, key: &ResourceKey) -> Result<Option<NotificationMarker>> {
        let conn = self.open_db()?;
        load_marker_row(&conn, key)
    }

    fn create_marker(&self, marker: &mut NotificationMarker) -> Result<()> {
        let conn = self.open_db()?;
        let result = conn.execute(
            "INSERT INTO notification_marker (namespace, name, owner_uid, current_state,
                last_notified_state, phase_observed, phase_notified, health_observed,
                health_notified, resource_version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
            rusqlite::params![
                &marker.key.namespace,
                &marker.key.name,
                &marker.owner_uid,
                state_column(marker.current_state),
                state_column(marker.last_notified_state),
                state_column(marker.phase.observed),
                state_column(marker.phase.notified),
                state_column(marker.health.observed),
                state_column(marker.health.notified),
                marker.updated_at.to_string(),
            ],
        );
        match result {
            Ok(_) => {
                marker.resource_version = 1;
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::AlreadyExists(marker.key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn patch_marker(&self, marker: &mut NotificationMarker) -> Result<()> {
        let conn = self.open_db()?;
        let rows = conn.execute(
            "UPDATE notification_marker
             SET owner_uid = ?1, current_state = ?2, last_notified_state = ?3,
                 phase_observed = ?4, phase_notified = ?5,
                 health_observed = ?6, health_notified = ?7,
                 resource_version = resource_version + 1, updated_at = ?8
             WHERE namespace = ?9 AND name = ?10 AND resource_version = ?11",
            rusqlite::params![
                &marker.owner_uid,
                state_column(marker.current_state),
                state_column(marker.last_notified_state),
                state_column(marker.phase.observed),
                state_column(marker.phase.notified),
                state_column(marker.health.observed),
                state_column(marker.health.notified),
                marker.updated_at.to_string(),
                &marker.key.namespace,
                &marker.key.name,
                marker.resource_version,
            ],
        )?;
        if rows == 0 {
            return match load_marker_row(&conn, &marker.key)? {
                Some(_) => Err(StorageError::Conflict(marker.key.clone())),
                None => Err(StorageError::NotFound(marker.key.clone())),
            };
        }
        marker.resource_version += 1;
        Ok(())
    }

    fn delete_marker(&self, key: &ResourceKey, owner_uid: &str) -> Result<bool> {
        let conn = self.open_db()?;
        let rows = conn.execute(
            "DELETE FROM notification_marker WHERE namespace = ?1 AND name = ?2 AND owner_uid = ?3",
            rusqlite::params![&key.namespace, &key.name, owner_uid],
        )?;
        Ok(rows > 0)
    }
}

impl Storage {
    /// Lists every marker, ordered by resource key.
    pub fn list_markers(&self) -> Result<Vec<NotificationMarker>> {
        let conn = self.open_db()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notification_marker ORDER BY namespace, name"
        ))?;
        let rows = stmt.query_map([], read_columns)?;
        let mut markers = Vec::new();
        for row in rows {
            markers.push(marker_from_columns(row?)?);
        }
        Ok(markers)
    }
}

/// Raw column values of one marker row.
type MarkerColumns = (
    String,
    String,
    String,
    [Option<String>; 6],
    i64,
    String,
);

fn read_columns(row: &Row<'_>) -> rusqlite::Result<MarkerColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        [
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ],
        row.get(9)?,
        row.get(10)?,
    ))
}

fn load_marker_row(conn: &Connection, key: &ResourceKey) -> Result<Option<NotificationMarker>> {
    let columns = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM notification_marker WHERE namespace = ?1 AND name = ?2"),
            rusqlite::params![&key.namespace, &key.name],
            read_columns,
        )
        .optional()?;
    columns.map(marker_from_columns).transpose()
}

fn marker_from_columns(columns: MarkerColumns) -> Result<NotificationMarker> {
    let (namespace, name, owner_uid, states, resource_version, updated_at) = columns;
    let [current, last_notified, phase_observed, phase_notified, health_observed, health_notified] =
        states;
    Ok(NotificationMarker {
        key: ResourceKey { namespace, name },
        owner_uid,
        current_state: parse_state(current)?,
        last_notified_state: parse_state(last_notified)?,
        phase: SubMachine {
            observed: parse_state(phase_observed)?,
            notified: parse_state(phase_notified)?,
        },
        health: SubMachine {
            observed: parse_state(health_observed)?,
            notified: parse_state(health_notified)?,
        },
        resource_version,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn state_column(state: Option<NotificationState>) -> Option<&'static str> {
    state.map(NotificationState::as_str)
}

fn parse_state(value: Option<String>) -> Result<Option<NotificationState>> {
    value
        .map(|s| s.parse().map_err(StorageError::Corrupt))
        .transpose()
}
