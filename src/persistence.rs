//! # SQLite Store
//!
//! Durable implementation of the spot, travel and comment repositories on a
//! single SQLite connection.
//!
//! Rows are read into plain column structs first and converted to domain
//! values afterwards, so a corrupted enum or text value surfaces as
//! [`Error::DataIntegrity`] naming the field and the row instead of a
//! generic SQLite error.

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::journey::{StepType, Travel, TravelId, TravelStatus, TravelStep, TravelStepId, UserId};
use crate::repository::{CommentRepository, SpotRepository, TravelRepository};
use crate::spot::{
    parse_appreciation, parse_comment_appreciation, parse_comment_text, parse_direction,
    parse_waiting_time_minutes, Comment, CommentId, Spot, SpotId,
};
use crate::{Bounds, GpsPoint};

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SPOT_COLUMNS: &str = "id, latitude, longitude, road_name, appreciation, direction, destinations, \
                            created_at, updated_at, created_by";
const TRAVEL_COLUMNS: &str = "id, user_id, start_date, end_date, origin, destination, status, \
                              total_distance, total_wait_time";
const COMMENT_COLUMNS: &str = "id, spot_id, appreciation, comment, waiting_time_minutes, \
                               created_at, updated_at, created_by";

/// SQLite-backed repositories.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        info!("[SqliteStore] Opened {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS spots (
                id TEXT PRIMARY KEY,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                road_name TEXT NOT NULL,
                appreciation TEXT NOT NULL,
                direction TEXT NOT NULL,
                destinations TEXT NOT NULL DEFAULT '[]',  -- JSON array of strings
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                created_by TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS travels (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                start_date INTEGER NOT NULL,
                end_date INTEGER,
                origin TEXT NOT NULL,
                destination TEXT NOT NULL,
                status TEXT NOT NULL,
                total_distance REAL NOT NULL DEFAULT 0,
                total_wait_time REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS travel_steps (
                id TEXT PRIMARY KEY,
                travel_id TEXT NOT NULL REFERENCES travels(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                step_type TEXT NOT NULL,
                spot_id TEXT,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                notes TEXT
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                spot_id TEXT NOT NULL,
                appreciation TEXT NOT NULL,
                comment TEXT NOT NULL,
                waiting_time_minutes REAL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                created_by TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_spots_lat_lng ON spots(latitude, longitude);
            CREATE INDEX IF NOT EXISTS idx_travels_user ON travels(user_id, start_date);
            CREATE INDEX IF NOT EXISTS idx_travel_steps_travel ON travel_steps(travel_id, position);
            CREATE INDEX IF NOT EXISTS idx_comments_spot ON comments(spot_id, created_at);
        "#,
        )?;

        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            info!("[SqliteStore] Migrated schema from version {} to {}", version, SCHEMA_VERSION);
        }

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))
    }

    fn load_steps(conn: &Connection, travel_id: &str) -> Result<Vec<TravelStep>> {
        let mut stmt = conn.prepare(
            "SELECT id, travel_id, step_type, spot_id, start_time, end_time, notes
             FROM travel_steps WHERE travel_id = ? ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![travel_id], StepRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StepRow::into_step).collect()
    }

    fn load_travels(conn: &Connection, sql: &str, user_id: &UserId) -> Result<Vec<Travel>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![user_id.as_str()], TravelRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|row| {
                let steps = Self::load_steps(conn, &row.id)?;
                row.into_travel(steps)
            })
            .collect()
    }
}

// ============================================================================
// Row structs
// ============================================================================

struct SpotRow {
    id: String,
    latitude: f64,
    longitude: f64,
    road_name: String,
    appreciation: String,
    direction: String,
    destinations: String,
    created_at: i64,
    updated_at: i64,
    created_by: String,
}

impl SpotRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            road_name: row.get(3)?,
            appreciation: row.get(4)?,
            direction: row.get(5)?,
            destinations: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            created_by: row.get(9)?,
        })
    }

    fn into_spot(self) -> Result<Spot> {
        let appreciation = parse_appreciation(&self.appreciation, &self.id)?;
        let direction = parse_direction(&self.direction, &self.id)?;
        let destinations: Vec<String> = serde_json::from_str(&self.destinations)
            .map_err(|_| Error::invalid_value("destinations", &self.destinations, "spot", &self.id))?;

        Ok(Spot {
            id: SpotId::new(self.id),
            coordinates: GpsPoint::new(self.latitude, self.longitude),
            road_name: self.road_name,
            appreciation,
            direction,
            destinations,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
        })
    }
}

struct TravelRow {
    id: String,
    user_id: String,
    start_date: i64,
    end_date: Option<i64>,
    origin: String,
    destination: String,
    status: String,
    total_distance: f64,
    total_wait_time: f64,
}

impl TravelRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            start_date: row.get(2)?,
            end_date: row.get(3)?,
            origin: row.get(4)?,
            destination: row.get(5)?,
            status: row.get(6)?,
            total_distance: row.get(7)?,
            total_wait_time: row.get(8)?,
        })
    }

    fn into_travel(self, steps: Vec<TravelStep>) -> Result<Travel> {
        let status: TravelStatus = self
            .status
            .parse()
            .map_err(|_| Error::invalid_value("status", &self.status, "travel", &self.id))?;

        Ok(Travel {
            id: TravelId::new(self.id),
            user_id: UserId::new(self.user_id),
            start_date: self.start_date,
            end_date: self.end_date,
            origin: self.origin,
            destination: self.destination,
            status,
            steps,
            total_distance: self.total_distance,
            total_wait_time: self.total_wait_time,
        })
    }
}

struct StepRow {
    id: String,
    travel_id: String,
    step_type: String,
    spot_id: Option<String>,
    start_time: i64,
    end_time: Option<i64>,
    notes: Option<String>,
}

impl StepRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            travel_id: row.get(1)?,
            step_type: row.get(2)?,
            spot_id: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            notes: row.get(6)?,
        })
    }

    fn into_step(self) -> Result<TravelStep> {
        let step_type: StepType = self
            .step_type
            .parse()
            .map_err(|_| Error::invalid_value("step type", &self.step_type, "travel step", &self.id))?;

        Ok(TravelStep {
            id: TravelStepId::new(self.id),
            travel_id: TravelId::new(self.travel_id),
            step_type,
            spot_id: self.spot_id.map(SpotId::new),
            start_time: self.start_time,
            end_time: self.end_time,
            notes: self.notes,
        })
    }
}

struct CommentRow {
    id: String,
    spot_id: String,
    appreciation: String,
    comment: String,
    waiting_time_minutes: Option<f64>,
    created_at: i64,
    updated_at: i64,
    created_by: String,
}

impl CommentRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            spot_id: row.get(1)?,
            appreciation: row.get(2)?,
            comment: row.get(3)?,
            waiting_time_minutes: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            created_by: row.get(7)?,
        })
    }

    fn into_comment(self) -> Result<Comment> {
        let appreciation = parse_comment_appreciation(&self.appreciation, &self.id)?;
        let comment = parse_comment_text(&self.comment, &self.id)?;
        let waiting_time_minutes = parse_waiting_time_minutes(self.waiting_time_minutes, &self.id)?;

        Ok(Comment {
            id: CommentId::new(self.id),
            spot_id: SpotId::new(self.spot_id),
            appreciation,
            comment,
            waiting_time_minutes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
        })
    }
}

fn destinations_json(spot: &Spot) -> Result<String> {
    Ok(serde_json::to_string(&spot.destinations)?)
}

// ============================================================================
// Repositories
// ============================================================================

impl SpotRepository for SqliteStore {
    fn get_all_spots(&self) -> Result<Vec<Spot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM spots ORDER BY created_at DESC",
            SPOT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], SpotRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(SpotRow::into_spot).collect()
    }

    fn get_spot_by_id(&self, id: &SpotId) -> Result<Option<Spot>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM spots WHERE id = ?", SPOT_COLUMNS),
                params![id.as_str()],
                SpotRow::from_row,
            )
            .optional()?;
        row.map(SpotRow::into_spot).transpose()
    }

    fn get_spots_in_bounds(&self, bounds: &Bounds) -> Result<Vec<Spot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM spots
             WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4
             ORDER BY created_at DESC",
            SPOT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![bounds.min_lat, bounds.max_lat, bounds.min_lng, bounds.max_lng],
                SpotRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("[SqliteStore] {} spots in bounds", rows.len());
        rows.into_iter().map(SpotRow::into_spot).collect()
    }

    fn create_spot(&self, spot: &Spot) -> Result<()> {
        let destinations = destinations_json(spot)?;
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO spots ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", SPOT_COLUMNS),
            params![
                spot.id.as_str(),
                spot.coordinates.latitude,
                spot.coordinates.longitude,
                spot.road_name,
                spot.appreciation.as_str(),
                spot.direction.as_str(),
                destinations,
                spot.created_at,
                spot.updated_at,
                spot.created_by,
            ],
        )?;
        Ok(())
    }

    fn update_spot(&self, spot: &Spot) -> Result<()> {
        let destinations = destinations_json(spot)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE spots SET latitude = ?2, longitude = ?3, road_name = ?4, appreciation = ?5,
                direction = ?6, destinations = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                spot.id.as_str(),
                spot.coordinates.latitude,
                spot.coordinates.longitude,
                spot.road_name,
                spot.appreciation.as_str(),
                spot.direction.as_str(),
                destinations,
                spot.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound { entity: "Spot", id: spot.id.to_string() });
        }
        Ok(())
    }

    fn delete_spot(&self, id: &SpotId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM spots WHERE id = ?", params![id.as_str()])?;
        Ok(())
    }
}

impl TravelRepository for SqliteStore {
    fn save_travel(&self, travel: &Travel) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO travels ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    end_date = excluded.end_date,
                    origin = excluded.origin,
                    destination = excluded.destination,
                    status = excluded.status,
                    total_distance = excluded.total_distance,
                    total_wait_time = excluded.total_wait_time",
                TRAVEL_COLUMNS
            ),
            params![
                travel.id.as_str(),
                travel.user_id.as_str(),
                travel.start_date,
                travel.end_date,
                travel.origin,
                travel.destination,
                travel.status.as_str(),
                travel.total_distance,
                travel.total_wait_time,
            ],
        )?;

        tx.execute("DELETE FROM travel_steps WHERE travel_id = ?", params![travel.id.as_str()])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO travel_steps (id, travel_id, position, step_type, spot_id, start_time, end_time, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (position, step) in travel.steps.iter().enumerate() {
                stmt.execute(params![
                    step.id.as_str(),
                    travel.id.as_str(),
                    position as i64,
                    step.step_type.as_str(),
                    step.spot_id.as_ref().map(|id| id.as_str()),
                    step.start_time,
                    step.end_time,
                    step.notes,
                ])?;
            }
        }

        tx.commit()?;
        debug!("[SqliteStore] Saved travel {} ({} steps)", travel.id, travel.steps.len());
        Ok(())
    }

    fn get_travel(&self, id: &TravelId) -> Result<Option<Travel>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM travels WHERE id = ?", TRAVEL_COLUMNS),
                params![id.as_str()],
                TravelRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let steps = Self::load_steps(&conn, &row.id)?;
                row.into_travel(steps).map(Some)
            }
            None => Ok(None),
        }
    }

    fn get_active_travel(&self, user_id: &UserId) -> Result<Option<Travel>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM travels WHERE user_id = ? AND status = '{}'
             ORDER BY start_date DESC LIMIT 1",
            TRAVEL_COLUMNS,
            TravelStatus::InProgress.as_str()
        );
        Ok(Self::load_travels(&conn, &sql, user_id)?.into_iter().next())
    }

    fn get_travels_for_user(&self, user_id: &UserId) -> Result<Vec<Travel>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM travels WHERE user_id = ? ORDER BY start_date DESC",
            TRAVEL_COLUMNS
        );
        Self::load_travels(&conn, &sql, user_id)
    }

    fn delete_travel(&self, id: &TravelId) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM travel_steps WHERE travel_id = ?", params![id.as_str()])?;
        tx.execute("DELETE FROM travels WHERE id = ?", params![id.as_str()])?;
        tx.commit()?;
        Ok(())
    }
}

impl CommentRepository for SqliteStore {
    fn get_comments_for_spot(&self, spot_id: &SpotId) -> Result<Vec<Comment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM comments WHERE spot_id = ? ORDER BY created_at DESC",
            COMMENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![spot_id.as_str()], CommentRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(CommentRow::into_comment).collect()
    }

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO comments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COMMENT_COLUMNS),
            params![
                comment.id.as_str(),
                comment.spot_id.as_str(),
                comment.appreciation.as_str(),
                comment.comment,
                comment.waiting_time_minutes.map(f64::from),
                comment.created_at,
                comment.updated_at,
                comment.created_by,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::{Appreciation, CommentAppreciation, Direction};
    use tempfile::TempDir;

    fn make_spot(name: &str, lat: f64, lng: f64, created_at: i64) -> Spot {
        Spot::new(
            GpsPoint::new(lat, lng),
            name,
            Appreciation::Perfect,
            Direction::NorthEast,
            vec!["Lyon".to_string(), "Paris".to_string()],
            "tester",
            created_at,
        )
    }

    fn make_comment(spot_id: &SpotId, created_at: i64) -> Comment {
        Comment {
            id: CommentId::generate(),
            spot_id: spot_id.clone(),
            appreciation: CommentAppreciation::Good,
            comment: "Got a lift in 10 minutes".to_string(),
            waiting_time_minutes: Some(10),
            created_at,
            updated_at: created_at,
            created_by: "tester".to_string(),
        }
    }

    fn raw(store: &SqliteStore, sql: &str) {
        store.lock().unwrap().execute_batch(sql).unwrap();
    }

    #[test]
    fn test_spot_crud() {
        let store = SqliteStore::in_memory().unwrap();
        let mut spot = make_spot("N7", 45.0, 5.0, 100);
        store.create_spot(&spot).unwrap();

        assert_eq!(store.get_spot_by_id(&spot.id).unwrap(), Some(spot.clone()));

        spot.road_name = "A7".to_string();
        spot.appreciation = Appreciation::Bad;
        spot.updated_at = 200;
        store.update_spot(&spot).unwrap();
        assert_eq!(store.get_spot_by_id(&spot.id).unwrap(), Some(spot.clone()));

        store.delete_spot(&spot.id).unwrap();
        assert!(store.get_spot_by_id(&spot.id).unwrap().is_none());
        // Idempotent
        store.delete_spot(&spot.id).unwrap();
    }

    #[test]
    fn test_duplicate_spot_is_storage_error() {
        let store = SqliteStore::in_memory().unwrap();
        let spot = make_spot("N7", 45.0, 5.0, 100);
        store.create_spot(&spot).unwrap();
        assert!(matches!(store.create_spot(&spot), Err(Error::Storage(_))));
    }

    #[test]
    fn test_update_missing_spot() {
        let store = SqliteStore::in_memory().unwrap();
        let spot = make_spot("N7", 45.0, 5.0, 100);
        assert!(matches!(store.update_spot(&spot), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_spots_in_bounds_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let old = make_spot("old", 45.1, 5.1, 100);
        let new = make_spot("new", 45.2, 5.2, 300);
        let outside = make_spot("outside", 48.0, 2.0, 200);
        for spot in [&old, &new, &outside] {
            store.create_spot(spot).unwrap();
        }

        let bounds = Bounds { min_lat: 45.0, max_lat: 45.5, min_lng: 5.0, max_lng: 5.5 };
        let names: Vec<String> = store
            .get_spots_in_bounds(&bounds)
            .unwrap()
            .into_iter()
            .map(|s| s.road_name)
            .collect();
        assert_eq!(names, vec!["new", "old"]);

        assert_eq!(store.get_all_spots().unwrap().len(), 3);
        assert_eq!(store.get_all_spots().unwrap()[0].road_name, "new");
    }

    #[test]
    fn test_corrupt_spot_rows_are_integrity_errors() {
        let store = SqliteStore::in_memory().unwrap();
        raw(
            &store,
            "INSERT INTO spots VALUES ('s1', 45.0, 5.0, 'N7', 'meh', 'North', '[]', 0, 0, 'x');
             INSERT INTO spots VALUES ('s2', 45.0, 5.0, 'N7', 'good', 'Up', '[]', 0, 0, 'x');
             INSERT INTO spots VALUES ('s3', 45.0, 5.0, 'N7', 'good', 'North', 'not json', 0, 0, 'x');",
        );

        for id in ["s1", "s2", "s3"] {
            let err = store.get_spot_by_id(&SpotId::new(id)).unwrap_err();
            assert!(matches!(err, Error::DataIntegrity(_)), "{}: {:?}", id, err);
            assert!(err.to_string().contains(id));
        }
        assert!(matches!(store.get_all_spots(), Err(Error::DataIntegrity(_))));
    }

    #[test]
    fn test_travel_round_trip_with_steps() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new("u1");
        let mut travel = Travel::start(user.clone(), "Lyon", "Marseille", 1_000);
        let spot_id = SpotId::new("spot-1");
        let waiting = TravelStep::open(travel.id.clone(), StepType::Waiting, Some(spot_id), 1_000).closed_at(5_000);
        let mut ride = TravelStep::open(travel.id.clone(), StepType::InVehicle, None, 5_000);
        ride.notes = Some("truck".to_string());
        travel.steps = vec![waiting, ride];

        store.save_travel(&travel).unwrap();
        assert_eq!(store.get_travel(&travel.id).unwrap(), Some(travel.clone()));

        // Upsert replaces steps and status
        travel.steps.truncate(1);
        travel.status = TravelStatus::Completed;
        travel.end_date = Some(9_000);
        store.save_travel(&travel).unwrap();
        assert_eq!(store.get_travel(&travel.id).unwrap(), Some(travel.clone()));

        store.delete_travel(&travel.id).unwrap();
        assert!(store.get_travel(&travel.id).unwrap().is_none());
    }

    #[test]
    fn test_active_travel_and_user_history() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new("u1");

        let mut done = Travel::start(user.clone(), "A", "B", 100);
        done.status = TravelStatus::Completed;
        let older_active = Travel::start(user.clone(), "B", "C", 200);
        let active = Travel::start(user.clone(), "C", "D", 300);
        let other_user = Travel::start(UserId::new("u2"), "X", "Y", 400);
        for t in [&done, &older_active, &active, &other_user] {
            store.save_travel(t).unwrap();
        }

        assert_eq!(store.get_active_travel(&user).unwrap().map(|t| t.id), Some(active.id.clone()));
        assert!(store.get_active_travel(&UserId::new("nobody")).unwrap().is_none());

        let history: Vec<TravelId> = store.get_travels_for_user(&user).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(history, vec![active.id, older_active.id, done.id]);
    }

    #[test]
    fn test_corrupt_travel_rows_are_integrity_errors() {
        let store = SqliteStore::in_memory().unwrap();
        raw(
            &store,
            "INSERT INTO travels VALUES ('t1', 'u1', 0, NULL, 'A', 'B', 'Lost', 0, 0);
             INSERT INTO travels VALUES ('t2', 'u1', 0, NULL, 'A', 'B', 'InProgress', 0, 0);
             INSERT INTO travel_steps VALUES ('st1', 't2', 0, 'Swimming', NULL, 0, NULL, NULL);",
        );

        let err = store.get_travel(&TravelId::new("t1")).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        let err = store.get_travel(&TravelId::new("t2")).unwrap_err();
        assert!(err.to_string().contains("st1"));
    }

    #[test]
    fn test_comments_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let spot_id = SpotId::new("spot-1");
        let first = make_comment(&spot_id, 100);
        let second = make_comment(&spot_id, 200);
        store.create_comment(&first).unwrap();
        store.create_comment(&second).unwrap();
        store.create_comment(&make_comment(&SpotId::new("other"), 300)).unwrap();

        let comments = store.get_comments_for_spot(&spot_id).unwrap();
        assert_eq!(comments, vec![second, first]);
    }

    #[test]
    fn test_corrupt_comment_rows_are_integrity_errors() {
        let store = SqliteStore::in_memory().unwrap();
        raw(
            &store,
            "INSERT INTO comments VALUES ('c1', 'sp1', 'great', 'ok', NULL, 0, 0, 'x');
             INSERT INTO comments VALUES ('c2', 'sp2', 'good', '   ', NULL, 0, 0, 'x');
             INSERT INTO comments VALUES ('c3', 'sp3', 'good', 'ok', -5, 0, 0, 'x');",
        );

        for spot in ["sp1", "sp2", "sp3"] {
            let result = store.get_comments_for_spot(&SpotId::new(spot));
            assert!(matches!(result, Err(Error::DataIntegrity(_))), "{}", spot);
        }
    }

    #[test]
    fn test_comment_text_is_trimmed_on_read() {
        let store = SqliteStore::in_memory().unwrap();
        raw(
            &store,
            "INSERT INTO comments VALUES ('c1', 'sp1', 'perfect', '  great spot  ', 12.4, 0, 0, 'x');",
        );
        let comments = store.get_comments_for_spot(&SpotId::new("sp1")).unwrap();
        assert_eq!(comments[0].comment, "great spot");
        assert_eq!(comments[0].waiting_time_minutes, Some(12));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hitch.db");
        let spot = make_spot("N7", 45.0, 5.0, 100);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_spot(&spot).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_spot_by_id(&spot.id).unwrap(), Some(spot));

        let version: i64 = store
            .lock()
            .unwrap()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        }
        assert!(matches!(SqliteStore::open(&path), Err(Error::Config(_))));
    }
}
