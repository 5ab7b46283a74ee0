//! [`SqliteStore`] — the SQLite implementation of [`PointStore`].

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  attendance::{AttendanceEvent, NewAttendanceEvent},
  point::{ExpirationKind, NewPoint, Point},
  store::{PointStore, ReplayWrite},
  violation::ViolationType,
};

use crate::{
  encode::{
    encode_date, encode_decimal, encode_dt, encode_uuid,
    encode_violation_type, read_attendance_row, read_point_row, RawAttendance, RawPoint,
    ATTENDANCE_COLUMNS, POINT_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A tally ledger backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. The store
/// guarantees atomicity per method; per-user write serialization is the
/// ledger service's job.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a point SELECT with one text parameter and decode every row.
  async fn select_points(
    &self,
    where_clause: &'static str,
    param: String,
  ) -> Result<Vec<Point>> {
    let raws: Vec<RawPoint> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {POINT_COLUMNS} FROM points WHERE {where_clause}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![param], read_point_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPoint::into_point).collect()
  }
}

// ─── PointStore impl ─────────────────────────────────────────────────────────

impl PointStore for SqliteStore {
  type Error = Error;

  // ── Points ──────────────────────────────────────────────────────────────

  async fn insert_point(&self, input: NewPoint) -> Result<Point> {
    let point = Point {
      point_id:             Uuid::new_v4(),
      user_id:              input.user_id,
      source_attendance_id: input.source_attendance_id,
      violation_date:       input.violation_date,
      violation_type:       input.violation_type,
      point_value:          input.point_value,
      is_advised:           input.is_advised,
      is_manual:            input.is_manual,
      is_excused:           false,
      excuse_reason:        None,
      excused_by:           None,
      is_expired:           false,
      expiration_kind:      ExpirationKind::None,
      expires_at:           input.expires_at,
      behavioral_eligible:  input.behavioral_eligible,
      projected_behavioral_date: None,
      behavioral_applied_at: None,
      behavioral_batch_id:  None,
      note:                 input.note,
      created_at:           Utc::now(),
    };

    let point_id_str   = encode_uuid(point.point_id);
    let user_id_str    = encode_uuid(point.user_id);
    let source_str     = point.source_attendance_id.map(encode_uuid);
    let date_str       = encode_date(point.violation_date);
    let type_str       = encode_violation_type(point.violation_type).to_owned();
    let value_str      = encode_decimal(point.point_value);
    let is_advised     = point.is_advised;
    let is_manual      = point.is_manual;
    let expires_str    = encode_date(point.expires_at);
    let eligible       = point.behavioral_eligible;
    let note           = point.note.clone();
    let created_str    = encode_dt(point.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO points (
             point_id, user_id, source_attendance_id, violation_date,
             violation_type, point_value, is_advised, is_manual,
             is_excused, is_expired, expiration_kind, expires_at,
             behavioral_eligible, note, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, 'none', ?9, ?10, ?11, ?12)",
          rusqlite::params![
            point_id_str,
            user_id_str,
            source_str,
            date_str,
            type_str,
            value_str,
            is_advised,
            is_manual,
            expires_str,
            eligible,
            note,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(point)
  }

  async fn get_point(&self, id: Uuid) -> Result<Option<Point>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawPoint> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {POINT_COLUMNS} FROM points WHERE point_id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], read_point_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPoint::into_point).transpose()
  }

  async fn points_for_user(&self, user_id: Uuid) -> Result<Vec<Point>> {
    self
      .select_points("user_id = ?1", encode_uuid(user_id))
      .await
  }

  async fn all_points(&self) -> Result<Vec<Point>> {
    let raws: Vec<RawPoint> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {POINT_COLUMNS} FROM points ORDER BY user_id, violation_date, point_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], read_point_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPoint::into_point).collect()
  }

  async fn user_ids(&self) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM points")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| crate::encode::decode_uuid(s)).collect()
  }

  async fn find_point(
    &self,
    user_id: Uuid,
    violation_date: NaiveDate,
    violation_type: ViolationType,
  ) -> Result<Option<Point>> {
    let user_str = encode_uuid(user_id);
    let date_str = encode_date(violation_date);
    let type_str = encode_violation_type(violation_type).to_owned();

    let raw: Option<RawPoint> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {POINT_COLUMNS} FROM points
           WHERE user_id = ?1 AND violation_date = ?2 AND violation_type = ?3
           ORDER BY created_at, point_id LIMIT 1"
        );
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![user_str, date_str, type_str],
              read_point_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPoint::into_point).transpose()
  }

  async fn point_for_attendance(&self, attendance_id: Uuid) -> Result<Option<Point>> {
    let id_str = encode_uuid(attendance_id);

    let raw: Option<RawPoint> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {POINT_COLUMNS} FROM points
           WHERE source_attendance_id = ?1 LIMIT 1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], read_point_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPoint::into_point).transpose()
  }

  async fn delete_point(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM points WHERE point_id = ?1", rusqlite::params![id_str])?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn delete_points_on_date(
    &self,
    user_id: Uuid,
    violation_date: NaiveDate,
  ) -> Result<usize> {
    let user_str = encode_uuid(user_id);
    let date_str = encode_date(violation_date);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM points WHERE user_id = ?1 AND violation_date = ?2",
          rusqlite::params![user_str, date_str],
        )?)
      })
      .await?;

    Ok(changed)
  }

  // ── Decay writes ────────────────────────────────────────────────────────

  async fn set_excused(
    &self,
    id: Uuid,
    excused: bool,
    reason: Option<String>,
    excused_by: Option<String>,
  ) -> Result<Point> {
    let id_str = encode_uuid(id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE points SET is_excused = ?2, excuse_reason = ?3, excused_by = ?4
           WHERE point_id = ?1",
          rusqlite::params![id_str, excused, reason, excused_by],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::PointNotFound(id));
    }
    self.get_point(id).await?.ok_or(Error::PointNotFound(id))
  }

  async fn expire_fixed_for_user(
    &self,
    user_id: Uuid,
    today: NaiveDate,
  ) -> Result<Vec<Point>> {
    let user_str  = encode_uuid(user_id);
    let today_str = encode_date(today);

    let raws: Vec<RawPoint> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let sql = format!(
          "SELECT {POINT_COLUMNS} FROM points
           WHERE user_id = ?1 AND is_excused = 0 AND is_expired = 0
             AND expires_at <= ?2"
        );
        let rows = {
          let mut stmt = tx.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![user_str, today_str], read_point_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute(
          "UPDATE points SET is_expired = 1, expiration_kind = 'fixed'
           WHERE user_id = ?1 AND is_excused = 0 AND is_expired = 0
             AND expires_at <= ?2",
          rusqlite::params![user_str, today_str],
        )?;
        tx.commit()?;
        Ok(rows)
      })
      .await?;

    let mut points: Vec<Point> = raws
      .into_iter()
      .map(RawPoint::into_point)
      .collect::<Result<_>>()?;

    // The rows were read before the UPDATE inside the same transaction.
    for p in &mut points {
      p.is_expired = true;
      p.expiration_kind = ExpirationKind::Fixed;
    }
    Ok(points)
  }

  async fn users_with_due_projection(&self, today: NaiveDate) -> Result<Vec<Uuid>> {
    let today_str = encode_date(today);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT user_id FROM points
           WHERE projected_behavioral_date IS NOT NULL
             AND projected_behavioral_date <= ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![today_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| crate::encode::decode_uuid(s)).collect()
  }

  async fn apply_replay(&self, user_id: Uuid, write: ReplayWrite) -> Result<()> {
    let user_str = encode_uuid(user_id);

    // Pre-encode the whole write-set so the closure owns plain strings.
    let forgiven: Vec<(String, String, Vec<String>)> = write
      .forgiven
      .iter()
      .map(|b| {
        (
          encode_uuid(b.batch_id),
          encode_date(b.applied_on),
          b.point_ids.iter().copied().map(encode_uuid).collect(),
        )
      })
      .collect();
    let projections: Vec<(String, String)> = write
      .projections
      .iter()
      .map(|(id, date)| (encode_uuid(*id), encode_date(*date)))
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Reset: revert behaviorally-forgiven points to active and clear
        // every projection for this user.
        tx.execute(
          "UPDATE points
           SET is_expired = 0, expiration_kind = 'none',
               behavioral_applied_at = NULL, behavioral_batch_id = NULL
           WHERE user_id = ?1 AND expiration_kind = 'behavioral'",
          rusqlite::params![user_str],
        )?;
        tx.execute(
          "UPDATE points SET projected_behavioral_date = NULL WHERE user_id = ?1",
          rusqlite::params![user_str],
        )?;

        // Re-apply the replayed forgiveness history.
        for (batch_str, applied_str, point_ids) in &forgiven {
          for id_str in point_ids {
            tx.execute(
              "UPDATE points
               SET is_expired = 1, expiration_kind = 'behavioral',
                   behavioral_applied_at = ?2, behavioral_batch_id = ?3
               WHERE point_id = ?1",
              rusqlite::params![id_str, applied_str, batch_str],
            )?;
          }
        }

        // New display projections.
        for (id_str, date_str) in &projections {
          tx.execute(
            "UPDATE points SET projected_behavioral_date = ?2 WHERE point_id = ?1",
            rusqlite::params![id_str, date_str],
          )?;
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  // ── Attendance events ───────────────────────────────────────────────────

  async fn record_attendance(&self, input: NewAttendanceEvent) -> Result<AttendanceEvent> {
    let event = AttendanceEvent {
      attendance_id:  Uuid::new_v4(),
      user_id:        input.user_id,
      violation_date: input.violation_date,
      is_absent:      input.is_absent,
      minutes_late:   input.minutes_late,
      minutes_early:  input.minutes_early,
      is_advised:     input.is_advised,
      admin_verified: input.admin_verified,
      recorded_at:    Utc::now(),
    };

    let id_str       = encode_uuid(event.attendance_id);
    let user_str     = encode_uuid(event.user_id);
    let date_str     = encode_date(event.violation_date);
    let is_absent    = event.is_absent;
    let late         = event.minutes_late as i64;
    let early        = event.minutes_early as i64;
    let advised      = event.is_advised;
    let verified     = event.admin_verified;
    let recorded_str = encode_dt(event.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attendance_events (
             attendance_id, user_id, violation_date, is_absent,
             minutes_late, minutes_early, is_advised, admin_verified,
             recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str, user_str, date_str, is_absent, late, early, advised,
            verified, recorded_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn get_attendance(&self, id: Uuid) -> Result<Option<AttendanceEvent>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawAttendance> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ATTENDANCE_COLUMNS} FROM attendance_events WHERE attendance_id = ?1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], read_attendance_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAttendance::into_event).transpose()
  }

  async fn verified_events_without_points(&self) -> Result<Vec<AttendanceEvent>> {
    let raws: Vec<RawAttendance> = self
      .conn
      .call(|conn| {
        let sql = format!(
          "SELECT {ATTENDANCE_COLUMNS_PREFIXED} FROM attendance_events a
           LEFT JOIN points p ON p.source_attendance_id = a.attendance_id
           WHERE a.admin_verified = 1 AND p.point_id IS NULL",
          ATTENDANCE_COLUMNS_PREFIXED = "a.attendance_id, a.user_id, \
             a.violation_date, a.is_absent, a.minutes_late, a.minutes_early, \
             a.is_advised, a.admin_verified, a.recorded_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], read_attendance_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttendance::into_event).collect()
  }
}
