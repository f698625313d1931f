//! Entity types, materialization and the ingestion save path.
//!
//! Result rows arrive with every column aliased `<primary_table>_<field>`
//! (see [`crate::field::select_list`]), so each `from_row` implementation
//! works for any join shape the compiler produces. Statistic columns are
//! read sparsely: only nonzero values are kept, and lookup defaults to zero.
//!
//! Related entities resolve lazily through explicit async accessors that
//! fetch by primary key on first use; [`crate::eager`] batch-fills the same
//! associations for whole collections in one statement.

use crate::client::GenericClient;
use crate::error::{StoreError, StoreResult};
use crate::field;
use crate::join;
use crate::params::ParamList;
use crate::row::{FromRow, RowExt};
use crate::schema::EntityKind;
use crate::stats::Statistics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::Row;

/// Seconds per regulation period.
pub const PERIOD_SECONDS: i16 = 900;

/// A point in game time: period number plus elapsed seconds within it.
///
/// Stored in the database as total elapsed game seconds; the explicit
/// serializer pair is [`Clock::game_seconds`] / [`Clock::from_game_seconds`],
/// invoked by the parameter-binding and row-reading layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Clock {
    period: i16,
    elapsed: i16,
}

impl Clock {
    pub fn new(period: i16, elapsed: i16) -> Self {
        Self { period, elapsed }
    }

    pub fn period(&self) -> i16 {
        self.period
    }

    pub fn elapsed(&self) -> i16 {
        self.elapsed
    }

    /// Total elapsed game seconds, the stored representation.
    pub fn game_seconds(&self) -> i32 {
        (self.period as i32 - 1) * PERIOD_SECONDS as i32 + self.elapsed as i32
    }

    pub fn from_game_seconds(total: i32) -> Self {
        Self {
            period: (total / PERIOD_SECONDS as i32) as i16 + 1,
            elapsed: (total % PERIOD_SECONDS as i32) as i16,
        }
    }
}

/// A position on the field as a signed offset from midfield, in the range
/// -50 (own goal line) to 50 (opponent goal line). Stored as a smallint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FieldPos {
    offset: i16,
}

impl FieldPos {
    pub fn new(offset: i16) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> i16 {
        self.offset
    }
}

fn read_clock(row: &Row, column: &str) -> StoreResult<Option<Clock>> {
    let secs: Option<i32> = row.try_get_column(column)?;
    Ok(secs.map(Clock::from_game_seconds))
}

fn read_field_pos(row: &Row, column: &str) -> StoreResult<Option<FieldPos>> {
    let offset: Option<i16> = row.try_get_column(column)?;
    Ok(offset.map(FieldPos::new))
}

/// Read the statistic columns of `kind` out of a row, keeping nonzero
/// values only.
fn read_stats(row: &Row, kind: EntityKind) -> StoreResult<Statistics> {
    let prefix = kind.primary_table();
    let mut stats = Statistics::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let Some(name) = column.name().strip_prefix(prefix) else {
            continue;
        };
        let Some(name) = name.strip_prefix('_') else {
            continue;
        };
        if !crate::stats::ACTION_STATS.contains(&name)
            && !crate::stats::PARTICIPANT_STATS.contains(&name)
        {
            continue;
        }
        let value: i32 = row
            .try_get(idx)
            .map_err(|e| StoreError::decode(column.name(), e.to_string()))?;
        if value != 0 {
            stats.set(name, value)?;
        }
    }
    Ok(stats)
}

/// `INSERT .. ON CONFLICT (pk) DO UPDATE` for one writable table. Audit
/// columns are stamped by the database: both on insert, `time_updated`
/// alone on conflict.
fn upsert_sql(table: &str, pk: &[&str], data: &[&str], stamped: bool) -> String {
    let mut insert_cols: Vec<&str> = pk.iter().chain(data.iter()).copied().collect();
    let mut placeholders: Vec<String> = (1..=insert_cols.len()).map(|i| format!("${i}")).collect();
    if stamped {
        insert_cols.push("time_inserted");
        insert_cols.push("time_updated");
        placeholders.push("NOW()".to_string());
        placeholders.push("NOW()".to_string());
    }
    let mut updates: Vec<String> = data
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();
    if stamped {
        updates.push("time_updated = NOW()".to_string());
    }
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        insert_cols.join(", "),
        placeholders.join(", "),
        pk.join(", "),
        updates.join(", ")
    )
}

/// `SELECT <all fields> FROM <entity tables> WHERE <pk conds>` for
/// single-row fetches.
fn by_pk_sql(kind: EntityKind) -> StoreResult<String> {
    let list = field::select_list(kind, None)?;
    let from = join::from_clause(kind, None)?;
    let conds: Vec<String> = kind
        .meta()
        .primary_key
        .iter()
        .enumerate()
        .map(|(i, k)| format!("{}.{} = ${}", kind.primary_table(), k, i + 1))
        .collect();
    Ok(format!("SELECT {list} {from} WHERE {}", conds.join(" AND ")))
}

// ─── Event ──────────────────────────────────────────────────────────────────

/// A top-level match.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Event {
    pub event_id: String,
    pub season_year: i16,
    pub season_phase: String,
    pub week: i16,
    pub start_time: Option<DateTime<Utc>>,
    pub day_of_week: String,
    pub finished: bool,
    pub home_team: String,
    pub home_score: i16,
    pub home_turnovers: i16,
    pub away_team: String,
    pub away_score: i16,
    pub away_turnovers: i16,
    pub time_inserted: Option<DateTime<Utc>>,
    pub time_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    segments: Option<Vec<Segment>>,
}

impl Event {
    /// The winning team's abbreviation, `None` for a tie. Matches the SQL
    /// expansion of the derived `winner` field, which yields `''` on a tie.
    pub fn winner(&self) -> Option<&str> {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => Some(&self.home_team),
            std::cmp::Ordering::Less => Some(&self.away_team),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn loser(&self) -> Option<&str> {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Less => Some(&self.home_team),
            std::cmp::Ordering::Greater => Some(&self.away_team),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The date prefix of the event id.
    pub fn event_date(&self) -> &str {
        &self.event_id[..self.event_id.len().min(8)]
    }

    pub async fn by_pk(conn: &impl GenericClient, event_id: &str) -> StoreResult<Event> {
        let sql = by_pk_sql(EntityKind::Event)?;
        let row = conn.query_one(&sql, &[&event_id]).await?;
        Event::from_row(&row)
    }

    /// The event's segments, fetched on first access.
    pub async fn segments(&mut self, conn: &impl GenericClient) -> StoreResult<&[Segment]> {
        if self.segments.is_none() {
            let sql = format!(
                "SELECT {} {} WHERE segment.event_id = $1 ORDER BY segment.segment_id ASC",
                field::select_list(EntityKind::Segment, None)?,
                join::from_clause(EntityKind::Segment, None)?,
            );
            let rows = conn.query(&sql, &[&self.event_id]).await?;
            self.segments = Some(rows.iter().map(Segment::from_row).collect::<StoreResult<_>>()?);
        }
        Ok(self.segments.as_deref().expect("filled above"))
    }

    pub(crate) fn set_segments(&mut self, segments: Vec<Segment>) {
        self.segments = Some(segments);
    }

    /// Upsert this event, keyed on its primary key.
    pub async fn save(&self, conn: &impl GenericClient) -> StoreResult<()> {
        let data = [
            "season_year",
            "season_phase",
            "week",
            "start_time",
            "day_of_week",
            "finished",
            "home_team",
            "home_score",
            "home_turnovers",
            "away_team",
            "away_score",
            "away_turnovers",
        ];
        let sql = upsert_sql("event", &["event_id"], &data, true);
        conn.execute(
            &sql,
            &[
                &self.event_id,
                &self.season_year,
                &self.season_phase,
                &self.week,
                &self.start_time,
                &self.day_of_week,
                &self.finished,
                &self.home_team,
                &self.home_score,
                &self.home_turnovers,
                &self.away_team,
                &self.away_score,
                &self.away_turnovers,
            ],
        )
        .await?;
        Ok(())
    }
}

impl FromRow for Event {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Event {
            event_id: row.try_get_column("event_event_id")?,
            season_year: row.try_get_column("event_season_year")?,
            season_phase: row.try_get_column("event_season_phase")?,
            week: row.try_get_column("event_week")?,
            start_time: row.try_get_column("event_start_time")?,
            day_of_week: row.try_get_column("event_day_of_week")?,
            finished: row.try_get_column("event_finished")?,
            home_team: row.try_get_column("event_home_team")?,
            home_score: row.try_get_column("event_home_score")?,
            home_turnovers: row.try_get_column("event_home_turnovers")?,
            away_team: row.try_get_column("event_away_team")?,
            away_score: row.try_get_column("event_away_score")?,
            away_turnovers: row.try_get_column("event_away_turnovers")?,
            time_inserted: row.try_get_column("event_time_inserted")?,
            time_updated: row.try_get_column("event_time_updated")?,
            segments: None,
        })
    }
}

// ─── Segment ────────────────────────────────────────────────────────────────

/// A drive-like grouping of actions within an event.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Segment {
    pub event_id: String,
    pub segment_id: i32,
    pub possession_team: Option<String>,
    pub start_clock: Option<Clock>,
    pub end_clock: Option<Clock>,
    pub start_field: Option<FieldPos>,
    pub end_field: Option<FieldPos>,
    pub action_count: i16,
    pub yards_penalized: i16,
    pub result: Option<String>,
    pub time_inserted: Option<DateTime<Utc>>,
    pub time_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    event: Option<Box<Event>>,
    #[serde(skip)]
    actions: Option<Vec<Action>>,
}

impl Segment {
    pub async fn by_pk(
        conn: &impl GenericClient,
        event_id: &str,
        segment_id: i32,
    ) -> StoreResult<Segment> {
        let sql = by_pk_sql(EntityKind::Segment)?;
        let row = conn.query_one(&sql, &[&event_id, &segment_id]).await?;
        Segment::from_row(&row)
    }

    /// The owning event, fetched on first access.
    pub async fn event(&mut self, conn: &impl GenericClient) -> StoreResult<&Event> {
        if self.event.is_none() {
            self.event = Some(Box::new(Event::by_pk(conn, &self.event_id).await?));
        }
        Ok(self.event.as_deref().expect("filled above"))
    }

    pub async fn actions(&mut self, conn: &impl GenericClient) -> StoreResult<&[Action]> {
        if self.actions.is_none() {
            let sql = format!(
                "SELECT {} {} WHERE action.event_id = $1 AND action.segment_id = $2 \
                 ORDER BY action.action_id ASC",
                field::select_list(EntityKind::Action, None)?,
                join::from_clause(EntityKind::Action, None)?,
            );
            let rows = conn.query(&sql, &[&self.event_id, &self.segment_id]).await?;
            self.actions = Some(rows.iter().map(Action::from_row).collect::<StoreResult<_>>()?);
        }
        Ok(self.actions.as_deref().expect("filled above"))
    }

    pub(crate) fn set_event(&mut self, event: Event) {
        self.event = Some(Box::new(event));
    }

    pub async fn save(&self, conn: &impl GenericClient) -> StoreResult<()> {
        let data = [
            "possession_team",
            "start_clock",
            "end_clock",
            "start_field",
            "end_field",
            "action_count",
            "yards_penalized",
            "result",
        ];
        let sql = upsert_sql("segment", &["event_id", "segment_id"], &data, true);
        conn.execute(
            &sql,
            &[
                &self.event_id,
                &self.segment_id,
                &self.possession_team,
                &self.start_clock.map(|c| c.game_seconds()),
                &self.end_clock.map(|c| c.game_seconds()),
                &self.start_field.map(|p| p.offset()),
                &self.end_field.map(|p| p.offset()),
                &self.action_count,
                &self.yards_penalized,
                &self.result,
            ],
        )
        .await?;
        Ok(())
    }
}

impl FromRow for Segment {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Segment {
            event_id: row.try_get_column("segment_event_id")?,
            segment_id: row.try_get_column("segment_segment_id")?,
            possession_team: row.try_get_column("segment_possession_team")?,
            start_clock: read_clock(row, "segment_start_clock")?,
            end_clock: read_clock(row, "segment_end_clock")?,
            start_field: read_field_pos(row, "segment_start_field")?,
            end_field: read_field_pos(row, "segment_end_field")?,
            action_count: row.try_get_column("segment_action_count")?,
            yards_penalized: row.try_get_column("segment_yards_penalized")?,
            result: row.try_get_column("segment_result")?,
            time_inserted: row.try_get_column("segment_time_inserted")?,
            time_updated: row.try_get_column("segment_time_updated")?,
            event: None,
            actions: None,
        })
    }
}

// ─── Action ─────────────────────────────────────────────────────────────────

/// A play-like atomic occurrence. Its per-action statistics live on the
/// `action` table; per-participant rollups come from the `action_stat`
/// view, merged into the same sparse map (the two category scopes are
/// disjoint by construction).
#[derive(Clone, Debug, Default, Serialize)]
pub struct Action {
    pub event_id: String,
    pub segment_id: i32,
    pub action_id: i32,
    pub period: i16,
    pub clock: Option<Clock>,
    pub down: Option<i16>,
    pub yards_to_go: Option<i16>,
    pub yardline: Option<FieldPos>,
    pub description: Option<String>,
    pub stats: Statistics,
    pub time_inserted: Option<DateTime<Utc>>,
    pub time_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    segment: Option<Box<Segment>>,
    #[serde(skip)]
    participant_actions: Option<Vec<ParticipantAction>>,
}

impl Action {
    pub fn offense_yds(&self) -> i32 {
        self.stats.derived_sum("offense_yds")
    }

    pub fn offense_tds(&self) -> i32 {
        self.stats.derived_sum("offense_tds")
    }

    pub fn defense_tds(&self) -> i32 {
        self.stats.derived_sum("defense_tds")
    }

    pub fn points(&self) -> i32 {
        self.stats.points()
    }

    pub async fn by_pk(
        conn: &impl GenericClient,
        event_id: &str,
        segment_id: i32,
        action_id: i32,
    ) -> StoreResult<Action> {
        let sql = by_pk_sql(EntityKind::Action)?;
        let row = conn
            .query_one(&sql, &[&event_id, &segment_id, &action_id])
            .await?;
        Action::from_row(&row)
    }

    /// The owning segment, fetched on first access.
    pub async fn segment(&mut self, conn: &impl GenericClient) -> StoreResult<&Segment> {
        if self.segment.is_none() {
            let seg = Segment::by_pk(conn, &self.event_id, self.segment_id).await?;
            self.segment = Some(Box::new(seg));
        }
        Ok(self.segment.as_deref().expect("filled above"))
    }

    /// This action's participant stat lines, fetched on first access
    /// unless already filled by `as_actions` or `eager::fill_participant_actions`.
    pub async fn participant_actions(
        &mut self,
        conn: &impl GenericClient,
    ) -> StoreResult<&[ParticipantAction]> {
        if self.participant_actions.is_none() {
            let sql = format!(
                "SELECT {} {} WHERE participant_action.event_id = $1 \
                 AND participant_action.segment_id = $2 \
                 AND participant_action.action_id = $3 \
                 ORDER BY participant_action.participant_id ASC",
                field::select_list(EntityKind::ParticipantAction, None)?,
                join::from_clause(EntityKind::ParticipantAction, None)?,
            );
            let rows = conn
                .query(&sql, &[&self.event_id, &self.segment_id, &self.action_id])
                .await?;
            self.participant_actions = Some(
                rows.iter()
                    .map(ParticipantAction::from_row)
                    .collect::<StoreResult<_>>()?,
            );
        }
        Ok(self.participant_actions.as_deref().expect("filled above"))
    }

    pub fn participant_actions_filled(&self) -> Option<&[ParticipantAction]> {
        self.participant_actions.as_deref()
    }

    pub(crate) fn set_participant_actions(&mut self, rows: Vec<ParticipantAction>) {
        self.participant_actions = Some(rows);
    }

    pub(crate) fn set_segment(&mut self, segment: Segment) {
        self.segment = Some(Box::new(segment));
    }

    pub async fn save(&self, conn: &impl GenericClient) -> StoreResult<()> {
        let mut data: Vec<&str> = vec![
            "period",
            "clock",
            "down",
            "yards_to_go",
            "yardline",
            "description",
        ];
        data.extend_from_slice(crate::stats::ACTION_STATS);
        let sql = upsert_sql(
            "action",
            &["event_id", "segment_id", "action_id"],
            &data,
            true,
        );

        let mut params = ParamList::new();
        params.push(self.event_id.clone());
        params.push(self.segment_id);
        params.push(self.action_id);
        params.push(self.period);
        params.push(self.clock.map(|c| c.game_seconds()));
        params.push(self.down);
        params.push(self.yards_to_go);
        params.push(self.yardline.map(|p| p.offset()));
        params.push(self.description.clone());
        for stat in crate::stats::ACTION_STATS {
            params.push(self.stats.get(stat));
        }
        conn.execute(&sql, &params.as_refs()).await?;
        Ok(())
    }
}

impl FromRow for Action {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Action {
            event_id: row.try_get_column("action_event_id")?,
            segment_id: row.try_get_column("action_segment_id")?,
            action_id: row.try_get_column("action_action_id")?,
            period: row.try_get_column("action_period")?,
            clock: read_clock(row, "action_clock")?,
            down: row.try_get_column("action_down")?,
            yards_to_go: row.try_get_column("action_yards_to_go")?,
            yardline: read_field_pos(row, "action_yardline")?,
            description: row.try_get_column("action_description")?,
            stats: read_stats(row, EntityKind::Action)?,
            time_inserted: row.try_get_column("action_time_inserted")?,
            time_updated: row.try_get_column("action_time_updated")?,
            segment: None,
            participant_actions: None,
        })
    }
}

// ─── ParticipantAction ──────────────────────────────────────────────────────

/// One participant's stat line for one action. Aggregate results reuse this
/// type with the containment keys unset.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ParticipantAction {
    pub event_id: Option<String>,
    pub segment_id: Option<i32>,
    pub action_id: Option<i32>,
    pub participant_id: String,
    pub team: Option<String>,
    pub stats: Statistics,
    pub time_inserted: Option<DateTime<Utc>>,
    pub time_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    participant: Option<Box<Participant>>,
}

impl ParticipantAction {
    pub fn offense_yds(&self) -> i32 {
        self.stats.derived_sum("offense_yds")
    }

    pub fn offense_tds(&self) -> i32 {
        self.stats.derived_sum("offense_tds")
    }

    pub fn defense_tds(&self) -> i32 {
        self.stats.derived_sum("defense_tds")
    }

    pub fn points(&self) -> i32 {
        self.stats.points()
    }

    /// The participant profile, fetched on first access.
    pub async fn participant(&mut self, conn: &impl GenericClient) -> StoreResult<&Participant> {
        if self.participant.is_none() {
            let p = Participant::by_pk(conn, &self.participant_id).await?;
            self.participant = Some(Box::new(p));
        }
        Ok(self.participant.as_deref().expect("filled above"))
    }

    /// The owning action. Errors on aggregate rows, which carry no
    /// containment keys.
    pub async fn action(&mut self, conn: &impl GenericClient) -> StoreResult<Action> {
        let (Some(event_id), Some(segment_id), Some(action_id)) =
            (&self.event_id, self.segment_id, self.action_id)
        else {
            return Err(StoreError::Other(
                "aggregate stat line has no owning action".to_string(),
            ));
        };
        Action::by_pk(conn, event_id, segment_id, action_id).await
    }

    pub(crate) fn set_participant(&mut self, participant: Participant) {
        self.participant = Some(Box::new(participant));
    }

    pub async fn save(&self, conn: &impl GenericClient) -> StoreResult<()> {
        let (Some(event_id), Some(segment_id), Some(action_id)) =
            (&self.event_id, self.segment_id, self.action_id)
        else {
            return Err(StoreError::Other(
                "cannot save a stat line without its containment keys".to_string(),
            ));
        };

        let mut data: Vec<&str> = vec!["team"];
        data.extend_from_slice(crate::stats::PARTICIPANT_STATS);
        let sql = upsert_sql(
            "participant_action",
            &["event_id", "segment_id", "action_id", "participant_id"],
            &data,
            true,
        );

        let mut params = ParamList::new();
        params.push(event_id.clone());
        params.push(segment_id);
        params.push(action_id);
        params.push(self.participant_id.clone());
        params.push(self.team.clone());
        for stat in crate::stats::PARTICIPANT_STATS {
            params.push(self.stats.get(stat));
        }
        conn.execute(&sql, &params.as_refs()).await?;
        Ok(())
    }
}

impl FromRow for ParticipantAction {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(ParticipantAction {
            event_id: row.get_column_opt("participant_action_event_id")?,
            segment_id: row.get_column_opt("participant_action_segment_id")?,
            action_id: row.get_column_opt("participant_action_action_id")?,
            participant_id: row.try_get_column("participant_action_participant_id")?,
            team: row.get_column_opt("participant_action_team")?,
            stats: read_stats(row, EntityKind::ParticipantAction)?,
            time_inserted: row.get_column_opt("participant_action_time_inserted")?,
            time_updated: row.get_column_opt("participant_action_time_updated")?,
            participant: None,
        })
    }
}

// ─── Participant ────────────────────────────────────────────────────────────

/// A person/profile, loosely linked to the containment chain: no foreign
/// key reaches it except through `participant_action`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Participant {
    pub participant_id: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub team: Option<String>,
    pub position: Option<String>,
    pub uniform_number: Option<i16>,
    pub status: Option<String>,
    pub height: Option<i16>,
    pub weight: Option<i16>,
    pub college: Option<String>,
    pub years_pro: Option<i16>,
}

impl Participant {
    pub async fn by_pk(conn: &impl GenericClient, participant_id: &str) -> StoreResult<Participant> {
        let sql = by_pk_sql(EntityKind::Participant)?;
        let row = conn.query_one(&sql, &[&participant_id]).await?;
        Participant::from_row(&row)
    }

    pub async fn save(&self, conn: &impl GenericClient) -> StoreResult<()> {
        let data = [
            "full_name",
            "first_name",
            "last_name",
            "team",
            "position",
            "uniform_number",
            "status",
            "height",
            "weight",
            "college",
            "years_pro",
        ];
        let sql = upsert_sql("participant", &["participant_id"], &data, false);
        conn.execute(
            &sql,
            &[
                &self.participant_id,
                &self.full_name,
                &self.first_name,
                &self.last_name,
                &self.team,
                &self.position,
                &self.uniform_number,
                &self.status,
                &self.height,
                &self.weight,
                &self.college,
                &self.years_pro,
            ],
        )
        .await?;
        Ok(())
    }
}

impl FromRow for Participant {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Participant {
            participant_id: row.try_get_column("participant_participant_id")?,
            full_name: row.try_get_column("participant_full_name")?,
            first_name: row.try_get_column("participant_first_name")?,
            last_name: row.try_get_column("participant_last_name")?,
            team: row.try_get_column("participant_team")?,
            position: row.try_get_column("participant_position")?,
            uniform_number: row.try_get_column("participant_uniform_number")?,
            status: row.try_get_column("participant_status")?,
            height: row.try_get_column("participant_height")?,
            weight: row.try_get_column("participant_weight")?,
            college: row.try_get_column("participant_college")?,
            years_pro: row.try_get_column("participant_years_pro")?,
        })
    }
}

// ─── Team ───────────────────────────────────────────────────────────────────

/// Reference/lookup entity for team metadata. Not part of the queryable
/// entity graph; served out of [`crate::cache::TeamCache`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct Team {
    pub team_id: String,
    pub city: String,
    pub name: String,
}

impl Team {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.city, self.name)
    }
}

impl FromRow for Team {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Team {
            team_id: row.try_get_column("team_id")?,
            city: row.try_get_column("city")?,
            name: row.try_get_column("name")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_round_trips_through_game_seconds() {
        let clock = Clock::new(3, 145);
        assert_eq!(clock.game_seconds(), 1945);
        assert_eq!(Clock::from_game_seconds(1945), clock);
        assert_eq!(Clock::from_game_seconds(0), Clock::new(1, 0));
    }

    #[test]
    fn winner_is_none_on_tie() {
        let mut event = Event {
            home_team: "HOME".to_string(),
            away_team: "AWAY".to_string(),
            home_score: 21,
            away_score: 21,
            ..Event::default()
        };
        assert_eq!(event.winner(), None);
        assert_eq!(event.loser(), None);
        event.home_score = 24;
        assert_eq!(event.winner(), Some("HOME"));
        assert_eq!(event.loser(), Some("AWAY"));
    }

    #[test]
    fn event_date_is_the_id_prefix() {
        let event = Event {
            event_id: "2024090800".to_string(),
            ..Event::default()
        };
        assert_eq!(event.event_date(), "20240908");
    }

    #[test]
    fn derived_accessors_follow_the_stats_map() {
        let mut pa = ParticipantAction::default();
        pa.stats.set("rushing_yds", 40).unwrap();
        pa.stats.set("rushing_tds", 1).unwrap();
        assert_eq!(pa.offense_yds(), 40);
        assert_eq!(pa.offense_tds(), 1);
        assert_eq!(pa.defense_tds(), 0);
        assert_eq!(pa.points(), 6);
    }

    #[test]
    fn entities_serialize_without_lazy_fields() {
        let mut pa = ParticipantAction {
            participant_id: "00-0023459".to_string(),
            ..ParticipantAction::default()
        };
        pa.stats.set("passing_yds", 40).unwrap();
        let json = serde_json::to_value(&pa).unwrap();
        assert_eq!(json["participant_id"], "00-0023459");
        assert_eq!(json["stats"]["passing_yds"], 40);
        assert!(json.get("participant").is_none());
    }

    #[test]
    fn upsert_sql_shape() {
        let sql = upsert_sql("event", &["event_id"], &["week", "home_score"], true);
        assert_eq!(
            sql,
            "INSERT INTO event (event_id, week, home_score, time_inserted, time_updated) \
             VALUES ($1, $2, $3, NOW(), NOW()) \
             ON CONFLICT (event_id) DO UPDATE SET week = EXCLUDED.week, \
             home_score = EXCLUDED.home_score, time_updated = NOW()"
        );
    }

    #[test]
    fn unstamped_upsert_leaves_audit_columns_out() {
        let sql = upsert_sql("participant", &["participant_id"], &["full_name"], false);
        assert!(!sql.contains("time_inserted"));
        assert!(!sql.contains("NOW()"));
    }

    #[test]
    fn by_pk_sql_filters_on_the_full_key() {
        let sql = by_pk_sql(EntityKind::Action).unwrap();
        assert!(sql.contains(
            "WHERE action.event_id = $1 AND action.segment_id = $2 AND action.action_id = $3"
        ));
        assert!(sql.contains("LEFT JOIN action_stat"));
    }
}
