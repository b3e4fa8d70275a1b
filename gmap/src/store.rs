use crate::entity::bandwidth;
use crate::error::Result;
use crate::rate::{self, Direction, Rate};
use chrono::{NaiveDateTime, TimeDelta};
use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, Statement,
};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS bandwidth (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        link INTEGER NOT NULL,
        time REAL NOT NULL,
        rx INTEGER NOT NULL,
        tx INTEGER NOT NULL,
        update_date DATETIME NOT NULL
    )
"#;

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_bandwidth_link_update ON bandwidth (link, update_date)";

/// A counter report as received from a link agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReport {
    pub link: i64,
    pub time: f64,
    pub rx: i64,
    pub tx: i64,
}

/// Raw counters of one report, as plotted on the traffic chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traffic {
    pub rx: i64,
    pub tx: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub link_alive_interval: TimeDelta,
    pub traffic_max_values: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            link_alive_interval: TimeDelta::seconds(5),
            traffic_max_values: 200,
        }
    }
}

/// Repository of bandwidth reports over an injected database handle.
pub struct BandwidthStore {
    db: DatabaseConnection,
    settings: StoreSettings,
}

impl BandwidthStore {
    /// Open (or create) the SQLite file at `database_path`.
    #[instrument(skip(database_path, settings))]
    pub async fn connect<P: AsRef<Path>>(database_path: P, settings: StoreSettings) -> Result<Self> {
        let database_path = database_path.as_ref();

        if let Some(parent) = database_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let db = Database::connect(&database_url).await?;
        let store = Self::new(db, settings).await?;

        info!("Connected to SQLite database: {}", database_path.display());
        Ok(store)
    }

    /// Wrap an existing connection, creating the schema if needed.
    pub async fn new(db: DatabaseConnection, settings: StoreSettings) -> Result<Self> {
        let backend = db.get_database_backend();
        db.execute(Statement::from_string(backend, CREATE_TABLE_SQL.to_string()))
            .await?;
        db.execute(Statement::from_string(backend, CREATE_INDEX_SQL.to_string()))
            .await?;
        Ok(Self { db, settings })
    }

    /// Store a report stamped with the current time.
    ///
    /// Returns `false` without touching the database when both counters are zero.
    pub async fn record(&self, report: NewReport) -> Result<bool> {
        self.record_at(report, common::utc_now()).await
    }

    #[instrument(skip(self))]
    pub async fn record_at(&self, report: NewReport, update_date: NaiveDateTime) -> Result<bool> {
        if report.rx == 0 && report.tx == 0 {
            debug!("Dropping empty report for link {}", report.link);
            return Ok(false);
        }

        let row = bandwidth::ActiveModel {
            link: Set(report.link),
            time: Set(report.time),
            rx: Set(report.rx),
            tx: Set(report.tx),
            update_date: Set(update_date),
            ..Default::default()
        };
        bandwidth::Entity::insert(row).exec(&self.db).await?;
        Ok(true)
    }

    /// The `limit` newest reports of `link`, newest first.
    #[instrument(skip(self))]
    pub async fn latest(&self, link: i64, limit: u64) -> Result<Vec<bandwidth::Model>> {
        let rows = bandwidth::Entity::find()
            .filter(bandwidth::Column::Link.eq(link))
            .order_by_desc(bandwidth::Column::UpdateDate)
            .order_by_desc(bandwidth::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// The `limit` newest reports of `link`, oldest first.
    pub async fn history(&self, link: i64, limit: u64) -> Result<Vec<bandwidth::Model>> {
        let mut rows = self.latest(link, limit).await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn rate(&self, link: i64) -> Result<Rate> {
        self.rate_at(link, common::utc_now()).await
    }

    /// Current rate of `link` as seen at `now`.
    pub async fn rate_at(&self, link: i64, now: NaiveDateTime) -> Result<Rate> {
        let latest = self.latest(link, 2).await?;
        Ok(rate::current_rate(
            &latest,
            now,
            self.settings.link_alive_interval,
        ))
    }

    /// Sliding-window rates of one direction over the recent history of `link`.
    pub async fn rates(&self, direction: Direction, link: i64, window_len: usize) -> Result<Vec<f64>> {
        let history = self.history(link, self.settings.traffic_max_values).await?;
        Ok(rate::windowed_rates(&history, direction, window_len))
    }

    /// Raw counters of the recent history of `link`, oldest first.
    pub async fn traffic(&self, link: i64) -> Result<Vec<Traffic>> {
        let history = self.history(link, self.settings.traffic_max_values).await?;
        Ok(history
            .into_iter()
            .map(|row| Traffic {
                rx: row.rx,
                tx: row.tx,
            })
            .collect())
    }
}
