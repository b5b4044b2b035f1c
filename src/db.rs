use std::{fs, path::Path};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::config;
use crate::models::{Coordinates, EventRecord};

const DATABASE_FILE: &str = "events.sqlite";

pub struct Store {
    conn: Connection,
}

/// A stored event that can be placed on a map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPin {
    pub id: i64,
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDetail {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub venue: Option<String>,
    pub address: Option<String>,
    pub organizer: Option<String>,
    pub ticket_price: Option<String>,
    pub ticket_url: Option<String>,
    pub categories: Option<Vec<String>>,
    pub lat: f64,
    pub long: f64,
}

impl Store {
    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(&config::data_root().join(DATABASE_FILE))
    }

    /// Opens (creating if needed) the database at `path` and its parent directory.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("unable to open database {}", path.display()))?;
        Ok(Self::from_connection(conn)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_key TEXT NOT NULL UNIQUE,
                source_event_id TEXT NOT NULL,
                name TEXT,
                description TEXT,
                url TEXT NOT NULL,
                source_url TEXT NOT NULL,
                start_date TEXT,
                start_time TEXT,
                venue TEXT,
                address TEXT,
                organizer TEXT,
                ticket_price TEXT,
                ticket_url TEXT,
                categories TEXT,
                city TEXT NOT NULL,
                source TEXT NOT NULL,
                lat REAL,
                long REAL,
                last_updated TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Inserts or refreshes a record by `event_key`; coordinates already set are kept.
    pub fn upsert_event(&self, event: &EventRecord) -> rusqlite::Result<i64> {
        let categories = event
            .categories
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        self.conn.query_row(
            "INSERT INTO events (event_key, source_event_id, name, description, url, source_url,
                start_date, start_time, venue, address, organizer, ticket_price, ticket_url,
                categories, city, source, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(event_key) DO UPDATE SET
               name = excluded.name,
               description = excluded.description,
               url = excluded.url,
               source_url = excluded.source_url,
               start_date = excluded.start_date,
               start_time = excluded.start_time,
               venue = excluded.venue,
               address = excluded.address,
               organizer = excluded.organizer,
               ticket_price = excluded.ticket_price,
               ticket_url = excluded.ticket_url,
               categories = excluded.categories,
               last_updated = excluded.last_updated
             RETURNING id",
            params![
                event.event_key,
                event.event_id,
                event.event_name,
                event.description,
                event.event_url,
                event.source_url,
                event.start_date,
                event.start_time,
                event.venue_name,
                event.venue_address,
                event.organizer_name,
                event.ticket_price,
                event.ticket_url,
                categories,
                event.city,
                event.source,
                event.last_updated,
            ],
            |row| row.get(0),
        )
    }

    /// Records the geocoding result for an event. Returns `false` for an unknown key.
    pub fn set_coordinates(&self, event_key: &str, coords: Coordinates) -> rusqlite::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE events SET lat = ?2, long = ?3 WHERE event_key = ?1",
            params![event_key, coords.lat, coords.long],
        )?;
        Ok(changed > 0)
    }

    /// Events that have a name and coordinates.
    pub fn list_mappable(&self) -> rusqlite::Result<Vec<MapPin>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, lat, long FROM events
             WHERE lat IS NOT NULL AND long IS NOT NULL AND name IS NOT NULL
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MapPin {
                id: row.get(0)?,
                lat: row.get(1)?,
                long: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    /// Full detail for one event under the same name/coordinates precondition.
    pub fn event_detail(&self, id: i64) -> rusqlite::Result<Option<EventDetail>> {
        self.conn
            .query_row(
                "SELECT id, name, description, url, start_date, start_time, venue, address,
                        organizer, ticket_price, ticket_url, categories, lat, long
                 FROM events
                 WHERE id = ?1 AND lat IS NOT NULL AND long IS NOT NULL AND name IS NOT NULL",
                params![id],
                detail_from_row,
            )
            .optional()
    }
}

fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<EventDetail> {
    let categories: Option<String> = row.get(11)?;
    let categories = categories
        .map(|raw| {
            serde_json::from_str::<Vec<String>>(&raw).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    raw.len(),
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()?;
    Ok(EventDetail {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        url: row.get(3)?,
        start_date: row.get(4)?,
        start_time: row.get(5)?,
        venue: row.get(6)?,
        address: row.get(7)?,
        organizer: row.get(8)?,
        ticket_price: row.get(9)?,
        ticket_url: row.get(10)?,
        categories,
        lat: row.get(12)?,
        long: row.get(13)?,
    })
}
