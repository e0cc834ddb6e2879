use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{format_ts, parse_ts};
use crate::db::DatabaseError;
use crate::models::{ResultSource, Scan};

pub fn insert_scan(conn: &Connection, scan: &Scan) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO scans (scan_id, photo_url, scan_result, confidence, result_source, scan_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            scan.scan_id,
            scan.photo_url,
            scan.scan_result,
            scan.confidence,
            scan.result_source.as_str(),
            format_ts(&scan.scan_date),
        ],
    )?;
    Ok(())
}

pub fn get_scan(conn: &Connection, scan_id: &str) -> Result<Option<Scan>, DatabaseError> {
    let result = conn.query_row(
        "SELECT scan_id, photo_url, scan_result, confidence, result_source, scan_date
         FROM scans WHERE scan_id = ?1",
        params![scan_id],
        scan_from_row,
    );

    match result {
        Ok(scan) => Ok(Some(scan)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All scans, newest first.
pub fn get_all_scans(conn: &Connection) -> Result<Vec<Scan>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT scan_id, photo_url, scan_result, confidence, result_source, scan_date
         FROM scans ORDER BY scan_date DESC, scan_id DESC",
    )?;
    let rows = stmt.query_map([], scan_from_row)?;

    let mut scans = Vec::new();
    for row in rows {
        scans.push(row?);
    }
    Ok(scans)
}

/// The caller's most recent scan, located by the photo-reference naming
/// convention (`scan-<uid>` embedded in the photo URL).
pub fn latest_scan_for_user(
    conn: &Connection,
    uid: &str,
) -> Result<Option<Scan>, DatabaseError> {
    let marker = format!("scan-{uid}");
    let scans = get_all_scans(conn)?;
    Ok(scans.into_iter().find(|s| s.photo_url.contains(&marker)))
}

/// Legacy single-field correction path. Scans are otherwise immutable.
pub fn update_scan_result(
    conn: &Connection,
    scan_id: &str,
    scan_result: bool,
) -> Result<Option<Scan>, DatabaseError> {
    let changed = conn.execute(
        "UPDATE scans SET scan_result = ?1 WHERE scan_id = ?2",
        params![scan_result, scan_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_scan(conn, scan_id)
}

fn scan_from_row(row: &rusqlite::Row<'_>) -> Result<Scan, rusqlite::Error> {
    let source: String = row.get(4)?;
    Ok(Scan {
        scan_id: row.get(0)?,
        photo_url: row.get(1)?,
        scan_result: row.get(2)?,
        confidence: row.get(3)?,
        result_source: ResultSource::from_str(&source).unwrap_or(ResultSource::Model),
        scan_date: parse_ts(&row.get::<_, String>(5)?),
    })
}
