// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the conversation, memory, and attachment stores.

pub mod attachments;
pub mod conversations;
pub mod memory;
pub mod messages;

use std::str::FromStr;

use parley_core::ParleyError;
use rusqlite::types::Type;
use serde_json::Value;

use crate::database::TxError;

/// Read a TEXT column into a strum-backed enum.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable TEXT column into a strum-backed enum.
pub(crate) fn optional_enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        T::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a nullable JSON TEXT column.
pub(crate) fn json_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Serialize an optional JSON value for a TEXT column.
pub(crate) fn json_text(value: Option<&Value>) -> Option<String> {
    value.map(Value::to_string)
}

/// Whether a row with `id` exists in `table`. `table` is always a literal.
pub(crate) fn exists(conn: &rusqlite::Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?1)"),
        [id],
        |row| row.get(0),
    )
}

/// `NotFound` unless the conversation exists.
pub(crate) fn ensure_conversation(
    conn: &rusqlite::Connection,
    conversation_id: &str,
) -> Result<(), TxError> {
    if exists(conn, "conversations", conversation_id)? {
        Ok(())
    } else {
        Err(ParleyError::not_found("conversation", conversation_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_conversation_reports_missing_id() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE conversations (id TEXT PRIMARY KEY);
             INSERT INTO conversations (id) VALUES ('c1');",
        )
        .unwrap();

        assert!(ensure_conversation(&conn, "c1").is_ok());
        assert!(matches!(
            ensure_conversation(&conn, "c2"),
            Err(TxError::Domain(ParleyError::NotFound { .. }))
        ));
    }
}
