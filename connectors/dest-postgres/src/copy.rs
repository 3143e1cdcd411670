//! COPY FROM STDIN load path for staging tables.

use bytes::Bytes;
use futures_util::SinkExt;
use pg_escape::quote_identifier;
use tokio_postgres::Client;
use tracing::debug;

use crate::client::format_pg_error;

/// Rows per committed COPY transaction.
pub const DEFAULT_CHUNK_ROWS: usize = 5000;

/// Append one value in COPY text format.
///
/// NULL is `\N`; backslash, tab, newline, and carriage return are
/// backslash-escaped; NUL bytes are stripped.
pub(crate) fn write_copy_value(buf: &mut Vec<u8>, value: Option<&str>) {
    let Some(value) = value else {
        buf.extend_from_slice(b"\\N");
        return;
    };
    for &b in value.as_bytes() {
        match b {
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            0 => {}
            _ => buf.push(b),
        }
    }
}

pub(crate) fn encode_rows(rows: &[Vec<Option<String>>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(rows.len() * 128);
    for row in rows {
        for (pos, value) in row.iter().enumerate() {
            if pos > 0 {
                buf.push(b'\t');
            }
            write_copy_value(&mut buf, value.as_deref());
        }
        buf.push(b'\n');
    }
    buf
}

async fn copy_chunk(client: &Client, copy_stmt: &str, rows: &[Vec<Option<String>>]) -> Result<u64, String> {
    let sink = client
        .copy_in(copy_stmt)
        .await
        .map_err(|e| format_pg_error("COPY start failed", &e))?;
    let mut sink = Box::pin(sink);
    sink.send(Bytes::from(encode_rows(rows)))
        .await
        .map_err(|e| format_pg_error("COPY send failed", &e))?;
    sink.as_mut()
        .finish()
        .await
        .map_err(|e| format_pg_error("COPY finish failed", &e))
}

/// COPY `rows` into `qualified_table`, committing every `chunk_rows` rows.
///
/// Returns `(rows_written, chunks_committed)`.
pub(crate) async fn copy_rows<'a, I>(
    client: &Client,
    qualified_table: &str,
    columns: I,
    rows: &[Vec<Option<String>>],
    chunk_rows: usize,
) -> Result<(u64, usize), String>
where
    I: IntoIterator<Item = &'a str>,
{
    if rows.is_empty() {
        return Ok((0, 0));
    }

    let col_list = columns
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ");
    let copy_stmt = format!("COPY {qualified_table} ({col_list}) FROM STDIN WITH (FORMAT text)");

    let mut total: u64 = 0;
    let mut chunks = 0;
    for chunk in rows.chunks(chunk_rows.max(1)) {
        client
            .execute("BEGIN", &[])
            .await
            .map_err(|e| format_pg_error("COPY BEGIN failed", &e))?;
        let written = match copy_chunk(client, &copy_stmt, chunk).await {
            Ok(n) => n,
            Err(e) => {
                let _ = client.execute("ROLLBACK", &[]).await;
                return Err(e);
            }
        };
        if let Err(e) = client.execute("COMMIT", &[]).await {
            let _ = client.execute("ROLLBACK", &[]).await;
            return Err(format_pg_error("COPY COMMIT failed", &e));
        }
        total += written;
        chunks += 1;
        debug!(chunk = chunks, rows = written, total, "committed COPY chunk");
    }
    Ok((total, chunks))
}
