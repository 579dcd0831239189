//! LanceDB connection and housekeeping helpers.
//!
//! Every artifact (worker part, merged corpus, index) is its own Lance database
//! directory. Writers fill a `<dir>.tmp` staging directory and swap it in only
//! once everything is written, so readers never see a half-written artifact.
use anyhow::{Result, anyhow};
use lancedb::{connect, Connection};
use lancedb::query::ExecutableQuery;

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use chrono::Utc;

use crate::schema::{build_meta_schema, META_TABLE};

pub async fn open_db(path: &Path) -> Result<Connection> {
    Ok(connect(path.to_string_lossy().as_ref()).execute().await?)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    let names = conn.table_names().execute().await?;
    if names.contains(&name.to_string()) {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(Vec::<Result<RecordBatch, arrow_schema::ArrowError>>::new().into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Write all key/value pairs into a fresh `meta` table.
pub async fn write_meta(conn: &Connection, entries: &[(&str, String)]) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(entries.iter().map(|(k, _)| (*k).to_string()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    conn.create_table(META_TABLE, reader).execute().await?;
    Ok(())
}

pub async fn read_meta(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let names = conn.table_names().execute().await?;
    if !names.contains(&META_TABLE.to_string()) { return Err(anyhow!("meta table missing")); }
    let t = conn.open_table(META_TABLE).execute().await?;
    let mut out = BTreeMap::new();
    let mut stream = t.query().execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        let keys = batch.column_by_name("key").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("meta.key column missing"))?;
        let vals = batch.column_by_name("value").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("meta.value column missing"))?;
        for i in 0..batch.num_rows() { out.insert(keys.value(i).to_string(), vals.value(i).to_string()); }
    }
    Ok(out)
}

pub fn meta_value<T>(meta: &BTreeMap<String, String>, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = meta.get(key).ok_or_else(|| anyhow!("meta key '{}' missing", key))?;
    raw.parse::<T>().map_err(|e| anyhow!("meta key '{}' = '{}': {}", key, raw, e))
}

/// Sibling staging directory for `dir`, emptied and ready to write.
pub fn staging_dir(dir: &Path) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| anyhow!("artifact path {} has no file name", dir.display()))?;
    let staging = dir.with_file_name(format!("{}.tmp", name.to_string_lossy()));
    if staging.exists() { std::fs::remove_dir_all(&staging)?; }
    if let Some(parent) = staging.parent() { std::fs::create_dir_all(parent)?; }
    Ok(staging)
}

/// Replace `dir` with the fully written `staging` directory.
pub fn commit_staging(staging: &Path, dir: &Path) -> Result<()> {
    if dir.exists() { std::fs::remove_dir_all(dir)?; }
    std::fs::rename(staging, dir)?;
    Ok(())
}
