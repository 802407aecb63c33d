use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row, ToSql};

use crate::config::Config;
use crate::error::{RowSourceError, RowSourceResult};
use crate::model::{
    Candidate, CandidateFilter, Developer, Disease, Page, Phase, Priority, Product, Snapshot,
    SummaryBucket, SummaryDimension, Technology,
};
use crate::row_source::{Dataset, RowSource};

/// Tables and indexes of the pipeline data file.
pub const SCHEMA_SQL: &str = "
CREATE TABLE dim_product(
    product_key INTEGER PRIMARY KEY,
    product_name TEXT NOT NULL,
    product_category TEXT NOT NULL
);
CREATE TABLE dim_developer(
    developer_key INTEGER PRIMARY KEY,
    developer_name TEXT NOT NULL,
    developer_type TEXT NOT NULL,
    country TEXT
);
CREATE TABLE dim_technology(
    technology_key INTEGER PRIMARY KEY,
    technology_name TEXT NOT NULL,
    platform TEXT
);
CREATE TABLE dim_disease(
    disease_key TEXT PRIMARY KEY,
    disease_name TEXT NOT NULL,
    global_health_area TEXT NOT NULL
);
CREATE TABLE dim_phase(
    phase_key INTEGER PRIMARY KEY,
    phase_name TEXT NOT NULL,
    sort_order INTEGER NOT NULL
);
CREATE TABLE dim_priority(
    priority_key INTEGER PRIMARY KEY,
    disease_key TEXT NOT NULL,
    priority_name TEXT NOT NULL,
    source TEXT NOT NULL
);
CREATE TABLE dim_candidate(
    candidate_key INTEGER PRIMARY KEY,
    vin_candidate_code TEXT NOT NULL,
    candidate_name TEXT NOT NULL,
    product_key INTEGER,
    disease_key TEXT,
    latest_snapshot_key INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE fact_pipeline_snapshot(
    snapshot_key INTEGER PRIMARY KEY,
    candidate_key INTEGER NOT NULL,
    disease_key TEXT NOT NULL,
    phase_key INTEGER NOT NULL,
    snapshot_year INTEGER NOT NULL
);
CREATE TABLE bridge_candidate_developer(
    candidate_key INTEGER NOT NULL,
    developer_key INTEGER NOT NULL,
    PRIMARY KEY (candidate_key, developer_key)
);
CREATE TABLE bridge_candidate_technology(
    candidate_key INTEGER NOT NULL,
    technology_key INTEGER NOT NULL,
    PRIMARY KEY (candidate_key, technology_key)
);
CREATE INDEX idx_snapshot_candidate ON fact_pipeline_snapshot(candidate_key);
CREATE INDEX idx_priority_disease ON dim_priority(disease_key);
CREATE INDEX idx_candidate_disease ON dim_candidate(disease_key);
";

/// Keys per `IN (...)` statement; larger key lists are split across statements.
const MAX_KEYS_PER_STATEMENT: usize = 500;

const CANDIDATE_COLUMNS: &str = "c.candidate_key, c.vin_candidate_code, c.candidate_name, \
     c.product_key, c.disease_key, c.latest_snapshot_key, c.is_active";

/// Identity of one version of the data file. An atomic replace changes the inode; an in-place
/// rewrite changes length or modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeToken {
    dev: u64,
    ino: u64,
    len: u64,
    modified: Option<SystemTime>,
}

impl ChangeToken {
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        #[cfg(unix)]
        let (dev, ino) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.dev(), metadata.ino())
        };
        #[cfg(not(unix))]
        let (dev, ino) = (0, 0);
        Ok(Self { dev, ino, len: metadata.len(), modified: metadata.modified().ok() })
    }
}

struct DataFileHandle {
    token: ChangeToken,
    conn: Mutex<Connection>,
}

/// Row source over the read-only SQLite data file.
///
/// The file is produced elsewhere and replaced atomically (write + rename). Every call compares
/// the file's [`ChangeToken`] with the one the open connection was created for and reopens on
/// mismatch, so a swap is picked up by the next call and never served from the old handle.
pub struct SqliteRowSource {
    path: PathBuf,
    cache_kib: i64,
    mmap_bytes: i64,
    current: Mutex<Option<Arc<DataFileHandle>>>,
}

impl SqliteRowSource {
    /// Opens the data file. Fails if it cannot be read.
    pub fn open(
        path: impl Into<PathBuf>,
        cache_kib: i64,
        mmap_bytes: i64,
    ) -> RowSourceResult<Self> {
        let source = Self { path: path.into(), cache_kib, mmap_bytes, current: Mutex::new(None) };
        source.handle()?;
        Ok(source)
    }

    pub fn from_config(config: &Config) -> RowSourceResult<Self> {
        Self::open(&config.data_file, config.sqlite_cache_kib, config.sqlite_mmap_bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token of the file version the current connection reads, if one is open.
    pub fn current_token(&self) -> Option<ChangeToken> {
        self.current.lock().as_ref().map(|handle| handle.token)
    }

    fn unavailable(&self, message: impl ToString) -> RowSourceError {
        RowSourceError::Unavailable {
            path: self.path.display().to_string(),
            message: message.to_string(),
        }
    }

    fn handle(&self) -> RowSourceResult<Arc<DataFileHandle>> {
        let token = ChangeToken::read(&self.path).map_err(|e| self.unavailable(e))?;
        let mut current = self.current.lock();
        if let Some(handle) = current.as_ref() {
            if handle.token == token {
                return Ok(Arc::clone(handle));
            }
            tracing::info!(path = %self.path.display(), "data file changed; reopening");
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| self.unavailable(e))?;
        conn.execute_batch(&format!(
            "PRAGMA query_only=ON; PRAGMA temp_store=MEMORY; \
             PRAGMA cache_size=-{}; PRAGMA mmap_size={};",
            self.cache_kib, self.mmap_bytes,
        ))
        .map_err(|e| self.unavailable(e))?;
        let handle = Arc::new(DataFileHandle { token, conn: Mutex::new(conn) });
        *current = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Runs `f` on the connection of the current file version. Everything `f` reads comes from
    /// that one version, even if the file is swapped meanwhile.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> RowSourceResult<T> {
        let handle = self.handle()?;
        let conn = handle.conn.lock();
        Ok(f(&conn)?)
    }

    fn query_in<K, T>(
        &self,
        sql_template: &str,
        keys: &[K],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> RowSourceResult<Vec<T>>
    where
        K: ToSql,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut out = Vec::new();
            for chunk in keys.chunks(MAX_KEYS_PER_STATEMENT) {
                let sql = sql_template.replace("{keys}", &placeholders(chunk.len()));
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), map)?;
                for row in rows {
                    out.push(row?);
                }
            }
            Ok(out)
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// SQLite's `LOWER` and `LIKE` fold ASCII letters only, so the needle is folded the same way.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .to_ascii_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn filter_clause(filter: &CandidateFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    if filter.active_only {
        clauses.push("c.is_active = 1");
    }
    if let Some(search) = &filter.search {
        clauses.push(
            "(LOWER(c.candidate_name) LIKE ? ESCAPE '\\' \
             OR LOWER(c.vin_candidate_code) LIKE ? ESCAPE '\\')",
        );
        params.push(Value::Text(like_pattern(search)));
        params.push(Value::Text(like_pattern(search)));
    }
    if let Some(product_key) = filter.product_key {
        clauses.push("c.product_key = ?");
        params.push(Value::Integer(product_key));
    }
    if let Some(disease_key) = &filter.disease_key {
        clauses.push("c.disease_key = ?");
        params.push(Value::Text(disease_key.clone()));
    }
    if let Some(phase_key) = filter.phase_key {
        clauses.push(
            "EXISTS (SELECT 1 FROM fact_pipeline_snapshot s \
             WHERE s.snapshot_key = c.latest_snapshot_key AND s.phase_key = ?)",
        );
        params.push(Value::Integer(phase_key));
    }
    if let Some(developer_key) = filter.developer_key {
        clauses.push(
            "EXISTS (SELECT 1 FROM bridge_candidate_developer b \
             WHERE b.candidate_key = c.candidate_key AND b.developer_key = ?)",
        );
        params.push(Value::Integer(developer_key));
    }
    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn select_candidates(
    conn: &Connection,
    filter: &CandidateFilter,
    page: Page,
) -> rusqlite::Result<Vec<Candidate>> {
    let (where_sql, mut params) = filter_clause(filter);
    let sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM dim_candidate c{where_sql} \
         ORDER BY c.candidate_name, c.candidate_key LIMIT ? OFFSET ?"
    );
    params.push(Value::Integer(page.limit as i64));
    params.push(Value::Integer(page.offset as i64));
    collect(conn, &sql, &params, candidate_row)
}

fn count_candidates(conn: &Connection, filter: &CandidateFilter) -> rusqlite::Result<u64> {
    let (where_sql, params) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM dim_candidate c{where_sql}");
    let count: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

fn candidate_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        candidate_key: row.get(0)?,
        vin_candidate_code: row.get(1)?,
        candidate_name: row.get(2)?,
        product_key: row.get(3)?,
        disease_key: row.get(4)?,
        latest_snapshot_key: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn product_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        product_key: row.get(0)?,
        product_name: row.get(1)?,
        product_category: row.get(2)?,
    })
}

fn snapshot_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        snapshot_key: row.get(0)?,
        candidate_key: row.get(1)?,
        disease_key: row.get(2)?,
        phase_key: row.get(3)?,
        snapshot_year: row.get(4)?,
    })
}

fn disease_row(row: &Row<'_>) -> rusqlite::Result<Disease> {
    Ok(Disease {
        disease_key: row.get(0)?,
        disease_name: row.get(1)?,
        global_health_area: row.get(2)?,
    })
}

fn phase_row(row: &Row<'_>) -> rusqlite::Result<Phase> {
    Ok(Phase { phase_key: row.get(0)?, phase_name: row.get(1)?, sort_order: row.get(2)? })
}

fn priority_row(row: &Row<'_>) -> rusqlite::Result<Priority> {
    Ok(Priority {
        priority_key: row.get(0)?,
        disease_key: row.get(1)?,
        priority_name: row.get(2)?,
        source: row.get(3)?,
    })
}

fn owned_developer_row(row: &Row<'_>) -> rusqlite::Result<(i64, Developer)> {
    Ok((
        row.get(0)?,
        Developer {
            developer_key: row.get(1)?,
            developer_name: row.get(2)?,
            developer_type: row.get(3)?,
            country: row.get(4)?,
        },
    ))
}

fn owned_technology_row(row: &Row<'_>) -> rusqlite::Result<(i64, Technology)> {
    Ok((
        row.get(0)?,
        Technology {
            technology_key: row.get(1)?,
            technology_name: row.get(2)?,
            platform: row.get(3)?,
        },
    ))
}

fn bucket_row(row: &Row<'_>) -> rusqlite::Result<SummaryBucket> {
    let count: i64 = row.get(2)?;
    Ok(SummaryBucket { key: row.get(0)?, label: row.get(1)?, candidate_count: count.max(0) as u64 })
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), map)?;
    rows.collect()
}

impl RowSource for SqliteRowSource {
    fn candidate_page(
        &self,
        filter: &CandidateFilter,
        page: Page,
    ) -> RowSourceResult<(Vec<Candidate>, u64)> {
        self.with_conn(|conn| {
            let rows = select_candidates(conn, filter, page)?;
            let total = count_candidates(conn, filter)?;
            Ok((rows, total))
        })
    }

    fn candidates(&self, filter: &CandidateFilter, page: Page) -> RowSourceResult<Vec<Candidate>> {
        self.with_conn(|conn| select_candidates(conn, filter, page))
    }

    fn candidate_count(&self, filter: &CandidateFilter) -> RowSourceResult<u64> {
        self.with_conn(|conn| count_candidates(conn, filter))
    }

    fn candidate_by_key(&self, candidate_key: i64) -> RowSourceResult<Option<Candidate>> {
        let sql =
            format!("SELECT {CANDIDATE_COLUMNS} FROM dim_candidate c WHERE c.candidate_key = ?");
        let rows = self.with_conn(|conn| {
            collect(conn, &sql, &[Value::Integer(candidate_key)], candidate_row)
        })?;
        Ok(rows.into_iter().next())
    }

    fn summary(&self, dimension: SummaryDimension) -> RowSourceResult<Vec<SummaryBucket>> {
        let sql = match dimension {
            SummaryDimension::Phase => {
                "SELECT CAST(p.phase_key AS TEXT), p.phase_name, COUNT(*) FROM dim_candidate c
                 JOIN fact_pipeline_snapshot s ON s.snapshot_key = c.latest_snapshot_key
                 JOIN dim_phase p ON p.phase_key = s.phase_key
                 GROUP BY p.phase_key, p.phase_name, p.sort_order
                 ORDER BY p.sort_order, p.phase_key"
            }
            SummaryDimension::ProductCategory => {
                "SELECT pr.product_category, pr.product_category, COUNT(*) FROM dim_candidate c
                 JOIN dim_product pr ON pr.product_key = c.product_key
                 GROUP BY pr.product_category ORDER BY pr.product_category"
            }
            SummaryDimension::Disease => {
                "SELECT d.disease_key, d.disease_name, COUNT(*) FROM dim_candidate c
                 JOIN dim_disease d ON d.disease_key = c.disease_key
                 GROUP BY d.disease_key, d.disease_name ORDER BY d.disease_name, d.disease_key"
            }
            SummaryDimension::GlobalHealthArea => {
                "SELECT d.global_health_area, d.global_health_area, COUNT(*) FROM dim_candidate c
                 JOIN dim_disease d ON d.disease_key = c.disease_key
                 GROUP BY d.global_health_area ORDER BY d.global_health_area"
            }
        };
        self.with_conn(|conn| collect(conn, sql, &[], bucket_row))
    }

    fn diseases(&self) -> RowSourceResult<Vec<Disease>> {
        self.with_conn(|conn| {
            collect(
                conn,
                "SELECT disease_key, disease_name, global_health_area FROM dim_disease
                 ORDER BY disease_name, disease_key",
                &[],
                disease_row,
            )
        })
    }

    fn products(&self) -> RowSourceResult<Vec<Product>> {
        self.with_conn(|conn| {
            collect(
                conn,
                "SELECT product_key, product_name, product_category FROM dim_product
                 ORDER BY product_name, product_key",
                &[],
                product_row,
            )
        })
    }

    fn phases(&self) -> RowSourceResult<Vec<Phase>> {
        self.with_conn(|conn| {
            collect(
                conn,
                "SELECT phase_key, phase_name, sort_order FROM dim_phase
                 ORDER BY sort_order, phase_key",
                &[],
                phase_row,
            )
        })
    }

    fn products_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Product>> {
        self.query_in(
            "SELECT product_key, product_name, product_category FROM dim_product
             WHERE product_key IN ({keys})",
            keys,
            product_row,
        )
    }

    fn snapshots_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Snapshot>> {
        self.query_in(
            "SELECT snapshot_key, candidate_key, disease_key, phase_key, snapshot_year
             FROM fact_pipeline_snapshot WHERE snapshot_key IN ({keys})",
            keys,
            snapshot_row,
        )
    }

    fn diseases_by_keys(&self, keys: &[String]) -> RowSourceResult<Vec<Disease>> {
        self.query_in(
            "SELECT disease_key, disease_name, global_health_area FROM dim_disease
             WHERE disease_key IN ({keys})",
            keys,
            disease_row,
        )
    }

    fn phases_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Phase>> {
        self.query_in(
            "SELECT phase_key, phase_name, sort_order FROM dim_phase WHERE phase_key IN ({keys})",
            keys,
            phase_row,
        )
    }

    fn developers_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<(i64, Developer)>> {
        self.query_in(
            "SELECT b.candidate_key, d.developer_key, d.developer_name, d.developer_type, d.country
             FROM bridge_candidate_developer b
             JOIN dim_developer d ON d.developer_key = b.developer_key
             WHERE b.candidate_key IN ({keys})
             ORDER BY b.candidate_key, d.developer_name, d.developer_key",
            keys,
            owned_developer_row,
        )
    }

    fn technologies_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<(i64, Technology)>> {
        self.query_in(
            "SELECT b.candidate_key, t.technology_key, t.technology_name, t.platform
             FROM bridge_candidate_technology b
             JOIN dim_technology t ON t.technology_key = b.technology_key
             WHERE b.candidate_key IN ({keys})
             ORDER BY b.candidate_key, t.technology_name, t.technology_key",
            keys,
            owned_technology_row,
        )
    }

    fn snapshots_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<Snapshot>> {
        self.query_in(
            "SELECT snapshot_key, candidate_key, disease_key, phase_key, snapshot_year
             FROM fact_pipeline_snapshot
             WHERE candidate_key IN ({keys}) ORDER BY snapshot_year, snapshot_key",
            keys,
            snapshot_row,
        )
    }

    fn priorities_by_diseases(&self, keys: &[String]) -> RowSourceResult<Vec<Priority>> {
        self.query_in(
            "SELECT priority_key, disease_key, priority_name, source FROM dim_priority
             WHERE disease_key IN ({keys}) ORDER BY priority_key",
            keys,
            priority_row,
        )
    }
}

/// Writes `dataset` into a new data file at `path`, the shape the ingest job produces.
pub fn write_data_file(path: &Path, dataset: &Dataset) -> RowSourceResult<()> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA_SQL)?;
    let tx = conn.transaction()?;
    for p in &dataset.products {
        tx.execute(
            "INSERT INTO dim_product VALUES (?1, ?2, ?3)",
            (p.product_key, &p.product_name, &p.product_category),
        )?;
    }
    for d in &dataset.developers {
        tx.execute(
            "INSERT INTO dim_developer VALUES (?1, ?2, ?3, ?4)",
            (d.developer_key, &d.developer_name, &d.developer_type, &d.country),
        )?;
    }
    for t in &dataset.technologies {
        tx.execute(
            "INSERT INTO dim_technology VALUES (?1, ?2, ?3)",
            (t.technology_key, &t.technology_name, &t.platform),
        )?;
    }
    for d in &dataset.diseases {
        tx.execute(
            "INSERT INTO dim_disease VALUES (?1, ?2, ?3)",
            (&d.disease_key, &d.disease_name, &d.global_health_area),
        )?;
    }
    for p in &dataset.phases {
        tx.execute(
            "INSERT INTO dim_phase VALUES (?1, ?2, ?3)",
            (p.phase_key, &p.phase_name, p.sort_order),
        )?;
    }
    for p in &dataset.priorities {
        tx.execute(
            "INSERT INTO dim_priority VALUES (?1, ?2, ?3, ?4)",
            (p.priority_key, &p.disease_key, &p.priority_name, &p.source),
        )?;
    }
    for c in &dataset.candidates {
        tx.execute(
            "INSERT INTO dim_candidate VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                c.candidate_key,
                &c.vin_candidate_code,
                &c.candidate_name,
                c.product_key,
                &c.disease_key,
                c.latest_snapshot_key,
                c.is_active,
            ),
        )?;
    }
    for s in &dataset.snapshots {
        tx.execute(
            "INSERT INTO fact_pipeline_snapshot VALUES (?1, ?2, ?3, ?4, ?5)",
            (s.snapshot_key, s.candidate_key, &s.disease_key, s.phase_key, s.snapshot_year),
        )?;
    }
    for (candidate_key, developer_key) in &dataset.candidate_developers {
        tx.execute(
            "INSERT INTO bridge_candidate_developer VALUES (?1, ?2)",
            (candidate_key, developer_key),
        )?;
    }
    for (candidate_key, technology_key) in &dataset.candidate_technologies {
        tx.execute(
            "INSERT INTO bridge_candidate_technology VALUES (?1, ?2)",
            (candidate_key, technology_key),
        )?;
    }
    tx.commit()?;
    Ok(())
}
