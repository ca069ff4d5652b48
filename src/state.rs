//! Durable package catalog backed by a single-file SQLite database.
//!
//! Rows move `pending` → `installed`; anything still pending at startup is
//! an interrupted install whose on-disk artifacts get reclaimed. The
//! installed set is mirrored to a pretty-printed `installed.json` so the
//! catalog stays inspectable without sqlite tooling.

use crate::domain::{InstalledPackage, Manifest};
use crate::error::Result;
use crate::traits::State;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS packages (
    name         TEXT PRIMARY KEY,
    version      TEXT NOT NULL,
    revision     TEXT DEFAULT '',
    url          TEXT NOT NULL,
    path         TEXT NOT NULL,
    binaries     TEXT NOT NULL DEFAULT '[]',
    libs         TEXT NOT NULL DEFAULT '[]',
    apps         TEXT NOT NULL DEFAULT '[]',
    dependencies TEXT NOT NULL DEFAULT '[]',
    is_dep       INTEGER NOT NULL DEFAULT 0,
    is_cask      INTEGER NOT NULL DEFAULT 0,
    installed_at TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'installed'
);
";

pub struct SqliteState {
    conn: Mutex<Connection>,
    manifest_path: PathBuf,
}

impl SqliteState {
    /// Open (or create) the database, then run legacy-manifest migration and
    /// interrupted-install recovery.
    pub fn new(db_path: &Path, manifest_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        // WAL keeps readers and the writer from blocking each other when two
        // chatr processes overlap.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        let state = Self {
            conn: Mutex::new(conn),
            manifest_path: manifest_path.to_path_buf(),
        };
        state.migrate()?;
        state.recover()?;
        Ok(state)
    }

    /// Import a legacy `installed.json` into an empty table, then park the
    /// file with a `.bak` suffix.
    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM packages", [], |r| r.get(0))?;
        if count > 0 || !self.manifest_path.exists() {
            return Ok(());
        }

        let raw = fs::read_to_string(&self.manifest_path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;

        let tx = conn.transaction()?;
        for pkg in manifest.packages.values() {
            insert_pkg(&tx, pkg, "installed")?;
        }
        tx.commit()?;

        let backup = self.manifest_path.with_extension("json.bak");
        if let Err(e) = fs::rename(&self.manifest_path, &backup) {
            tracing::warn!("failed to back up legacy manifest: {}", e);
        }
        Ok(())
    }

    /// Reclaim interrupted installs: delete each pending row's filesystem
    /// artifacts and then the row itself.
    fn recover(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let pending: Vec<(String, String, String, bool)> = {
            let mut stmt = conn.prepare(
                "SELECT name, path, apps, is_cask FROM packages WHERE status = 'pending'",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? == 1,
                ))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        for (name, path, apps, is_cask) in pending {
            tracing::warn!("recovering from interrupted install: {}", name);

            if is_cask {
                let apps: Vec<String> = serde_json::from_str(&apps).unwrap_or_default();
                for app in apps {
                    let _ = fs::remove_dir_all(&app);
                }
            } else {
                let _ = fs::remove_dir_all(&path);
            }

            conn.execute("DELETE FROM packages WHERE name = ?1", params![name])?;
        }
        Ok(())
    }

    fn export_json(&self, conn: &Connection) -> Result<()> {
        let packages = list_installed_rows(conn)?;
        let manifest = Manifest { packages };
        let data = serde_json::to_string_pretty(&manifest)?;

        if let Some(parent) = self.manifest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic replace so a crash mid-write never truncates the mirror.
        let tmp = self.manifest_path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.manifest_path)?;
        Ok(())
    }
}

impl State for SqliteState {
    fn load(&self) -> Result<Manifest> {
        let conn = self.conn.lock().unwrap();
        Ok(Manifest {
            packages: list_installed_rows(&conn)?,
        })
    }

    fn save(&self, manifest: &Manifest) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM packages", [])?;
        for pkg in manifest.packages.values() {
            insert_pkg(&tx, pkg, "installed")?;
        }
        tx.commit()?;

        self.export_json(&conn)
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM packages WHERE name = ?1 AND status = 'installed'",
            params![name],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn get(&self, name: &str) -> Result<Option<InstalledPackage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE name = ?1 AND status = 'installed'",
            SELECT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![name], row_to_pkg)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn add(&self, pkg: &InstalledPackage) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        insert_pkg(&tx, pkg, "installed")?;
        tx.commit()?;
        Ok(())
    }

    fn begin_install(&self, pkg: &InstalledPackage) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        insert_pkg(&tx, pkg, "pending")?;
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM packages WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn list_installed(&self) -> Result<HashMap<String, InstalledPackage>> {
        let conn = self.conn.lock().unwrap();
        list_installed_rows(&conn)
    }

    fn flush(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        self.export_json(&conn)
    }

    fn close(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT name, version, revision, url, path, binaries, libs, apps, \
     dependencies, is_dep, is_cask, installed_at FROM packages";

fn insert_pkg(tx: &Transaction, pkg: &InstalledPackage, status: &str) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO packages
         (name, version, revision, url, path, binaries, libs, apps, dependencies,
          is_dep, is_cask, installed_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            pkg.name,
            pkg.version,
            pkg.revision,
            pkg.url,
            pkg.path.to_string_lossy(),
            serde_json::to_string(&pkg.binaries)?,
            serde_json::to_string(&pkg.libs)?,
            serde_json::to_string(&pkg.apps)?,
            serde_json::to_string(&pkg.dependencies)?,
            pkg.is_dep as i64,
            pkg.is_cask as i64,
            pkg.installed_at.to_rfc3339(),
            status,
        ],
    )?;
    Ok(())
}

fn row_to_pkg(row: &rusqlite::Row) -> rusqlite::Result<InstalledPackage> {
    let binaries: String = row.get(5)?;
    let libs: String = row.get(6)?;
    let apps: String = row.get(7)?;
    let deps: String = row.get(8)?;
    let installed_at: String = row.get(11)?;

    Ok(InstalledPackage {
        name: row.get(0)?,
        version: row.get(1)?,
        revision: row.get(2)?,
        url: row.get(3)?,
        path: PathBuf::from(row.get::<_, String>(4)?),
        binaries: serde_json::from_str(&binaries).unwrap_or_default(),
        libs: serde_json::from_str(&libs).unwrap_or_default(),
        apps: serde_json::from_str(&apps).unwrap_or_default(),
        dependencies: serde_json::from_str(&deps).unwrap_or_default(),
        is_dep: row.get::<_, i64>(9)? == 1,
        is_cask: row.get::<_, i64>(10)? == 1,
        installed_at: DateTime::parse_from_rfc3339(&installed_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn list_installed_rows(conn: &Connection) -> Result<HashMap<String, InstalledPackage>> {
    let mut stmt = conn.prepare(&format!("{} WHERE status = 'installed'", SELECT_COLUMNS))?;
    let rows = stmt.query_map([], row_to_pkg)?;

    let mut packages = HashMap::new();
    for row in rows {
        let pkg = row?;
        packages.insert(pkg.name.clone(), pkg);
    }
    Ok(packages)
}
