use sqlx::{
    Sqlite,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
};
use tempdir::TempDir;
use tokio::{
    fs as async_fs,
    sync::{RwLock, RwLockReadGuard},
};

use anyhow::Context;
use std::{
    fs::{self, File},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use tar::{Archive, Builder};
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

const DB_FILE_NAME: &str = "workspace.db";
const IMAGE_DIR_NAME: &str = "images";
const ZSTD_LEVEL: i32 = 3;

/// Unpacked working copy of a workspace archive plus the pool that talks to it.
pub(super) struct WorkspaceState {
    workspace_file: PathBuf,
    working_dir: TempDir,
    pool: RwLock<SqlitePool>,
}

impl std::fmt::Debug for WorkspaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceState")
            .field("workspace_file", &self.workspace_file)
            .field("working_dir", &self.working_dir.path())
            .finish()
    }
}

impl WorkspaceState {
    /// Acquire a pooled connection. The pool read lock stays held for as long as the
    /// returned guard lives, so a concurrent save waits for the query to finish.
    pub(super) async fn conn(&self) -> anyhow::Result<DbConnGuard<'_>> {
        let pool_guard = self.pool.read().await;
        let conn = pool_guard.acquire().await?;
        Ok(DbConnGuard {
            _pool_guard: pool_guard,
            conn,
        })
    }

    pub(super) fn image_path(&self, file_name: &str) -> PathBuf {
        self.working_dir.path().join(IMAGE_DIR_NAME).join(file_name)
    }

    pub(super) async fn write_image(&self, file_name: &str, data: &[u8]) -> anyhow::Result<()> {
        let dest_path = self.image_path(file_name);
        async_fs::write(&dest_path, data)
            .await
            .with_context(|| format!("Failed to write image {:?}", dest_path))?;
        Ok(())
    }

    pub(super) async fn read_image(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.image_path(file_name);
        async_fs::read(&path)
            .await
            .with_context(|| format!("Failed to read image {:?}", path))
    }

    /// Removes an image file. A file that is already gone is not an error.
    pub(super) async fn delete_image(&self, file_name: &str) -> anyhow::Result<()> {
        let path = self.image_path(file_name);
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "image file already missing");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete image {:?}", path)),
        }
    }

    fn pack_archive(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.workspace_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let out = File::create(&self.workspace_file)
            .with_context(|| format!("Failed to create workspace archive {:?}", self.workspace_file))?;
        let encoder = ZstdEncoder::new(out, ZSTD_LEVEL)
            .with_context(|| format!("Failed to create zstd encoder for {:?}", self.workspace_file))?;
        let mut tar = Builder::new(encoder);
        tar.append_dir_all(".", self.working_dir.path())
            .with_context(|| format!("Failed to add {:?} to tar", self.working_dir.path()))?;
        let encoder = tar
            .into_inner()
            .with_context(|| format!("Failed to finalize tar for {:?}", self.workspace_file))?;
        encoder
            .finish()
            .with_context(|| format!("Failed to finalize zstd stream for {:?}", self.workspace_file))?;
        Ok(())
    }

    /// Checkpoint, close, pack and reopen. Takes the pool write lock so no query
    /// runs while the database file is being archived.
    pub(super) async fn save_workspace(&self) -> anyhow::Result<()> {
        self.close_and_pack(true).await
    }

    async fn close_and_pack(&self, reopen: bool) -> anyhow::Result<()> {
        let mut pool_guard = self.pool.write().await;

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&*pool_guard)
            .await?;
        pool_guard.close().await;

        self.pack_archive()?;
        tracing::info!(file = %self.workspace_file.display(), "workspace saved");

        if reopen {
            *pool_guard = open_pool(&self.working_dir.path().join(DB_FILE_NAME)).await?;
        }
        Ok(())
    }

    pub(super) async fn new<P: AsRef<Path>>(workspace_file: P) -> anyhow::Result<Self> {
        let workspace_file = workspace_file.as_ref().to_path_buf();

        if !workspace_file.is_file() {
            match workspace_file.parent() {
                Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => {
                    write_empty_archive(&workspace_file)?;
                    tracing::info!(file = %workspace_file.display(), "created empty workspace");
                }
                _ => anyhow::bail!("Workspace file parent does not exist: {:?}", workspace_file),
            }
        }

        let working_dir = TempDir::new("projectsteps_workspace")?;
        {
            let f = File::open(&workspace_file)
                .with_context(|| format!("Failed to open workspace archive {:?}", workspace_file))?;
            let decoder = ZstdDecoder::new(f)
                .with_context(|| format!("Invalid zstd stream in {:?}", workspace_file))?;
            let mut archive = Archive::new(decoder);
            archive.unpack(working_dir.path()).with_context(|| {
                format!(
                    "Failed to extract archive {:?} into {:?}",
                    workspace_file,
                    working_dir.path()
                )
            })?;
        }

        let db_file = working_dir.path().join(DB_FILE_NAME);
        let images_dir = working_dir.path().join(IMAGE_DIR_NAME);
        match (db_file.is_file(), images_dir.is_dir()) {
            (true, true) => {}
            (false, false) => {
                fs::create_dir_all(&images_dir)?;
                File::create(&db_file)?;
            }
            (true, false) => anyhow::bail!(
                "Corrupt workspace: database exists ({:?}) but images dir missing ({:?})",
                db_file,
                images_dir
            ),
            (false, true) => anyhow::bail!(
                "Corrupt workspace: images dir exists ({:?}) but database missing ({:?})",
                images_dir,
                db_file
            ),
        }

        let pool = open_pool(&db_file).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(working_dir = %working_dir.path().display(), "workspace opened");

        Ok(Self {
            workspace_file,
            working_dir,
            pool: RwLock::new(pool),
        })
    }
}

async fn open_pool(db_file: &Path) -> anyhow::Result<SqlitePool> {
    let connect_opts = SqliteConnectOptions::new()
        .filename(db_file)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_opts)
        .await?)
}

fn write_empty_archive(path: &Path) -> anyhow::Result<()> {
    let out = File::create(path).with_context(|| format!("Failed to create workspace archive {:?}", path))?;
    let encoder = ZstdEncoder::new(out, ZSTD_LEVEL)
        .with_context(|| format!("Failed to create zstd encoder for {:?}", path))?;
    let encoder = Builder::new(encoder)
        .into_inner()
        .with_context(|| format!("Failed to finalize empty tar {:?}", path))?;
    encoder
        .finish()
        .with_context(|| format!("Failed to finalize empty zstd stream {:?}", path))?;
    Ok(())
}

pub struct DbConnGuard<'a> {
    _pool_guard: RwLockReadGuard<'a, SqlitePool>,
    conn: PoolConnection<Sqlite>,
}

impl Deref for DbConnGuard<'_> {
    type Target = PoolConnection<Sqlite>;
    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for DbConnGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for WorkspaceState {
    fn drop(&mut self) {
        // Inside a runtime we cannot block; callers there must save explicitly.
        if tokio::runtime::Handle::try_current().is_ok() {
            return;
        }
        let result = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.close_and_pack(false)),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to save workspace on drop");
        }
    }
}
