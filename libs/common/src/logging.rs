//! Logging setup shared by the gateway binaries
//!
//! Console output plus an optional size-rotated log file (`scgi.log`,
//! `scgi.log.1` .. `scgi.log.N`) that is reopened on SIGHUP.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809000Z [INFO] SCGI server listening on 0.0.0.0:4000`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        // Thread name tells the comm thread apart from the main runtime
        if let Some(name) = std::thread::current().name() {
            write!(writer, "{:<10.10} ", name)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking workers alive until process exit
static GUARDS: OnceLock<Arc<Mutex<Vec<WorkerGuard>>>> = OnceLock::new();

/// Size-rotated file writer
///
/// Once the active file would grow past `max_file_size`, `<name>.log` is
/// renamed to `<name>.log.1`, every existing `<name>.log.i` shifts to
/// `<name>.log.i+1` and anything past `backup_count` is dropped.
/// `max_file_size == 0` disables rotation.
pub struct RotatingFileWriter {
    path: PathBuf,
    max_file_size: u64,
    backup_count: u32,
    current_file: Arc<Mutex<Option<File>>>,
    current_size: Arc<AtomicU64>,
}

impl RotatingFileWriter {
    pub fn new(
        log_dir: &Path,
        file_name: &str,
        max_file_size: u64,
        backup_count: u32,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{}.log", file_name));

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let initial_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path,
            max_file_size,
            backup_count,
            current_file: Arc::new(Mutex::new(Some(file))),
            current_size: Arc::new(AtomicU64::new(initial_size)),
        })
    }

    /// Path of the active log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&self) -> std::io::Result<()> {
        let mut current_file = self
            .current_file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;

        // Close before renaming
        *current_file = None;

        if self.backup_count > 0 {
            for i in (1..self.backup_count).rev() {
                let src = self.backup_path(i);
                if src.exists() {
                    let dst = self.backup_path(i + 1);
                    let _ = fs::remove_file(&dst);
                    fs::rename(&src, &dst)?;
                }
            }
            let first = self.backup_path(1);
            let _ = fs::remove_file(&first);
            if self.path.exists() {
                fs::rename(&self.path, &first)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        *current_file = Some(file);
        self.current_size.store(0, Ordering::SeqCst);

        Ok(())
    }
}

impl std::io::Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let current_size = self.current_size.load(Ordering::Relaxed);
        if self.max_file_size > 0
            && current_size > 0
            && current_size + buf.len() as u64 > self.max_file_size
        {
            self.rotate()?;
        }

        let mut guard = self
            .current_file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
        match guard.as_mut() {
            Some(file) => {
                let written = file.write(buf)?;
                self.current_size
                    .fetch_add(written as u64, Ordering::Relaxed);
                Ok(written)
            },
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut guard = self
            .current_file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
        match guard.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Clone for RotatingFileWriter {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            max_file_size: self.max_file_size,
            backup_count: self.backup_count,
            current_file: Arc::clone(&self.current_file),
            current_size: Arc::clone(&self.current_size),
        }
    }
}

// Reloadable writer for file logging
struct ReloadableWriter {
    inner: Arc<Mutex<Option<tracing_appender::non_blocking::NonBlocking>>>,
}

impl ReloadableWriter {
    fn new(writer: tracing_appender::non_blocking::NonBlocking) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    fn reload(&self, new_writer: tracing_appender::non_blocking::NonBlocking) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(new_writer);
        }
    }
}

impl std::io::Write for ReloadableWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(ref mut writer) = *guard {
                return writer.write(buf);
            }
        }
        Ok(0)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(ref mut writer) = *guard {
                return writer.flush();
            }
        }
        Ok(())
    }
}

// Newtype wrapper for Arc<ReloadableWriter> to bypass orphan rule
#[derive(Clone)]
struct ReloadableWriterHandle(Arc<ReloadableWriter>);

impl MakeWriter<'_> for ReloadableWriterHandle {
    type Writer = ReloadableWriter;

    fn make_writer(&'_ self) -> Self::Writer {
        ReloadableWriter {
            inner: self.0.inner.clone(),
        }
    }
}

static LOG_RUNTIME: OnceLock<LogConfig> = OnceLock::new();
static RELOADABLE_WRITER: OnceLock<Arc<ReloadableWriter>> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the default filter target
    pub service_name: String,
    /// Log file base name (`<file_name>.log`)
    pub file_name: String,
    /// Directory holding the log file and its backups
    pub log_dir: PathBuf,
    /// Level applied to the service target
    pub level: Level,
    /// Write to the log file in addition to the console
    pub log_to_file: bool,
    /// Rotation threshold in bytes, 0 disables rotation
    pub max_file_size: u64,
    /// Number of rotated backups kept
    pub backup_count: u32,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "scgisrv".to_string(),
            file_name: "scgi".to_string(),
            log_dir: PathBuf::from("log"),
            level: Level::DEBUG,
            log_to_file: true,
            max_file_size: 1024 * 1000,
            backup_count: 5,
            ansi: true,
        }
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG wins over the configured level
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "info,{}={}",
            config.service_name,
            config.level.as_str().to_lowercase()
        )
    });
    let env_filter = EnvFilter::try_new(&filter_str)?;

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.log_to_file {
        let writer = RotatingFileWriter::new(
            &config.log_dir,
            &config.file_name,
            config.max_file_size,
            config.backup_count,
        )?;
        let (non_blocking, guard) = tracing_appender::non_blocking(writer);
        store_guard(guard, false);

        let reloadable = Arc::new(ReloadableWriter::new(non_blocking));
        RELOADABLE_WRITER.get_or_init(|| reloadable.clone());

        Some(
            fmt::layer()
                .with_writer(ReloadableWriterHandle(reloadable))
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    let _ = LOG_RUNTIME.set(config.clone());

    if config.log_to_file {
        tracing::info!(
            "Logging: {} @ {:?}",
            config.service_name,
            config.log_dir.join(format!("{}.log", config.file_name))
        );
        start_log_compression_task(config.log_dir, config.file_name);
    } else {
        tracing::info!("Logging: {} (console only)", config.service_name);
    }

    Ok(())
}

fn store_guard(guard: WorkerGuard, replace: bool) {
    let guards = GUARDS.get_or_init(|| Arc::new(Mutex::new(Vec::new())));
    match guards.lock() {
        Ok(mut guards) => {
            if replace {
                guards.clear();
            }
            guards.push(guard);
        },
        Err(poisoned) => {
            eprintln!("Warning: GUARDS lock was poisoned, recovering...");
            poisoned.into_inner().push(guard);
        },
    }
}

/// Reopen the log file (after an external logrotate or manual deletion)
pub fn reopen_logs_now() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = LOG_RUNTIME
        .get()
        .ok_or("logging not initialized (runtime config missing)")?;
    if !runtime.log_to_file {
        return Ok(());
    }

    let writer = RotatingFileWriter::new(
        &runtime.log_dir,
        &runtime.file_name,
        runtime.max_file_size,
        runtime.backup_count,
    )?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    RELOADABLE_WRITER
        .get()
        .ok_or("reloadable writer not initialized")?
        .reload(non_blocking);
    // Dropping the old guard flushes and closes the previous handle
    store_guard(guard, true);

    tracing::debug!("Log reopened");
    Ok(())
}

/// Install SIGHUP listener to reopen logs on demand (Unix only)
pub fn enable_sighup_log_reopen() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        tokio::spawn(async move {
            match signal(SignalKind::hangup()) {
                Ok(mut hup) => loop {
                    hup.recv().await;
                    if let Err(e) = reopen_logs_now() {
                        tracing::warn!("SIGHUP reopen: {}", e);
                    }
                },
                Err(e) => tracing::warn!("SIGHUP handler: {}", e),
            }
        });
    }
}

// ==================== Log Compression Support ====================

use tokio::time::{interval, Duration};

/// Start background compression of rotated backups
fn start_log_compression_task(log_dir: PathBuf, file_name: String) {
    tokio::spawn(async move {
        // Let the service settle first
        tokio::time::sleep(Duration::from_secs(60)).await;

        let mut interval = interval(Duration::from_secs(86400));

        loop {
            interval.tick().await;
            if let Err(e) = compress_old_logs(&log_dir, &file_name).await {
                tracing::error!("Log compression error for {}: {}", file_name, e);
            }
        }
    });
}

/// Gzip rotated backups older than 7 days, delete archives older than 365 days
async fn compress_old_logs(
    log_dir: &Path,
    file_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::time::SystemTime;

    let backup_prefix = format!("{}.log.", file_name);
    let mut entries = tokio::fs::read_dir(log_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        let is_backup = name.starts_with(&backup_prefix)
            && name[backup_prefix.len()..].chars().all(|c| c.is_ascii_digit());
        let is_archive = name.starts_with(file_name) && name.ends_with(".log.gz");
        if !is_backup && !is_archive {
            continue;
        }

        let metadata = tokio::fs::metadata(&path).await?;
        let modified = metadata.modified()?;
        let age = SystemTime::now().duration_since(modified)?;

        if is_backup {
            if age > Duration::from_secs(7 * 86400) {
                let stamp = chrono::DateTime::<chrono::Local>::from(modified)
                    .format("%Y%m%d%H%M%S")
                    .to_string();
                let archive = log_dir.join(format!("{}-{}.log.gz", file_name, stamp));
                compress_file(&path, &archive).await?;
                tokio::fs::remove_file(&path).await?;
                tracing::debug!("Compressed: {}", name);
            }
        } else if age > Duration::from_secs(365 * 86400) {
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Deleted: {}", name);
        }
    }

    Ok(())
}

async fn compress_file(path: &Path, output_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let buffer = tokio::fs::read(path).await?;

    let output = File::create(output_path)?;
    let mut encoder = GzEncoder::new(output, Compression::best());
    encoder.write_all(&buffer)?;
    encoder.finish()?;

    Ok(())
}
