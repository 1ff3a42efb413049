use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use env_logger::{Env, Target};

const LOG_FILE: &str = "clipsync.log";
const OLD_LOG_FILE: &str = "clipsync.old.log";
const MAX_LOG_BYTES: u64 = 2 * 1024 * 1024;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Log to stderr and to `<data_dir>/clipsync.log`. `RUST_LOG` overrides the default filter.
pub fn init(data_dir: &Path) {
    let file = match open_log_file(data_dir) {
        Ok((file, path)) => {
            let _ = LOG_PATH.set(path);
            Some(file)
        }
        Err(e) => {
            eprintln!("Log file unavailable, logging to stderr only: {}", e);
            None
        }
    };

    let result = env_logger::Builder::from_env(
        Env::default().default_filter_or("clipsync_lib=info,clipsync=info"),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "[{}] {:<5} {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    })
    .target(Target::Pipe(Box::new(Tee { file })))
    .try_init();

    if result.is_err() {
        return;
    }
    log::info!("=== ClipSync v{} started ===", env!("CARGO_PKG_VERSION"));
    log::info!("OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Some(path) = log_path() {
        log::info!("Log file: {}", path);
    }
}

pub fn log_path() -> Option<String> {
    LOG_PATH.get().map(|p| p.display().to_string())
}

/// Open the log for appending, moving an oversized one aside first.
fn open_log_file(data_dir: &Path) -> io::Result<(File, PathBuf)> {
    std::fs::create_dir_all(data_dir)?;
    let log_path = data_dir.join(LOG_FILE);

    if let Ok(meta) = std::fs::metadata(&log_path) {
        if meta.len() > MAX_LOG_BYTES {
            std::fs::rename(&log_path, data_dir.join(OLD_LOG_FILE))?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    Ok((file, log_path))
}

struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // stderr already has the line
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}
