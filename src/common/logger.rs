use std::{
  fs::{self, File, OpenOptions},
  io::{self, BufRead, BufReader, Write},
  path::{Path, PathBuf},
  sync::{Arc, Mutex, OnceLock},
};

use tracing_subscriber::{EnvFilter, fmt::{self, time::LocalTime}, prelude::*};

use crate::configs::{Config, LogFileConfig};

pub(crate) static GLOBAL_FILE_WRITER: OnceLock<CappedFileWriter> = OnceLock::new();

/// `println!` that is mirrored into the log file once logging is up.
#[macro_export]
macro_rules! log_println {
    () => {{
        std::println!();
        $crate::common::logger::append_to_file_raw("\n");
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::append_to_file_raw(&format!("{}\n", msg));
    }};
}

pub fn append_to_file_raw(msg: &str) {
  if let Some(mut writer) = GLOBAL_FILE_WRITER.get().cloned() {
    let _ = writer.write_all(strip_ansi_escapes(msg).as_bytes());
  }
}

fn strip_ansi_escapes(s: &str) -> String {
  let mut result = String::with_capacity(s.len());
  let mut in_escape = false;
  for c in s.chars() {
    if c == '\x1b' {
      in_escape = true;
    } else if in_escape {
      if c.is_ascii_alphabetic() {
        in_escape = false;
      }
    } else {
      result.push(c);
    }
  }
  result
}

/// Builds the filter directive from `[logging]`: base level plus extra
/// per-target filters. `RUST_LOG` wins when set.
pub fn filter_directive(config: &Config) -> String {
  let logging = config.logging.as_ref();
  let level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
  match logging.and_then(|l| l.filters.as_deref()) {
    Some(filters) if !filters.is_empty() => format!("{},{}", level, filters),
    _ => level.to_string(),
  }
}

pub fn init(config: &Config) {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

  let stdout_layer = fmt::layer()
    .with_timer(LocalTime::rfc_3339())
    .with_target(true)
    .with_line_number(true)
    .with_file(false);

  let file_layer = config
    .logging
    .as_ref()
    .and_then(|l| l.file.as_ref())
    .map(|file_config| {
      let writer = CappedFileWriter::open(file_config);
      let _ = GLOBAL_FILE_WRITER.set(writer.clone());
      fmt::layer()
        .with_writer(writer)
        .with_timer(LocalTime::rfc_3339())
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false)
    });

  tracing_subscriber::registry()
    .with(env_filter)
    .with(stdout_layer)
    .with(file_layer)
    .init();
}

/// Appends to a log file and trims the oldest lines so the file stays
/// under `max_lines`.
#[derive(Clone)]
pub(crate) struct CappedFileWriter {
  path: PathBuf,
  max_lines: u32,
  lines_since_prune: Arc<Mutex<u32>>,
}

impl CappedFileWriter {
  fn open(config: &LogFileConfig) -> Self {
    let path = PathBuf::from(&config.path);
    if let Some(parent) = path.parent() {
      if let Err(e) = fs::create_dir_all(parent) {
        eprintln!("Failed to create log directory: {}", e);
      }
    }
    Self {
      path,
      max_lines: config.max_lines.max(1),
      lines_since_prune: Arc::new(Mutex::new(0)),
    }
  }

  fn prune(&self) -> io::Result<()> {
    if !Path::new(&self.path).exists() {
      return Ok(());
    }

    let lines: Vec<String> = BufReader::new(File::open(&self.path)?)
      .lines()
      .collect::<Result<_, _>>()?;

    let max = self.max_lines as usize;
    if lines.len() > max {
      let mut file = File::create(&self.path)?;
      for line in &lines[lines.len() - max..] {
        writeln!(file, "{}", line)?;
      }
    }
    Ok(())
  }
}

impl io::Write for CappedFileWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?
      .write_all(buf)?;

    let mut pending = self.lines_since_prune.lock().unwrap_or_else(|e| e.into_inner());
    *pending += buf.iter().filter(|&&b| b == b'\n').count() as u32;

    // Trim once 10% of the cap (at least 50 lines) has accumulated.
    if *pending >= (self.max_lines / 10).max(50) {
      if let Err(e) = self.prune() {
        eprintln!("Failed to prune log file: {}", e);
      }
      *pending = 0;
    }

    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> fmt::MakeWriter<'a> for CappedFileWriter {
  type Writer = Self;

  fn make_writer(&'a self) -> Self::Writer {
    self.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::configs::LoggingConfig;

  #[test]
  fn test_filter_directive_defaults_to_info() {
    assert_eq!(filter_directive(&Config::default()), "info");
  }

  #[test]
  fn test_filter_directive_appends_filters() {
    let mut config = Config::default();
    config.logging = Some(LoggingConfig {
      level: Some("debug".into()),
      filters: Some("tower_http=warn".into()),
      file: None,
    });
    assert_eq!(filter_directive(&config), "debug,tower_http=warn");
  }

  #[test]
  fn test_strip_ansi() {
    assert_eq!(strip_ansi_escapes("\x1b[32mok\x1b[0m"), "ok");
  }

  #[test]
  fn test_capped_writer_trims_old_lines() {
    let dir = std::env::temp_dir().join(format!("groovelink-log-{}", uuid::Uuid::new_v4()));
    let path = dir.join("test.log");
    let mut writer = CappedFileWriter::open(&LogFileConfig {
      path: path.to_string_lossy().into_owned(),
      max_lines: 20,
    });

    for i in 0..120 {
      writer.write_all(format!("line {}\n", i).as_bytes()).unwrap();
    }

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert!(lines.len() <= 70, "file should have been pruned, got {}", lines.len());
    assert_eq!(lines.last().copied(), Some("line 119"));
    let _ = fs::remove_dir_all(dir);
  }
}
