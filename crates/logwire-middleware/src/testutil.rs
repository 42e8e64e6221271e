use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use logwire::{Formatter, Logger};

/// Cloneable in-memory sink so tests can read back emitted entries.
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    pub(crate) fn entries(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap().clone();
        std::str::from_utf8(&bytes)
            .unwrap()
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

pub(crate) fn test_logger(buf: &SharedBuf) -> Arc<Logger> {
    let formatter = Formatter::new()
        .with_project_id("test-project")
        .with_service("test")
        .with_version("0.1")
        .with_skip_timestamp();
    Arc::new(Logger::new(formatter, buf.clone()))
}
