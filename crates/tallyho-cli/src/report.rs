//! JSON lines output.

use std::io::{self, Stdout, Write};

use parking_lot::Mutex;
use tallyho_core::{ReportError, Reporter, Snapshot};

/// Reporter that writes each snapshot as one JSON document per line.
pub struct JsonReporter<W> {
    out: Mutex<W>,
}

impl JsonReporter<Stdout> {
    /// Write to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonReporter<W> {
    /// Write to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> Reporter for JsonReporter<W> {
    fn name(&self) -> &str {
        "json"
    }

    fn report(&self, snapshot: &Snapshot) -> Result<(), ReportError> {
        let mut out = self.out.lock();
        serde_json::to_writer(&mut *out, snapshot)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}
