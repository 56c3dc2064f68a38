//! JSON-lines output for collected records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Writes one serialized record per line.
pub(crate) struct JsonLinesSink;

impl JsonLinesSink {
    /// Creates `path` (and any missing parent directories) and writes every
    /// record to it. Returns the number of lines written.
    pub(crate) fn write_records<'a, T, I>(path: &Path, records: I) -> anyhow::Result<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let written = Self::write_to(&mut writer, records)?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;
        tracing::info!(path = %path.display(), records = written, "output written");
        Ok(written)
    }

    pub(crate) fn write_to<'a, T, I, W>(mut writer: W, records: I) -> anyhow::Result<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
        W: Write,
    {
        let mut written = 0;
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        Ok(written)
    }
}
