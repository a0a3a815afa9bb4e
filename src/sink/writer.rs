use crate::types::Card;
use serde_json::Value;
use std::io::{self, BufWriter, Write};
use tracing::debug;

/// Counts of what a sink has written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub sets_written: u64,
    pub sets_dropped: u64,
    pub cards_written: u64,
}

struct OpenSet {
    code: String,
    block: Option<Value>,
    header_written: bool,
    block_in_header: bool,
    cards: u64,
}

/// Writes `{"meta": ..., "data": {setCode: {"block": ..., "cards": [...]}}}`
/// incrementally, one card at a time.
///
/// The envelope is opened lazily so that `meta` lands first when it arrives
/// first; a `meta` seen after `data` has started is written after it.
pub struct ResultSink<W: Write> {
    writer: BufWriter<W>,
    drop_empty_sets: bool,
    envelope_open: bool,
    data_open: bool,
    meta_written: bool,
    pending_meta: Option<Value>,
    current: Option<OpenSet>,
    stats: SinkStats,
}

impl<W: Write> ResultSink<W> {
    pub const DEFAULT_BUFFER_SIZE: usize = 8192;

    pub fn new(writer: W) -> Self {
        Self::with_options(writer, Self::DEFAULT_BUFFER_SIZE, false)
    }

    pub fn with_options(writer: W, buffer_size: usize, drop_empty_sets: bool) -> Self {
        ResultSink {
            writer: BufWriter::with_capacity(buffer_size.max(1), writer),
            drop_empty_sets,
            envelope_open: false,
            data_open: false,
            meta_written: false,
            pending_meta: None,
            current: None,
            stats: SinkStats::default(),
        }
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Pass the dataset's `meta` through
    pub fn write_meta(&mut self, meta: &Value) -> io::Result<()> {
        if self.meta_written {
            return Ok(());
        }
        if self.data_open {
            self.pending_meta = Some(meta.clone());
            return Ok(());
        }
        self.open_envelope()?;
        self.writer.write_all(b"\"meta\":")?;
        serde_json::to_writer(&mut self.writer, meta)?;
        self.meta_written = true;
        Ok(())
    }

    /// Start a set. With `drop_empty_sets` nothing is written until its first card.
    pub fn open_set(&mut self, code: &str, block: Option<&Value>) -> io::Result<()> {
        if self.current.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("set {} opened while another set is still open", code),
            ));
        }
        self.open_data()?;
        self.current = Some(OpenSet {
            code: code.to_string(),
            block: block.cloned(),
            header_written: false,
            block_in_header: false,
            cards: 0,
        });
        if !self.drop_empty_sets {
            self.write_set_header()?;
        }
        Ok(())
    }

    pub fn write_card(&mut self, card: &Card) -> io::Result<()> {
        let needs_header = match &self.current {
            Some(set) => !set.header_written,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "card written outside of any set",
                ))
            }
        };
        if needs_header {
            self.write_set_header()?;
        }

        let first = self.current.as_ref().map_or(true, |set| set.cards == 0);
        if !first {
            self.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.writer, card)?;

        if let Some(set) = self.current.as_mut() {
            set.cards += 1;
        }
        self.stats.cards_written += 1;
        Ok(())
    }

    /// Finish the open set. `block` is the set's final block value, used when
    /// it was not known at `open_set` time.
    pub fn close_set(&mut self, block: Option<&Value>) -> io::Result<()> {
        let Some(set) = self.current.as_ref() else {
            return Ok(());
        };

        if !set.header_written {
            if self.drop_empty_sets {
                debug!(set = %set.code, "dropping empty set");
                self.current = None;
                self.stats.sets_dropped += 1;
                return Ok(());
            }
            self.write_set_header()?;
        }

        let Some(set) = self.current.take() else {
            return Ok(());
        };
        self.writer.write_all(b"]")?;
        if !set.block_in_header {
            self.writer.write_all(b",\"block\":")?;
            let block = block.or(set.block.as_ref()).unwrap_or(&Value::Null);
            serde_json::to_writer(&mut self.writer, block)?;
        }
        self.writer.write_all(b"}")?;
        self.stats.sets_written += 1;

        // completed sets reach the underlying writer
        self.writer.flush()
    }

    /// Close everything and hand back the underlying writer
    pub fn finish(mut self) -> io::Result<(SinkStats, W)> {
        if self.current.is_some() {
            self.close_set(None)?;
        }
        self.open_data()?;
        self.writer.write_all(b"}")?;

        if !self.meta_written {
            self.writer.write_all(b",\"meta\":")?;
            let meta = self
                .pending_meta
                .take()
                .unwrap_or_else(|| Value::Object(Default::default()));
            serde_json::to_writer(&mut self.writer, &meta)?;
        }
        self.writer.write_all(b"}")?;
        self.writer.flush()?;

        let stats = self.stats;
        let inner = self.writer.into_inner().map_err(|e| e.into_error())?;
        Ok((stats, inner))
    }

    fn open_envelope(&mut self) -> io::Result<()> {
        if !self.envelope_open {
            self.writer.write_all(b"{")?;
            self.envelope_open = true;
        }
        Ok(())
    }

    fn open_data(&mut self) -> io::Result<()> {
        if self.data_open {
            return Ok(());
        }
        self.open_envelope()?;
        if self.meta_written {
            self.writer.write_all(b",")?;
        }
        self.writer.write_all(b"\"data\":{")?;
        self.data_open = true;
        Ok(())
    }

    fn write_set_header(&mut self) -> io::Result<()> {
        let written = self.stats.sets_written;
        let Some(set) = self.current.as_mut() else {
            return Ok(());
        };
        if set.header_written {
            return Ok(());
        }

        if written > 0 {
            self.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.writer, &set.code)?;
        self.writer.write_all(b":{")?;
        if let Some(block) = &set.block {
            self.writer.write_all(b"\"block\":")?;
            serde_json::to_writer(&mut self.writer, block)?;
            self.writer.write_all(b",")?;
            set.block_in_header = true;
        }
        self.writer.write_all(b"\"cards\":[")?;
        set.header_written = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card(name: &str) -> Card {
        serde_json::from_value(json!({"name": name})).unwrap()
    }

    fn output(sink: ResultSink<Vec<u8>>) -> Value {
        let (_, bytes) = sink.finish().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_envelope_shape() {
        let mut sink = ResultSink::new(Vec::new());
        sink.write_meta(&json!({"date": "2024-01-01", "version": "5.2"})).unwrap();
        sink.open_set("BIG", Some(&json!("X"))).unwrap();
        sink.write_card(&card("Alpha")).unwrap();
        sink.write_card(&card("Beta")).unwrap();
        sink.close_set(Some(&json!("X"))).unwrap();
        sink.open_set("SML", None).unwrap();
        sink.close_set(None).unwrap();

        assert_eq!(sink.stats().sets_written, 2);
        assert_eq!(sink.stats().cards_written, 2);
        assert_eq!(
            output(sink),
            json!({
                "meta": {"date": "2024-01-01", "version": "5.2"},
                "data": {
                    "BIG": {"block": "X", "cards": [{"name": "Alpha"}, {"name": "Beta"}]},
                    "SML": {"block": null, "cards": []}
                }
            })
        );
    }

    #[test]
    fn test_drop_empty_sets() {
        let mut sink = ResultSink::with_options(Vec::new(), 64, true);
        sink.open_set("EMPTY", Some(&json!("X"))).unwrap();
        sink.close_set(None).unwrap();
        sink.open_set("BIG", Some(&json!("Y"))).unwrap();
        sink.write_card(&card("Alpha")).unwrap();
        sink.close_set(None).unwrap();

        assert_eq!(sink.stats().sets_dropped, 1);
        let value = output(sink);
        assert!(value["data"].get("EMPTY").is_none());
        assert_eq!(value["data"]["BIG"]["cards"][0]["name"], "Alpha");
        assert_eq!(value["meta"], json!({}));
    }

    #[test]
    fn test_late_block_and_late_meta() {
        let mut sink = ResultSink::new(Vec::new());
        sink.open_set("BIG", None).unwrap();
        sink.write_card(&card("Alpha")).unwrap();
        sink.close_set(Some(&json!("Late"))).unwrap();
        sink.write_meta(&json!({"version": "9"})).unwrap();

        let value = output(sink);
        assert_eq!(value["data"]["BIG"]["block"], "Late");
        assert_eq!(value["meta"]["version"], "9");
    }

    #[test]
    fn test_empty_dataset() {
        let sink = ResultSink::new(Vec::new());
        assert_eq!(output(sink), json!({"data": {}, "meta": {}}));
    }

    #[test]
    fn test_card_outside_set_is_an_error() {
        let mut sink = ResultSink::new(Vec::new());
        assert!(sink.write_card(&card("Alpha")).is_err());
    }

    #[test]
    fn test_write_failure_surfaces() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut sink = ResultSink::with_options(Full, 1, false);
        sink.open_set("BIG", None).unwrap_or(());
        sink.write_card(&card("Alpha")).unwrap_or(());
        assert!(sink.close_set(None).is_err());
    }
}
