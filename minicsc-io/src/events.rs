//! JSON-lines event source.
//!
//! One [`DigiEvent`] per line; blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use minicsc_core::DigiEvent;

use crate::{Error, Result};

/// Iterates the events of a JSON-lines stream in file order.
pub struct EventReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl EventReader<BufReader<File>> {
    /// Opens an event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> EventReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    /// Line number of the last line read (1-based).
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<DigiEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => return Some(Err(err.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&text).map_err(|source| Error::Event {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

/// Writes events as JSON lines.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_events<'a, P, I>(path: P, events: I) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a DigiEvent>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::Destination {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minicsc_core::{DetId, StripDigi, WireDigi};
    use std::io::Cursor;

    #[test]
    fn test_reads_events_and_skips_blank_lines() {
        let text = concat!(
            r#"{"event_id": 1, "wires": [{"ring": 1, "layer": 2, "digis": [{"wire_group": 5, "time_bins_on": [3]}]}]}"#,
            "\n\n",
            r#"{"event_id": 2, "strips": [{"ring": 4, "layer": 1, "digis": [{"strip": 10, "adc_counts": [1024, 1024, 1500]}]}]}"#,
            "\n",
        );
        let events: Vec<DigiEvent> = EventReader::new(Cursor::new(text))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            DigiEvent::new(1).with_wires(DetId::new(1, 2), vec![WireDigi::new(5, vec![3])])
        );
        assert_eq!(
            events[1],
            DigiEvent::new(2).with_strips(
                DetId::new(4, 1),
                vec![StripDigi::new(10, vec![1024, 1024, 1500])]
            )
        );
    }

    #[test]
    fn test_reports_line_of_bad_event() {
        let text = "{\"event_id\": 1}\n\nnot json\n";
        let mut reader = EventReader::new(Cursor::new(text));
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(Error::Event { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected event error, got {other:?}"),
        }
        assert!(reader.next().is_none());
    }
}
