//! Streaming NDJSON reader.
//!
//! Yields one [`LineOutcome`] per non-blank physical line, in file order,
//! reading the file sequentially so memory stays bounded by a single line.
//! A malformed line never aborts the stream; it surfaces as its own outcome
//! so the caller can report it precisely and keep going.

use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// One physical line's fate, or the file-absent sentinel.
#[derive(Debug)]
pub enum LineOutcome {
    Record { line: u64, value: Value },
    Malformed { line: u64, message: String },
    /// The file does not exist (or cannot be opened); yielded exactly once.
    Missing,
}

pub struct LineReader {
    inner: Inner,
}

enum Inner {
    Missing { yielded: bool },
    Open { lines: Lines<BufReader<File>>, num: u64, done: bool },
}

impl LineReader {
    pub fn open(path: &Path) -> Self {
        if !path.is_file() {
            return Self {
                inner: Inner::Missing { yielded: false },
            };
        }
        match File::open(path) {
            Ok(file) => Self {
                inner: Inner::Open {
                    lines: BufReader::new(file).lines(),
                    num: 0,
                    done: false,
                },
            },
            Err(_) => Self {
                inner: Inner::Missing { yielded: false },
            },
        }
    }
}

impl Iterator for LineReader {
    type Item = LineOutcome;

    fn next(&mut self) -> Option<LineOutcome> {
        match &mut self.inner {
            Inner::Missing { yielded } => {
                if *yielded {
                    None
                } else {
                    *yielded = true;
                    Some(LineOutcome::Missing)
                }
            }
            Inner::Open { lines, num, done } => {
                if *done {
                    return None;
                }
                loop {
                    let raw = match lines.next()? {
                        Ok(raw) => raw,
                        Err(err) => {
                            // An unreadable tail ends the stream after one
                            // reported outcome.
                            *done = true;
                            *num += 1;
                            return Some(LineOutcome::Malformed {
                                line: *num,
                                message: err.to_string(),
                            });
                        }
                    };
                    *num += 1;
                    if raw.trim().is_empty() {
                        continue;
                    }
                    return Some(match serde_json::from_str::<Value>(&raw) {
                        Ok(value) => LineOutcome::Record { line: *num, value },
                        Err(err) => LineOutcome::Malformed {
                            line: *num,
                            message: err.to_string(),
                        },
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("parsed.ndjson");
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (tmp, path)
    }

    #[test]
    fn yields_records_with_physical_line_numbers() {
        let (_tmp, path) = write_file("{\"a\":1}\n\n{\"b\":2}\n");
        let outcomes: Vec<_> = LineReader::open(&path).collect();
        assert_eq!(outcomes.len(), 2);
        match &outcomes[0] {
            LineOutcome::Record { line, .. } => assert_eq!(*line, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Blank line 2 is skipped but still counts as a physical line.
        match &outcomes[1] {
            LineOutcome::Record { line, .. } => assert_eq!(*line, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn malformed_line_does_not_stop_the_stream() {
        let (_tmp, path) = write_file("{broken\n{\"ok\":true}\n");
        let outcomes: Vec<_> = LineReader::open(&path).collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            LineOutcome::Malformed { line: 1, .. }
        ));
        assert!(matches!(outcomes[1], LineOutcome::Record { line: 2, .. }));
    }

    #[test]
    fn whitespace_only_lines_are_blank() {
        let (_tmp, path) = write_file("   \t \n{\"a\":1}\n");
        let outcomes: Vec<_> = LineReader::open(&path).collect();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], LineOutcome::Record { line: 2, .. }));
    }

    #[test]
    fn missing_file_yields_single_sentinel() {
        let tmp = tempfile::TempDir::new().unwrap();
        let outcomes: Vec<_> = LineReader::open(&tmp.path().join("absent.ndjson")).collect();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], LineOutcome::Missing));
    }
}
