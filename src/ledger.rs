use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::ArchiveError;

pub const LEDGER_FILE_NAME: &str = "download_archive.txt";
pub const PLATFORM_TAG: &str = "tiktok";

/// Video ids yt-dlp has recorded in its `--download-archive` file.
///
/// The file is written by yt-dlp, one `tiktok <id>` line per finished video.
/// This side only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    ids: HashSet<String>,
}

impl Ledger {
    /// A missing file is a first run, not an error.
    pub fn read(path: &Path) -> Result<Self, ArchiveError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ArchiveError::LedgerRead {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
            }
        };
        Self::parse(BufReader::new(file), path)
    }

    pub fn parse<R: BufRead>(reader: R, origin: &Path) -> Result<Self, ArchiveError> {
        let mut ids = HashSet::new();
        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|err| ArchiveError::LedgerRead {
                path: origin.to_path_buf(),
                message: err.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields = line.split_whitespace().collect::<Vec<_>>();
            let [platform, id] = fields.as_slice() else {
                warn!(path = %origin.display(), line = line_no, "malformed archive line: {line}");
                continue;
            };
            if *platform != PLATFORM_TAG {
                warn!(path = %origin.display(), line = line_no, "unknown platform {platform}");
                continue;
            }
            if !is_numeric_id(id) {
                warn!(path = %origin.display(), line = line_no, "invalid video id {id}");
                continue;
            }
            ids.insert(id.to_string());
        }
        Ok(Self { ids })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for Ledger {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

// Same range check as a signed 64-bit parse.
fn is_numeric_id(value: &str) -> bool {
    value.parse::<i64>().is_ok()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn parse(text: &str) -> Ledger {
        Ledger::parse(Cursor::new(text), Path::new("download_archive.txt")).unwrap()
    }

    #[test]
    fn parse_well_formed_lines() {
        let ledger = parse("tiktok 7600559584901647646\ntiktok 123\n\ntiktok 456\n");
        assert_eq!(ledger.len(), 3);
        assert!(ledger.contains("123"));
        assert!(ledger.contains("7600559584901647646"));
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let ledger = parse(
            "tiktok 1\n\
             youtube 2\n\
             tiktok abc\n\
             tiktok 3 extra\n\
             tiktok\n\
             \t tiktok 4 \n",
        );
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("1"));
        assert!(ledger.contains("4"));
        assert!(!ledger.contains("2"));
    }

    #[test]
    fn read_missing_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let ledger = Ledger::read(&temp.path().join("nope").join(LEDGER_FILE_NAME)).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn read_directory_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        assert!(Ledger::read(temp.path()).is_err());
    }
}
