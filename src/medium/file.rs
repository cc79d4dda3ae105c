//! File-backed mediums: a single stream and a batch-per-file directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{Medium, MediumCtor};
use crate::error::{Error, Result};
use crate::extension::{ArgSpec, Descriptor, ExtensionArgs};
use crate::record::Payload;

/// Appends every batch to one stream: stdout (`-`) or a file path.
///
/// Writer slots share the stream; a lock keeps batches contiguous.
pub struct FileMedium {
    target: String,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for FileMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMedium").field("target", &self.target).finish()
    }
}

impl FileMedium {
    /// Open the medium for `target`; `-` selects stdout.
    pub fn open(target: &str) -> Result<Self> {
        let writer: Box<dyn Write + Send> = if target == "-" {
            Box::new(std::io::stdout())
        } else {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(target)
                .map_err(|e| Error::Config(format!("cannot open {target:?}: {e}")))?;
            Box::new(file)
        };
        Ok(Self {
            target: target.to_string(),
            writer: Mutex::new(writer),
        })
    }
}

impl Medium for FileMedium {
    fn write(&self, payload: &Payload) -> Result<()> {
        let mut writer = self.writer.lock().expect("file writer lock poisoned");
        writer
            .write_all(payload.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| Error::MediumWrite {
                cause: format!("write to {:?} failed: {e}", self.target),
                retriable: false,
            })
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Writes each batch to a fresh, monotonically indexed file.
///
/// With `max_files` set, the file written `max_files` batches ago is
/// removed after each write, keeping the directory bounded.
pub struct DirectoryMedium {
    directory: PathBuf,
    suffix: String,
    max_files: Option<u64>,
    index: AtomicU64,
}

impl DirectoryMedium {
    /// Create the medium, creating the directory if needed.
    pub fn create(directory: &str, suffix: &str, max_files: Option<u64>) -> Result<Self> {
        fs::create_dir_all(directory)
            .map_err(|e| Error::Config(format!("cannot create directory {directory:?}: {e}")))?;
        Ok(Self {
            directory: PathBuf::from(directory),
            suffix: suffix.to_string(),
            max_files,
            index: AtomicU64::new(0),
        })
    }

    fn path_for(&self, index: u64) -> PathBuf {
        self.directory.join(format!("{}.{}", index, self.suffix))
    }
}

impl Medium for DirectoryMedium {
    fn write(&self, payload: &Payload) -> Result<()> {
        let index = self.index.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(index);

        let mut file = File::create(&path).map_err(|e| Error::MediumWrite {
            cause: format!("cannot create {path:?}: {e}"),
            retriable: false,
        })?;
        file.write_all(payload.as_bytes())
            .map_err(|e| Error::MediumWrite {
                cause: format!("write to {path:?} failed: {e}"),
                retriable: false,
            })?;

        if let Some(max) = self.max_files {
            if index >= max {
                // Concurrent writers may race for the same victim.
                let _ = fs::remove_file(self.path_for(index - max));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}

fn construct_file(args: &ExtensionArgs) -> Result<Arc<dyn Medium>> {
    let target = args.get_str("name").unwrap_or_else(|| "-".to_string());
    Ok(Arc::new(FileMedium::open(&target)?))
}

fn construct_directory(args: &ExtensionArgs) -> Result<Arc<dyn Medium>> {
    let directory = args
        .get_str("directory")
        .unwrap_or_else(|| "./avalon-output".to_string());
    let suffix = args.get_str("suffix").unwrap_or_else(|| "txt".to_string());
    let max_files = args.get_u64("max_files");
    Ok(Arc::new(DirectoryMedium::create(
        &directory, &suffix, max_files,
    )?))
}

/// Descriptor for the built-in `file` medium.
pub fn file_descriptor() -> Descriptor<MediumCtor> {
    Descriptor::new("file", construct_file as MediumCtor).with_args(vec![ArgSpec::value(
        "file-name",
        "<file>",
        "Write output to <file> instead of stdout",
    )
    .default_str("-")])
}

/// Descriptor for the built-in `directory` medium.
pub fn directory_descriptor() -> Descriptor<MediumCtor> {
    Descriptor::new("directory", construct_directory as MediumCtor)
        .with_args(vec![
            ArgSpec::value("dir-name", "<dir>", "Target directory for batch files")
                .default_str("./avalon-output"),
            ArgSpec::value("suffix", "<suffix>", "Batch file suffix, without the dot")
                .default_str("txt"),
            ArgSpec::value(
                "dir-max-files",
                "<N>",
                "Keep at most <N> batch files, removing the oldest",
            ),
        ])
        .with_mapping(&[
            ("dir_name", "directory"),
            ("suffix", "suffix"),
            ("dir_max_files", "max_files"),
        ])
}
