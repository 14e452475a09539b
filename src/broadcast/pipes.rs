//! Per-philosopher named pipes.
//!
//! The simulation writes philosopher `i`'s status lines to `<dir>/phil_<i>`
//! through a `LineObserver`; `watch` is the reading end, run in a separate
//! process (one terminal per philosopher). `PipeSet` owns the pipe files for
//! the lifetime of a run and removes them afterwards.

use crate::broadcast::observer::{LineObserver, Observer, EXIT_MARKER};
use crate::core::errors::{DiningError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// `<dir>/phil_<id>`
pub fn pipe_path(dir: &Path, id: usize) -> PathBuf {
    dir.join(format!("phil_{}", id))
}

/// The pipe files of one run
#[derive(Debug)]
pub struct PipeSet {
    paths: Vec<PathBuf>,
}

impl PipeSet {
    /// Create `phil_0 .. phil_<actors-1>` in `dir`. A pipe left over from an
    /// earlier run is reused.
    pub fn create(dir: &Path, actors: usize) -> Result<Self> {
        let mut paths = Vec::with_capacity(actors);
        for id in 0..actors {
            let path = pipe_path(dir, id);
            make_fifo(&path)?;
            debug!(philosopher = id, path = %path.display(), "pipe ready");
            paths.push(path);
        }
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Open the writing end of every pipe. Opening a pipe waits until a
    /// viewer opens it for reading.
    pub async fn open_observers(&self) -> Result<Vec<Arc<dyn Observer>>> {
        let mut observers: Vec<Arc<dyn Observer>> = Vec::with_capacity(self.paths.len());
        for (id, path) in self.paths.iter().enumerate() {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(path)
                .await
                .map_err(|e| DiningError::io(format!("open {}", path.display()), e))?;
            info!(philosopher = id, path = %path.display(), "viewer attached");
            observers.push(Arc::new(LineObserver::new(id, file)));
        }
        Ok(observers)
    }

    /// Unlink every pipe. Files that are already gone are skipped.
    pub async fn remove(self) -> Result<()> {
        for path in &self.paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "pipe removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(DiningError::io(format!("remove {}", path.display()), e)),
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn make_fifo(path: &Path) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::stat::Mode;

    match nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) => Ok(()),
        Err(Errno::EEXIST) => {
            warn!(path = %path.display(), "pipe already exists, reusing it");
            Ok(())
        }
        Err(errno) => Err(DiningError::io(
            format!("mkfifo {}", path.display()),
            std::io::Error::from(errno),
        )),
    }
}

// No named pipes here: a plain file stands in and `watch` reads it afterwards.
#[cfg(not(unix))]
fn make_fifo(path: &Path) -> Result<()> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| DiningError::io(format!("create {}", path.display()), e))
}

/// Copy status lines from `path` to `out` until `EXIT_MARKER` or end of file.
/// Returns the number of lines copied, the marker not included.
pub async fn watch<W: AsyncWrite + Unpin>(path: &Path, out: &mut W) -> Result<u64> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DiningError::io(format!("open {}", path.display()), e))?;
    let mut lines = BufReader::new(file).lines();
    let mut copied = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim_end() == EXIT_MARKER {
            debug!(path = %path.display(), copied, "exit marker received");
            break;
        }
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PhilState;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dining-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_pipe_path() {
        assert_eq!(pipe_path(Path::new("/tmp"), 3), PathBuf::from("/tmp/phil_3"));
    }

    #[tokio::test]
    async fn test_watch_stops_at_exit_marker() {
        let dir = scratch_dir("watch");
        let path = pipe_path(&dir, 0);
        let text = format!(
            "{}\n{}\n{}\nnever shown\n",
            PhilState::Hungry.sentence(),
            PhilState::Eating.sentence(),
            EXIT_MARKER
        );
        tokio::fs::write(&path, text).await.unwrap();

        let mut out = Vec::new();
        let copied = watch(&path, &mut out).await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n{}\n", PhilState::Hungry.sentence(), PhilState::Eating.sentence())
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_watch_missing_pipe_is_an_io_error() {
        let dir = scratch_dir("missing");
        let err = watch(&pipe_path(&dir, 9), &mut Vec::new()).await.unwrap_err();
        assert_eq!(err.category(), "io");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_create_and_remove() {
        let dir = scratch_dir("pipes");
        let pipes = PipeSet::create(&dir, 3).unwrap();
        assert_eq!(pipes.paths().len(), 3);
        for path in pipes.paths() {
            assert!(path.exists());
        }
        // leftovers from an earlier run are fine
        let again = PipeSet::create(&dir, 3).unwrap();
        let paths = again.paths().to_vec();
        again.remove().await.unwrap();
        for path in &paths {
            assert!(!path.exists());
        }
        // removing twice is harmless
        pipes.remove().await.unwrap();
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_line_observer_through_fifo() {
        use std::os::unix::fs::FileTypeExt;

        let dir = scratch_dir("fifo");
        let pipes = PipeSet::create(&dir, 1).unwrap();
        let path = pipes.paths()[0].clone();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());

        let viewer = tokio::spawn(async move {
            let mut out = Vec::new();
            let copied = watch(&path, &mut out).await.unwrap();
            (copied, String::from_utf8(out).unwrap())
        });

        let observers = pipes.open_observers().await.unwrap();
        let snapshot = crate::table::Snapshot::new(0, vec![PhilState::Eating]);
        observers[0].publish(&snapshot).await.unwrap();
        observers[0].publish_termination().await.unwrap();

        let (copied, text) = viewer.await.unwrap();
        assert_eq!(copied, 1);
        assert_eq!(text, format!("{}\n", PhilState::Eating.sentence()));

        pipes.remove().await.unwrap();
        std::fs::remove_dir_all(dir).unwrap();
    }
}
