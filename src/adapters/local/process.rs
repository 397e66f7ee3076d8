//! Line-by-line reading of a child process's stdout and stderr.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout};

/// Interleaves the lines of two readers in the order they become available.
pub struct MergedLines<O, E> {
    stdout: Option<Lines<O>>,
    stderr: Option<Lines<E>>,
}

enum Source {
    Stdout,
    Stderr,
}

impl MergedLines<BufReader<ChildStdout>, BufReader<ChildStderr>> {
    /// Takes both pipes of `child`. Either one may be missing.
    pub fn from_child(child: &mut Child) -> Self {
        Self {
            stdout: child.stdout.take().map(|out| BufReader::new(out).lines()),
            stderr: child.stderr.take().map(|err| BufReader::new(err).lines()),
        }
    }
}

impl<O, E> MergedLines<O, E>
where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    pub fn new(stdout: O, stderr: E) -> Self {
        Self {
            stdout: Some(stdout.lines()),
            stderr: Some(stderr.lines()),
        }
    }

    /// Next line from whichever stream has one. `None` once both are closed.
    /// Read errors close the stream they happened on.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            let (source, line) = match (self.stdout.as_mut(), self.stderr.as_mut()) {
                (None, None) => return None,
                (Some(out), None) => (Source::Stdout, out.next_line().await),
                (None, Some(err)) => (Source::Stderr, err.next_line().await),
                (Some(out), Some(err)) => tokio::select! {
                    line = out.next_line() => (Source::Stdout, line),
                    line = err.next_line() => (Source::Stderr, line),
                },
            };

            match line {
                Ok(Some(line)) => return Some(line),
                Ok(None) | Err(_) => match source {
                    Source::Stdout => self.stdout = None,
                    Source::Stderr => self.stderr = None,
                },
            }
        }
    }
}
