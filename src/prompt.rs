//! Asking a human for a line of text.
//!
//! The library never reads the console directly: captcha solving and the
//! standalone authorization flow go through [`Prompter`]. The binary wires
//! in [`StdinPrompter`]; tests script their own answers.

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One buffered reader over the process's stdin, shared by every prompt so
/// lines read ahead from piped input stay available to the next question.
static STDIN: LazyLock<Mutex<BufReader<Stdin>>> =
    LazyLock::new(|| Mutex::new(BufReader::new(tokio::io::stdin())));

/// Errors from a [`Prompter`].
#[derive(Debug, Error)]
pub enum PromptError {
    /// The caller cancelled while waiting for an answer.
    #[error("prompt cancelled")]
    Cancelled,

    /// Reading the answer failed.
    #[error("failed to read answer: {0}")]
    Io(#[from] std::io::Error),

    /// Input ended or the answer was blank.
    #[error("no answer given")]
    Empty,
}

/// Asks a human a question and returns the trimmed answer.
#[async_trait]
pub trait Prompter: Send + Sync + fmt::Debug {
    /// Shows `question` and waits for a non-empty answer.
    async fn ask(&self, cancel: &CancellationToken, question: &str) -> Result<String, PromptError>;
}

/// Prompts on stderr and reads one line from stdin.
///
/// Prompts are asked one at a time; concurrent questions wait their turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, cancel: &CancellationToken, question: &str) -> Result<String, PromptError> {
        let mut reader = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PromptError::Cancelled),
            reader = STDIN.lock() => reader,
        };
        ask_line(&mut *reader, &mut tokio::io::stderr(), cancel, question).await
    }
}

/// Writes `question` to `out` and reads one trimmed, non-empty line.
async fn ask_line<R, W>(
    reader: &mut R,
    out: &mut W,
    cancel: &CancellationToken,
    question: &str,
) -> Result<String, PromptError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    out.write_all(question.as_bytes()).await?;
    out.write_all(b" ").await?;
    out.flush().await?;

    let mut line = String::new();
    let read = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(PromptError::Cancelled),
        read = reader.read_line(&mut line) => read?,
    };

    let answer = line.trim();
    if read == 0 || answer.is_empty() {
        return Err(PromptError::Empty);
    }
    Ok(answer.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_lines_survive_between_questions() {
        let mut reader = BufReader::new(&b"first\n  second  \n"[..]);
        let mut out = Vec::new();
        let cancel = CancellationToken::new();

        let first = ask_line(&mut reader, &mut out, &cancel, "One?").await.unwrap();
        let second = ask_line(&mut reader, &mut out, &cancel, "Two?").await.unwrap();
        assert_eq!(first, "first");
        assert_eq!(second, "second");
        assert_eq!(out, b"One? Two? ");

        let third = ask_line(&mut reader, &mut out, &cancel, "Three?").await;
        assert!(matches!(third, Err(PromptError::Empty)));
    }

    #[tokio::test]
    async fn test_cancelled_before_answer() {
        let mut reader = BufReader::new(&b"answer\n"[..]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = ask_line(&mut reader, &mut Vec::new(), &cancel, "Q?").await;
        assert!(matches!(result, Err(PromptError::Cancelled)));
    }
}
