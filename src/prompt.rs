//! Prompt assembly from command-line words, an optional file, and piped stdin.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

const ATTACHMENT_SEPARATOR: &str = " - use the following file contents:\n";

/// Read the attachment text: file contents first, then non-empty piped stdin.
///
/// Input is forwarded as-is; invalid UTF-8 is replaced rather than rejected.
pub fn read_attachment(file: Option<&Path>) -> Result<Option<String>> {
    let file_contents = file.map(read_file).transpose()?;

    let stdin_contents = if atty::isnt(atty::Stream::Stdin) {
        Some(read_lossy(std::io::stdin().lock()).context("Failed to read stdin")?)
    } else {
        None
    };

    Ok(join_attachment(file_contents, stdin_contents))
}

fn read_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_lossy<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Combine file and stdin text, joined by a newline when both are present.
fn join_attachment(file: Option<String>, stdin: Option<String>) -> Option<String> {
    let file = file.filter(|f| !f.is_empty());
    let stdin = stdin.filter(|s| !s.is_empty());
    match (file, stdin) {
        (Some(file), Some(stdin)) => Some(format!("{}\n{}", file, stdin)),
        (file, stdin) => file.or(stdin),
    }
}

/// Build the prompt, or `None` when there is nothing to send.
pub fn compose_prompt(words: &[String], attachment: Option<&str>) -> Option<String> {
    let mut prompt = words.join(" ");
    if let Some(content) = attachment.filter(|c| !c.is_empty()) {
        prompt.push_str(ATTACHMENT_SEPARATOR);
        prompt.push_str(content);
    }
    if prompt.is_empty() {
        None
    } else {
        Some(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn words(s: &[&str]) -> Vec<String> {
        s.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_words_only() {
        assert_eq!(
            compose_prompt(&words(&["write", "fizzbuzz"]), None),
            Some("write fizzbuzz".to_string())
        );
    }

    #[test]
    fn test_with_attachment() {
        assert_eq!(
            compose_prompt(&words(&["refactor"]), Some("fn a() {}")),
            Some("refactor - use the following file contents:\nfn a() {}".to_string())
        );
    }

    #[test]
    fn test_attachment_without_words() {
        assert_eq!(
            compose_prompt(&[], Some("x")),
            Some(" - use the following file contents:\nx".to_string())
        );
    }

    #[test]
    fn test_empty_prompt() {
        assert_eq!(compose_prompt(&[], None), None);
        assert_eq!(compose_prompt(&[], Some("")), None);
    }

    #[test]
    fn test_join_attachment() {
        assert_eq!(
            join_attachment(Some("file".into()), Some("piped".into())),
            Some("file\npiped".to_string())
        );
        assert_eq!(join_attachment(None, Some("piped".into())), Some("piped".to_string()));
        assert_eq!(join_attachment(Some("file".into()), Some(String::new())), Some("file".to_string()));
        assert_eq!(join_attachment(None, None), None);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read_attachment(Some(Path::new("/nonexistent/input.rs"))).is_err());
    }

    #[test]
    fn test_read_non_utf8_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9\n").unwrap();
        assert_eq!(read_file(file.path()).unwrap(), "caf\u{FFFD}\n");
    }

    #[test]
    fn test_read_non_utf8_stdin() {
        let piped: &[u8] = b"log \xff line";
        assert_eq!(read_lossy(piped).unwrap(), "log \u{FFFD} line");
    }
}
