//! Extraction of fenced shell snippets from model responses.

use once_cell::sync::Lazy;
use regex::Regex;

// Non-greedy body: each closing fence ends the nearest open block.
static SHELL_BLOCK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:sh|bash|shell|zsh)\b([\s\S]*?)```").unwrap());

/// Return every fenced shell block in `text`, trimmed, in order of appearance.
///
/// Blocks tagged with another language (or untagged) are ignored, as is an
/// opening fence that is never closed.
pub fn extract_codeblocks(text: &str) -> Vec<String> {
    SHELL_BLOCK_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
        .collect()
}

/// The final shell block in `text`, if any.
pub fn extract_last_codeblock(text: &str) -> Option<String> {
    SHELL_BLOCK_REGEX
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_blocks_in_order() {
        let text = "First:\n```sh\necho hi\n```\nthen\n```sh\nls -la\n```\n";
        assert_eq!(extract_codeblocks(text), vec!["echo hi", "ls -la"]);
    }

    #[test]
    fn test_multiline_block_is_kept_whole() {
        let text = "Here's some code:\n```sh\necho \"Hello, World!\"\nls -la\n```\nAnd another:\n```sh\ngrep \"pattern\" file.txt\n```";
        assert_eq!(
            extract_codeblocks(text),
            vec!["echo \"Hello, World!\"\nls -la", "grep \"pattern\" file.txt"]
        );
    }

    #[test]
    fn test_no_fenced_block() {
        assert!(extract_codeblocks("just prose, `inline` code").is_empty());
        assert!(extract_codeblocks("").is_empty());
    }

    #[test]
    fn test_ignores_other_languages() {
        let text = "```python\nprint(1)\n```\n```\nplain\n```\n```shellscript\nnope\n```";
        assert!(extract_codeblocks(text).is_empty());
    }

    #[test]
    fn test_accepts_bash_tag() {
        let text = "```bash\npwd\n```";
        assert_eq!(extract_codeblocks(text), vec!["pwd"]);
    }

    #[test]
    fn test_unclosed_fence_is_ignored() {
        let text = "```sh\necho done\n```\n```sh\nrm -rf /tmp/x";
        assert_eq!(extract_codeblocks(text), vec!["echo done"]);
    }

    #[test]
    fn test_last_codeblock() {
        let text = "```sh\na\n```\n```sh\nb\n```";
        assert_eq!(extract_last_codeblock(text).as_deref(), Some("b"));
        assert_eq!(extract_last_codeblock("none"), None);
    }
}
