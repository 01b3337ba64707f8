//! Shell-syntax argument splitting.
//!
//! Flag strings such as `ansible_ssh_args` or `ansible_become_flags`, and the
//! final interpreter command, are written with POSIX shell quoting. These
//! helpers turn them into argument vectors.

use crate::error::{Error, Result};

/// Split a shell-syntax string into an argument vector.
///
/// An empty or whitespace-only string yields an empty vector.
///
/// # Example
///
/// ```rust
/// use rustible_transport::argv;
///
/// let args = argv::split("-o 'ProxyCommand=ssh -W %h:%p bastion'").unwrap();
/// assert_eq!(args, vec!["-o", "ProxyCommand=ssh -W %h:%p bastion"]);
/// ```
pub fn split(input: &str) -> Result<Vec<String>> {
    shell_words::split(input).map_err(|e| Error::Argv {
        input: input.to_string(),
        message: e.to_string(),
    })
}

/// Split several shell-syntax strings and flatten them into one vector.
///
/// Source order is preserved, absent sources are skipped, and empty tokens
/// (e.g. a quoted `''`) are dropped.
pub fn split_all<'a, I>(sources: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut args = Vec::new();
    for source in sources.into_iter().flatten() {
        if source.is_empty() {
            continue;
        }
        args.extend(split(source)?.into_iter().filter(|term| !term.is_empty()));
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        assert_eq!(split("-A -B").unwrap(), vec!["-A", "-B"]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split("").unwrap().is_empty());
        assert!(split("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split(r#"-H -S -n "-p sudo password:""#).unwrap(),
            vec!["-H", "-S", "-n", "-p sudo password:"]
        );
    }

    #[test]
    fn test_split_unbalanced_quote_is_error() {
        let err = split("-o 'unterminated").unwrap_err();
        assert!(matches!(err, Error::Argv { .. }));
    }

    #[test]
    fn test_split_all_preserves_order() {
        let args = split_all([Some("-A -B"), Some(""), Some("-C")]).unwrap();
        assert_eq!(args, vec!["-A", "-B", "-C"]);
    }

    #[test]
    fn test_split_all_skips_absent_and_empty_tokens() {
        let args = split_all([None, Some("'' -v"), None]).unwrap();
        assert_eq!(args, vec!["-v"]);
    }
}
