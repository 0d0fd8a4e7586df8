//! Buckets the comments found in one trivia run into the
//! leading/trailing/detached scheme used by `source_code_info`.
//!
//! The attachment rule: a comment on the same line as the previous token is
//! that token's trailing comment; remaining comment groups belong to the
//! next token, with groups separated from it by a blank line detached.

#[derive(Debug, Default, PartialEq)]
pub(crate) struct TriviaComments {
    pub trailing_for_previous: Option<String>,
    pub detached: Vec<String>,
    pub leading: Option<String>,
}

struct RawComment<'a> {
    text: &'a str,
    is_block: bool,
    newlines_before: usize,
}

pub(crate) fn split_trivia(trivia: &str, had_previous_token: bool) -> TriviaComments {
    let (comments, newlines_after) = scan(trivia);
    let mut result = TriviaComments::default();
    if comments.is_empty() {
        return result;
    }

    let mut comments = &comments[..];
    if had_previous_token && comments[0].newlines_before == 0 {
        result.trailing_for_previous = Some(normalize(&comments[0]));
        comments = &comments[1..];
    }

    // Group consecutive line comments on adjacent lines; block comments
    // stand alone.
    let mut groups: Vec<(String, bool)> = Vec::new();
    for comment in comments {
        let new_group = match groups.last() {
            None => true,
            Some((_, prev_was_block)) => {
                comment.newlines_before >= 2 || comment.is_block || *prev_was_block
            }
        };
        if new_group {
            groups.push((normalize(comment), comment.is_block));
        } else {
            let (text, _) = groups.last_mut().unwrap();
            text.push_str(&normalize(comment));
        }
    }

    if let Some((last, _)) = groups.pop() {
        if newlines_after < 2 {
            result.leading = Some(last);
        } else {
            groups.push((last, false));
        }
    }
    result.detached = groups.into_iter().map(|(text, _)| text).collect();
    result
}

fn scan(trivia: &str) -> (Vec<RawComment<'_>>, usize) {
    let bytes = trivia.as_bytes();
    let mut comments = Vec::new();
    let mut newlines = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                newlines += 1;
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = trivia[i..]
                    .find('\n')
                    .map(|n| i + n)
                    .unwrap_or(trivia.len());
                comments.push(RawComment {
                    text: &trivia[i..end],
                    is_block: false,
                    newlines_before: newlines,
                });
                newlines = 0;
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = trivia[i + 2..]
                    .find("*/")
                    .map(|n| i + 2 + n + 2)
                    .unwrap_or(trivia.len());
                comments.push(RawComment {
                    text: &trivia[i..end],
                    is_block: true,
                    newlines_before: newlines,
                });
                newlines = 0;
                i = end;
            }
            _ => i += 1,
        }
    }
    (comments, newlines)
}

fn normalize(comment: &RawComment) -> String {
    if comment.is_block {
        comment
            .text
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .to_owned()
    } else {
        let mut text = comment.text.trim_start_matches("//").to_owned();
        text.push('\n');
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trivia() {
        assert_eq!(split_trivia("  \n\n  ", true), TriviaComments::default());
    }

    #[test]
    fn trailing_same_line() {
        let result = split_trivia(" // done\n", true);
        assert_eq!(result.trailing_for_previous.as_deref(), Some(" done\n"));
        assert_eq!(result.leading, None);
    }

    #[test]
    fn trailing_not_stolen_at_file_start() {
        let result = split_trivia("// first\n", false);
        assert_eq!(result.trailing_for_previous, None);
        assert_eq!(result.leading.as_deref(), Some(" first\n"));
    }

    #[test]
    fn leading_group_joins_adjacent_lines() {
        let result = split_trivia("\n// a\n// b\n", true);
        assert_eq!(result.trailing_for_previous, None);
        assert!(result.detached.is_empty());
        assert_eq!(result.leading.as_deref(), Some(" a\n b\n"));
    }

    #[test]
    fn blank_line_detaches_group() {
        let result = split_trivia("\n// far\n\n// near\n", true);
        assert_eq!(result.detached, vec![" far\n".to_owned()]);
        assert_eq!(result.leading.as_deref(), Some(" near\n"));
    }

    #[test]
    fn group_separated_from_token_is_detached() {
        let result = split_trivia("\n// far\n\n", true);
        assert_eq!(result.detached, vec![" far\n".to_owned()]);
        assert_eq!(result.leading, None);
    }

    #[test]
    fn block_comment_stands_alone() {
        let result = split_trivia("\n// a\n/* b */\n", true);
        assert_eq!(result.detached, vec![" a\n".to_owned()]);
        assert_eq!(result.leading.as_deref(), Some(" b "));
    }

    #[test]
    fn trailing_then_leading() {
        let result = split_trivia(" // trail\n// lead\n", true);
        assert_eq!(result.trailing_for_previous.as_deref(), Some(" trail\n"));
        assert_eq!(result.leading.as_deref(), Some(" lead\n"));
    }
}
