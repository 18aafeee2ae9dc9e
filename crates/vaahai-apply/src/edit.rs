//! Line-anchored replacement of a code block inside file contents.
//!
//! `original` must match the file exactly, line for line, starting at the
//! 1-based `line_number`. Lines are compared with their terminators
//! stripped so CRLF files match LF snippets. Replacement lines take the
//! terminator style of the first replaced line, and the file keeps (or
//! keeps lacking) its trailing newline.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("line {line} is out of range (file has {total} lines, block needs {needed})")]
    LineOutOfRange {
        line: usize,
        needed: usize,
        total: usize,
    },

    #[error("line {line} does not match: expected {expected:?}, found {found:?}")]
    Mismatch {
        line: usize,
        expected: String,
        found: String,
    },
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn locate(lines: &[&str], line_number: usize, original: &str) -> Result<usize, EditError> {
    let expected: Vec<&str> = original.lines().collect();
    let start = line_number.saturating_sub(1);
    let past_end = start
        .checked_add(expected.len())
        .map_or(true, |end| end > lines.len());
    if line_number == 0 || expected.is_empty() || past_end {
        return Err(EditError::LineOutOfRange {
            line: line_number,
            needed: expected.len(),
            total: lines.len(),
        });
    }

    for (offset, want) in expected.iter().enumerate() {
        let (found, _) = split_terminator(lines[start + offset]);
        if found != *want {
            return Err(EditError::Mismatch {
                line: line_number + offset,
                expected: (*want).to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(expected.len())
}

/// Replace the block `original` at `line_number` with `suggested`.
///
/// An empty `suggested` deletes the block.
pub fn replace_block(
    content: &str,
    line_number: usize,
    original: &str,
    suggested: &str,
) -> Result<String, EditError> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let count = locate(&lines, line_number, original)?;
    let start = line_number - 1;
    let end = start + count;

    let (_, first_term) = split_terminator(lines[start]);
    let (_, last_term) = split_terminator(lines[end - 1]);
    let eol = match first_term {
        "" if content.contains("\r\n") => "\r\n",
        "" => "\n",
        term => term,
    };

    let mut out = String::with_capacity(content.len() + suggested.len());
    for line in &lines[..start] {
        out.push_str(line);
    }

    let replacement: Vec<&str> = suggested.lines().collect();
    for (i, line) in replacement.iter().enumerate() {
        out.push_str(line);
        out.push_str(if i + 1 == replacement.len() { last_term } else { eol });
    }

    for line in &lines[end..] {
        out.push_str(line);
    }

    // Deleting the final lines of a file without a trailing newline must not
    // leave one behind on the new last line.
    if !content.ends_with('\n') && end == lines.len() && replacement.is_empty() {
        if let Some(stripped) = out.strip_suffix("\r\n").or_else(|| out.strip_suffix('\n')) {
            out.truncate(stripped.len());
        }
    }

    Ok(out)
}
