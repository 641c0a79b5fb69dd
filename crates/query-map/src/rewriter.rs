//! Lexical substitution of table and field identifiers in raw query text.
//!
//! The rewriter never builds SQL from the parse tree; it edits the text the
//! user wrote. Text is split into quoted runs, words and single punctuation
//! characters so that substitutions only ever replace complete tokens.
//! A dotted run such as `session.status` or `"session"."status"` is one
//! token. Single-quoted runs are string literals and are left alone by field
//! substitution.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::resolver::quote_identifier;

/// Replacement of one logical table name with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSubstitution {
    pub logical: String,
    pub mapped: String,
}

/// Replacement of one field token with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSubstitution {
    pub token: String,
    pub mapped: String,
}

/// Query text after identifier substitution; the input of the second parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RewrittenQuery(String);

impl RewrittenQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RewrittenQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RewrittenQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Substitutes every field token, then every table name, in `raw`.
pub fn rewrite(
    raw: &str,
    tables: &[TableSubstitution],
    fields: &[FieldSubstitution],
) -> RewrittenQuery {
    rewrite_with_report(raw, tables, fields).query
}

/// Outcome of [`rewrite_with_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    pub query: RewrittenQuery,
    /// Field tokens that were never found as a whole token in the text.
    pub unmatched_fields: Vec<String>,
}

/// Like [`rewrite`], also reporting field substitutions that matched nothing.
pub fn rewrite_with_report(
    raw: &str,
    tables: &[TableSubstitution],
    fields: &[FieldSubstitution],
) -> RewriteReport {
    let (text, field_hits) = count_field_hits(raw, fields);
    let (text, table_hits) = substitute_tables(&text, tables);
    debug!(
        field_hits = field_hits.iter().sum::<usize>(),
        table_hits, "query text rewritten"
    );

    let unmatched_fields = fields
        .iter()
        .zip(&field_hits)
        .filter(|(_, &hits)| hits == 0)
        .map(|(field, _)| field.token.clone())
        .collect();
    RewriteReport {
        query: RewrittenQuery(text),
        unmatched_fields,
    }
}

/// Replaces whole-word field tokens. Backtick and double-quote wrappers around
/// a token, or around each part of a dotted token, are dropped and the mapped
/// id is written in store quoting.
pub fn substitute_fields(text: &str, fields: &[FieldSubstitution]) -> (String, usize) {
    let (out, hits) = count_field_hits(text, fields);
    (out, hits.into_iter().sum())
}

fn count_field_hits(text: &str, fields: &[FieldSubstitution]) -> (String, Vec<usize>) {
    let segments = lex(text);
    let mut out = String::with_capacity(text.len());
    let mut hits = vec![0; fields.len()];

    for (index, segment) in segments.iter().enumerate() {
        let replacement = match segment {
            Segment::Word(word) if !quote_adjacent(&segments, index) => lookup_field(fields, word),
            Segment::Dotted { token, .. } if !quote_adjacent(&segments, index) => {
                lookup_field(fields, token)
            }
            Segment::Quoted { quote, body, .. } if *quote != '\'' => lookup_field(fields, body),
            _ => None,
        };

        match replacement {
            Some(position) => {
                out.push_str(&quote_identifier(&fields[position].mapped));
                hits[position] += 1;
            }
            None => out.push_str(segment.raw()),
        }
    }
    (out, hits)
}

/// Replaces the table name in its double-quoted, backtick-quoted and bare
/// forms. A bare occurrence must follow whitespace and be followed by
/// whitespace, `;`, `)` or the end of the text.
///
/// A single-quoted name is only replaced directly after `FROM`; elsewhere it
/// is a string literal that happens to spell a table name
/// (`WHERE status = 'lead'`) and rewriting it would turn it into a column.
pub fn substitute_tables(text: &str, tables: &[TableSubstitution]) -> (String, usize) {
    let segments = lex(text);
    let mut out = String::with_capacity(text.len());
    let mut hits = 0;

    for (index, segment) in segments.iter().enumerate() {
        let replacement = match segment {
            Segment::Quoted { quote: '\'', body, .. } if follows_from(&segments, index) => {
                lookup_table(tables, body)
            }
            Segment::Quoted { quote, body, .. } if *quote != '\'' => lookup_table(tables, body),
            Segment::Word(word) if bare_table_position(&segments, index) => {
                lookup_table(tables, word)
            }
            _ => None,
        };

        match replacement {
            Some(mapped) => {
                out.push_str(&quote_identifier(mapped));
                hits += 1;
            }
            None => out.push_str(segment.raw()),
        }
    }
    (out, hits)
}

fn lookup_field(fields: &[FieldSubstitution], token: &str) -> Option<usize> {
    fields.iter().position(|field| field.token == token)
}

fn lookup_table<'a>(tables: &'a [TableSubstitution], name: &str) -> Option<&'a str> {
    tables
        .iter()
        .find(|table| table.logical == name)
        .map(|table| table.mapped.as_str())
}

fn quote_adjacent(segments: &[Segment<'_>], index: usize) -> bool {
    let before = index
        .checked_sub(1)
        .and_then(|i| segments.get(i))
        .is_some_and(Segment::is_quoted);
    let after = segments.get(index + 1).is_some_and(Segment::is_quoted);
    before || after
}

fn follows_from(segments: &[Segment<'_>], index: usize) -> bool {
    segments[..index]
        .iter()
        .rev()
        .find(|segment| !segment.is_whitespace())
        .is_some_and(|segment| {
            matches!(segment, Segment::Word(word) if word.eq_ignore_ascii_case("from"))
        })
}

fn bare_table_position(segments: &[Segment<'_>], index: usize) -> bool {
    let preceded = index
        .checked_sub(1)
        .and_then(|i| segments.get(i))
        .is_some_and(Segment::is_whitespace);
    let followed = match segments.get(index + 1) {
        None => true,
        Some(next) => next.is_whitespace() || matches!(next.raw(), ";" | ")"),
    };
    preceded && followed
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    /// A run enclosed in `'`, `"` or `` ` ``; `raw` includes the quotes.
    Quoted {
        quote: char,
        body: &'a str,
        raw: &'a str,
    },
    /// Identifier characters, starting with an identifier character.
    Word(&'a str),
    /// Identifier parts joined by `.`, any of them `"` or `` ` `` quoted.
    /// `token` is the parts unquoted and joined by `.`.
    Dotted { token: String, raw: &'a str },
    /// Any other single character, or an unterminated quoted tail.
    Other(&'a str),
}

impl<'a> Segment<'a> {
    fn raw(&self) -> &'a str {
        match *self {
            Segment::Quoted { raw, .. } | Segment::Dotted { raw, .. } => raw,
            Segment::Word(raw) | Segment::Other(raw) => raw,
        }
    }

    fn is_quoted(&self) -> bool {
        matches!(self, Segment::Quoted { .. })
    }

    fn is_whitespace(&self) -> bool {
        matches!(self, Segment::Other(raw) if raw.chars().all(char::is_whitespace))
    }
}

fn is_quote(ch: char) -> bool {
    matches!(ch, '\'' | '"' | '`')
}

fn is_identifier_quote(ch: char) -> bool {
    matches!(ch, '"' | '`')
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// One identifier part starting at byte `start`: a quoted run (returns the
/// unquoted body) or a run of word characters. `None` for an unterminated
/// quote.
fn scan_part(text: &str, start: usize) -> Option<(usize, &str)> {
    let mut chars = text[start..].char_indices().peekable();
    let (_, first) = chars.next()?;

    if is_quote(first) {
        while let Some((offset, next)) = chars.next() {
            if next != first {
                continue;
            }
            // A doubled quote is an escaped quote inside the run.
            if chars.peek().is_some_and(|&(_, after)| after == first) {
                chars.next();
                continue;
            }
            let end = start + offset + 1;
            return Some((end, &text[start + 1..end - 1]));
        }
        return None;
    }

    let mut end = start + first.len_utf8();
    while let Some(&(offset, next)) = chars.peek() {
        if !is_word_char(next) {
            break;
        }
        end = start + offset + next.len_utf8();
        chars.next();
    }
    Some((end, &text[start..end]))
}

fn starts_identifier_part(text: &str, at: usize) -> bool {
    text[at..]
        .chars()
        .next()
        .is_some_and(|ch| is_word_char(ch) || is_identifier_quote(ch))
}

fn lex(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut position = 0;

    while let Some(ch) = text[position..].chars().next() {
        let start = position;
        if ch == '\'' {
            match scan_part(text, start) {
                Some((end, body)) => {
                    segments.push(Segment::Quoted {
                        quote: ch,
                        body,
                        raw: &text[start..end],
                    });
                    position = end;
                }
                None => {
                    segments.push(Segment::Other(&text[start..]));
                    position = text.len();
                }
            }
            continue;
        }
        if !(is_word_char(ch) || is_identifier_quote(ch)) {
            position += ch.len_utf8();
            segments.push(Segment::Other(&text[start..position]));
            continue;
        }

        let Some((mut end, first)) = scan_part(text, start) else {
            segments.push(Segment::Other(&text[start..]));
            position = text.len();
            continue;
        };
        let mut parts = vec![first];
        while text[end..].starts_with('.') && starts_identifier_part(text, end + 1) {
            match scan_part(text, end + 1) {
                Some((next_end, part)) => {
                    parts.push(part);
                    end = next_end;
                }
                None => break,
            }
        }

        let raw = &text[start..end];
        segments.push(match *parts.as_slice() {
            [body] if is_identifier_quote(ch) => Segment::Quoted {
                quote: ch,
                body,
                raw,
            },
            [word] => Segment::Word(word),
            _ => Segment::Dotted {
                token: parts.join("."),
                raw,
            },
        });
        position = end;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(logical: &str, mapped: &str) -> TableSubstitution {
        TableSubstitution {
            logical: logical.into(),
            mapped: mapped.into(),
        }
    }

    fn field(token: &str, mapped: &str) -> FieldSubstitution {
        FieldSubstitution {
            token: token.into(),
            mapped: mapped.into(),
        }
    }

    fn lead_fields() -> Vec<FieldSubstitution> {
        vec![field("id", "f1"), field("status", "f2")]
    }

    #[test]
    fn rewrites_simple_select() {
        let rewritten = rewrite(
            "SELECT id, status FROM lead WHERE status = 'open';",
            &[table("lead", "leads_tbl")],
            &lead_fields(),
        );
        assert_eq!(
            rewritten.as_str(),
            "SELECT `f1`, `f2` FROM `leads_tbl` WHERE `f2` = 'open';"
        );
    }

    #[test]
    fn table_forms_are_all_replaced() {
        let tables = [table("lead", "leads_tbl")];
        for (input, expected) in [
            ("SELECT a FROM \"lead\"", "SELECT a FROM `leads_tbl`"),
            ("SELECT a FROM `lead`", "SELECT a FROM `leads_tbl`"),
            ("SELECT a FROM 'lead'", "SELECT a FROM `leads_tbl`"),
            ("SELECT a FROM lead WHERE", "SELECT a FROM `leads_tbl` WHERE"),
            ("SELECT a FROM lead;", "SELECT a FROM `leads_tbl`;"),
            ("SELECT a FROM lead", "SELECT a FROM `leads_tbl`"),
            ("SELECT (SELECT a FROM lead)", "SELECT (SELECT a FROM `leads_tbl`)"),
        ] {
            assert_eq!(substitute_tables(input, &tables).0, expected, "{input}");
        }
    }

    #[test]
    fn similar_table_names_are_untouched() {
        let (text, hits) = substitute_tables(
            "SELECT leads_total, lead_id FROM lead",
            &[table("lead", "leads_tbl")],
        );
        assert_eq!(text, "SELECT leads_total, lead_id FROM `leads_tbl`");
        assert_eq!(hits, 1);
    }

    #[test]
    fn fields_match_whole_words_only() {
        let (text, hits) = substitute_fields("SELECT id, lead_id, idx, id2 FROM t", &lead_fields());
        assert_eq!(text, "SELECT `f1`, lead_id, idx, id2 FROM t");
        assert_eq!(hits, 1);
    }

    #[test]
    fn identifier_quotes_are_stripped_before_substitution() {
        let (text, _) = substitute_fields("SELECT `id`, \"status\" FROM t", &lead_fields());
        assert_eq!(text, "SELECT `f1`, `f2` FROM t");
    }

    #[test]
    fn string_literals_are_not_rewritten() {
        let (text, _) = substitute_fields(
            "SELECT id FROM t WHERE status = 'status' AND note = 'it''s id'",
            &lead_fields(),
        );
        assert_eq!(
            text,
            "SELECT `f1` FROM t WHERE `f2` = 'status' AND note = 'it''s id'"
        );
    }

    #[test]
    fn quote_adjacent_words_are_skipped() {
        let (text, hits) = substitute_fields("SELECT `x`id FROM t", &lead_fields());
        assert_eq!(text, "SELECT `x`id FROM t");
        assert_eq!(hits, 0);
    }

    #[test]
    fn dotted_tokens_are_single_words() {
        let fields = vec![
            field("status", "f2"),
            field("session_detail.status", "tpl_sd.sd1"),
        ];
        let (text, _) = substitute_fields(
            "SELECT status, session_detail.status FROM t",
            &fields,
        );
        assert_eq!(text, "SELECT `f2`, `tpl_sd.sd1` FROM t");
    }

    #[test]
    fn quoted_dotted_parts_form_one_token() {
        let fields = vec![field("session.status", "tpl_s.s1")];
        for input in [
            "SELECT \"session\".\"status\" FROM t",
            "SELECT `session`.status FROM t",
            "SELECT session.`status` FROM t",
        ] {
            let (text, hits) = substitute_fields(input, &fields);
            assert_eq!(text, "SELECT `tpl_s.s1` FROM t", "{input}");
            assert_eq!(hits, 1, "{input}");
        }
    }

    #[test]
    fn report_lists_fields_that_matched_nothing() {
        let report = rewrite_with_report(
            "SELECT id, session . status FROM lead",
            &[table("lead", "leads_tbl")],
            &[field("id", "f1"), field("session.status", "tpl_s.s1")],
        );
        assert_eq!(
            report.query.as_str(),
            "SELECT `f1`, session . status FROM `leads_tbl`"
        );
        assert_eq!(report.unmatched_fields, vec!["session.status"]);
    }

    #[test]
    fn string_literal_spelling_a_table_is_kept() {
        let tables = [table("lead", "leads_tbl")];
        let (text, hits) = substitute_tables("SELECT a FROM lead WHERE kind = 'lead'", &tables);
        assert_eq!(text, "SELECT a FROM `leads_tbl` WHERE kind = 'lead'");
        assert_eq!(hits, 1);

        let (text, _) = substitute_tables("SELECT a FROM  'lead' WHERE kind = 'lead'", &tables);
        assert_eq!(text, "SELECT a FROM  `leads_tbl` WHERE kind = 'lead'");
    }

    #[test]
    fn rewriting_is_idempotent() {
        let tables = [table("lead", "leads_tbl")];
        let fields = lead_fields();
        let once = rewrite(
            "SELECT id, \"status\" FROM lead WHERE id IN (1, 2) ORDER BY status DESC;",
            &tables,
            &fields,
        );
        let twice = rewrite(once.as_str(), &tables, &fields);
        assert_eq!(once, twice);
    }

    #[test]
    fn multibyte_text_survives() {
        let (text, _) = substitute_fields("SELECT id FROM t WHERE name = 'é id ü' -- ñ", &lead_fields());
        assert_eq!(text, "SELECT `f1` FROM t WHERE name = 'é id ü' -- ñ");
    }

    #[test]
    fn unterminated_quotes_are_copied_verbatim() {
        let (text, _) = substitute_fields("SELECT id FROM t WHERE x = 'id", &lead_fields());
        assert_eq!(text, "SELECT `f1` FROM t WHERE x = 'id");
    }
}
