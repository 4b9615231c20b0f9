//! PGN parsing utilities: a lightweight regex-based parser.
//!
//! Only the mainline is kept: comments, NAGs and (nested) variations are
//! dropped before SAN tokens are extracted.

use std::sync::LazyLock;

use regex::Regex;

use crate::game_data::{GameMetadata, GameRecord};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).unwrap());

static HEADER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=?[QRBN])?[+#]?|[O0]-[O0]-[O0][+#]?|[O0]-[O0][+#]?")
        .unwrap()
});

/// Parse a PGN string into a GameRecord.
/// Returns None when the text has neither headers nor moves.
pub fn parse_pgn(pgn: &str) -> Option<GameRecord> {
    let mut metadata = GameMetadata {
        white: "Unknown".to_string(),
        black: "Unknown".to_string(),
        result: "*".to_string(),
        ..Default::default()
    };
    let mut saw_header = false;

    for cap in HEADER_RE.captures_iter(pgn) {
        saw_header = true;
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" => metadata.date = Some(value),
            "Event" => metadata.event = Some(value),
            "Site" => metadata.site = Some(value),
            "TimeControl" => metadata.time_control = Some(value),
            "ECO" => metadata.eco = Some(value),
            _ => {}
        }
    }

    let moves = extract_moves(pgn);
    if moves.is_empty() && !saw_header {
        return None;
    }

    Some(GameRecord {
        metadata,
        moves,
        pgn: pgn.to_string(),
    })
}

/// Extract mainline SAN moves from PGN text.
pub fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = HEADER_LINE_RE.replace_all(pgn, "");
    let mainline = strip_annotations(&no_headers);

    MOVE_RE
        .find_iter(&mainline)
        .map(|m| normalize_castling(m.as_str()))
        .collect()
}

/// Remove `{...}` comments, `;` line comments, `$n` NAGs and `(...)`
/// variations of any depth.
fn strip_annotations(movetext: &str) -> String {
    let mut out = String::with_capacity(movetext.len());
    let mut depth = 0usize;
    let mut in_comment = false;
    let mut in_line_comment = false;
    let mut in_nag = false;

    for c in movetext.chars() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push(' ');
            }
            continue;
        }
        if in_comment {
            if c == '}' {
                in_comment = false;
                out.push(' ');
            }
            continue;
        }
        if in_nag {
            if c.is_ascii_digit() {
                continue;
            }
            in_nag = false;
        }
        match c {
            '{' => in_comment = true,
            ';' => in_line_comment = true,
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(' ');
            }
            '$' if depth == 0 => in_nag = true,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

fn normalize_castling(token: &str) -> String {
    if token.starts_with('0') {
        token.replace('0', "O")
    } else {
        token.to_string()
    }
}
