//! Integer expression evaluator for script text.
//!
//! Parses C-like integer expressions from the start of a string and reports
//! how many bytes were consumed. A value directly followed by a letter or a
//! `.` is not a number, so identifiers and floating point literals are left
//! alone. Failure means "not an expression here": callers copy such text
//! unchanged.
//!
//! Operators, from tightest to loosest binding:
//!
//! | Operators            | Meaning                                  |
//! |----------------------|------------------------------------------|
//! | `+ - ~ !` (unary)    | sign, bitwise not, logical not           |
//! | `#"text"`            | length of a quoted string                |
//! | `**`                 | power (negative exponent yields 0)       |
//! | `* / %`              | division and modulo by 0 yield 0         |
//! | `+ -`                |                                          |
//! | `<< >> >>>`          | `>>>` shifts in zeros                    |
//! | `<? >?`              | minimum, maximum                         |
//! | `<=>`                | three-way compare (-1, 0, 1)             |
//! | `< <= > >=`          |                                          |
//! | `== !=`              |                                          |
//! | `&& \|\|`            |                                          |
//! | `&`                  |                                          |
//! | `^`                  |                                          |
//! | `\|`                 |                                          |
//! | `?:`                 | `a ?: b` is `a` unless it is 0           |
//! | `? :`                | conditional, branches default to 1 and 0 |
//!
//! Arithmetic wraps on overflow.

use std::fmt;

/// Binary operators, longest spelling first so that matching is greedy.
const OPERATORS: &[(&str, Op)] = &[
    (">>>", Op::ShiftRightLogical),
    ("<=>", Op::Compare),
    ("**", Op::Pow),
    ("<<", Op::ShiftLeft),
    (">>", Op::ShiftRight),
    ("<?", Op::Min),
    (">?", Op::Max),
    ("<=", Op::LessEqual),
    (">=", Op::GreaterEqual),
    ("==", Op::Equal),
    ("!=", Op::NotEqual),
    ("&&", Op::And),
    ("||", Op::Or),
    ("?:", Op::Elvis),
    ("*", Op::Mul),
    ("/", Op::Div),
    ("%", Op::Rem),
    ("+", Op::Add),
    ("-", Op::Sub),
    ("<", Op::Less),
    (">", Op::Greater),
    ("&", Op::BitAnd),
    ("^", Op::BitXor),
    ("|", Op::BitOr),
    ("?", Op::Conditional),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Pow,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    ShiftLeft,
    ShiftRight,
    ShiftRightLogical,
    Min,
    Max,
    Compare,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Equal,
    NotEqual,
    And,
    Or,
    BitAnd,
    BitXor,
    BitOr,
    Elvis,
    Conditional,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Self::Pow => 14,
            Self::Mul | Self::Div | Self::Rem => 13,
            Self::Add | Self::Sub => 12,
            Self::ShiftLeft | Self::ShiftRight | Self::ShiftRightLogical => 11,
            Self::Min | Self::Max => 10,
            Self::Compare => 9,
            Self::LessEqual | Self::GreaterEqual | Self::Less | Self::Greater => 8,
            Self::Equal | Self::NotEqual => 7,
            Self::And | Self::Or => 6,
            Self::BitAnd => 5,
            Self::BitXor => 4,
            Self::BitOr => 3,
            Self::Elvis => 2,
            Self::Conditional => 1,
        }
    }

    fn apply(self, a: i64, b: i64) -> i64 {
        // Shift counts wrap at the word size.
        let shift = u32::try_from(b & 63).unwrap_or(0);
        match self {
            Self::Pow => power(a, b),
            Self::Mul => a.wrapping_mul(b),
            Self::Div if b == 0 => 0,
            Self::Div => a.wrapping_div(b),
            Self::Rem if b == 0 => 0,
            Self::Rem => a.wrapping_rem(b),
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::ShiftLeft => a.wrapping_shl(shift),
            Self::ShiftRight => a.wrapping_shr(shift),
            Self::ShiftRightLogical => ((a as u64) >> shift) as i64,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Compare => a.cmp(&b) as i64,
            Self::LessEqual => i64::from(a <= b),
            Self::GreaterEqual => i64::from(a >= b),
            Self::Less => i64::from(a < b),
            Self::Greater => i64::from(a > b),
            Self::Equal => i64::from(a == b),
            Self::NotEqual => i64::from(a != b),
            Self::And => i64::from(a != 0 && b != 0),
            Self::Or => i64::from(a != 0 || b != 0),
            Self::BitAnd => a & b,
            Self::BitXor => a ^ b,
            Self::BitOr => a | b,
            Self::Elvis if a == 0 => b,
            Self::Elvis => a,
            // Handled by the parser, which needs both branches.
            Self::Conditional => a,
        }
    }
}

fn power(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return 0;
    }
    base.wrapping_pow(u32::try_from(exp).unwrap_or(u32::MAX))
}

/// Cursor over expression text.
struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consume one of `seps` after optional whitespace.
    fn separator(&mut self, seps: &[u8]) -> Option<u8> {
        let save = self.pos;
        self.skip_space();
        match self.peek() {
            Some(c) if seps.contains(&c) => {
                self.pos += 1;
                Some(c)
            }
            _ => {
                self.pos = save;
                None
            }
        }
    }

    fn expression(&mut self) -> Option<i64> {
        self.binary(1)
    }

    /// An expression, or `None` with the cursor left where it was.
    fn optional_expression(&mut self) -> Option<i64> {
        let save = self.pos;
        let value = self.expression();
        if value.is_none() {
            self.pos = save;
        }
        value
    }

    fn binary(&mut self, min_precedence: u8) -> Option<i64> {
        let mut value = self.value()?;
        loop {
            let save = self.pos;
            self.skip_space();
            let Some((len, op)) = self.operator() else {
                self.pos = save;
                break;
            };
            if op.precedence() < min_precedence {
                self.pos = save;
                break;
            }
            self.pos += len;

            if op == Op::Conditional {
                return Some(self.conditional(value));
            }
            let rhs = self.binary(op.precedence() + 1)?;
            value = op.apply(value, rhs);
        }
        Some(value)
    }

    /// Branches of `cond ? then : else`; the rest of the text belongs to them.
    fn conditional(&mut self, condition: i64) -> i64 {
        let Some(then) = self.optional_expression() else {
            return i64::from(condition != 0);
        };
        let mut otherwise = 0;
        if self.separator(b":").is_some() {
            otherwise = self.optional_expression().unwrap_or(0);
        }
        if condition != 0 { then } else { otherwise }
    }

    fn operator(&self) -> Option<(usize, Op)> {
        let rest = self.rest();
        if !rest.as_bytes().first()?.is_ascii_punctuation() {
            return None;
        }
        // `?` and `:` may be spaced apart in `a ? : b`.
        if let Some(after) = rest.strip_prefix('?') {
            let colon = after.trim_start_matches(|c: char| c.is_ascii_whitespace());
            if colon.starts_with(':') {
                return Some((rest.len() - colon.len() + 1, Op::Elvis));
            }
        }
        OPERATORS
            .iter()
            .find(|(spelling, _)| rest.starts_with(spelling))
            .map(|(spelling, op)| (spelling.len(), *op))
    }

    fn value(&mut self) -> Option<i64> {
        self.skip_space();
        match self.peek()? {
            op @ (b'+' | b'-' | b'~' | b'!') => {
                self.pos += 1;
                let v = self.value()?;
                Some(match op {
                    b'-' => v.wrapping_neg(),
                    b'~' => !v,
                    b'!' => i64::from(v == 0),
                    _ => v,
                })
            }
            b'(' => {
                self.pos += 1;
                let v = self.expression()?;
                self.skip_space();
                if self.peek() != Some(b')') {
                    return None;
                }
                self.pos += 1;
                Some(v)
            }
            b'#' => {
                self.pos += 1;
                self.skip_space();
                let (len, literal) = parse_string(self.rest())?;
                self.pos += len;
                i64::try_from(literal.len()).ok()
            }
            _ => self.number(),
        }
    }

    /// Decimal, `0x` hexadecimal or `0` octal literal.
    ///
    /// Literals beyond the `i64` range saturate to `i64::MAX`, the way
    /// `strtol` clamps.
    fn number(&mut self) -> Option<i64> {
        let bytes = self.rest().as_bytes();
        let (radix, skip) = match bytes {
            [b'0', b'x' | b'X', c, ..] if c.is_ascii_hexdigit() => (16, 2),
            [b'0', ..] => (8, 0),
            [c, ..] if c.is_ascii_digit() => (10, 0),
            _ => return None,
        };
        let digits = bytes[skip..]
            .iter()
            .take_while(|c| char::from(**c).is_digit(radix))
            .count();
        let end = skip + digits;

        if bytes
            .get(end)
            .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'.')
        {
            return None;
        }

        let text = &self.rest()[skip..end];
        let value = i64::from_str_radix(text, radix).unwrap_or(i64::MAX);
        self.pos += end;
        Some(value)
    }
}

/// Parse an expression at the start of `text`.
///
/// Returns the number of bytes consumed (leading whitespace included,
/// trailing whitespace excluded) and the value, or `None` when `text` does
/// not start with an expression. Integer literals too large for `i64`
/// saturate to `i64::MAX`.
///
/// ```
/// use require_core::expr::parse_expression;
///
/// assert_eq!(parse_expression("1+2*3 rest"), Some((5, 7)));
/// assert_eq!(parse_expression("7/0"), Some((3, 0)));
/// assert_eq!(parse_expression("3.14"), None);
/// assert_eq!(parse_expression("abc"), None);
/// ```
pub fn parse_expression(text: &str) -> Option<(usize, i64)> {
    let mut parser = Parser::new(text);
    let value = parser.expression()?;
    Some((parser.pos, value))
}

/// Evaluate `text` as a single expression; trailing text other than
/// whitespace makes it fail.
pub fn evaluate(text: &str) -> Option<i64> {
    let (len, value) = parse_expression(text)?;
    text[len..].trim().is_empty().then_some(value)
}

/// A `printf`-style integer conversion: `%[flags][width]conversion` with
/// flags from ` #-+0` and conversions from `diouxXc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntFormat {
    pub left_align: bool,
    pub plus_sign: bool,
    pub space_sign: bool,
    pub alternate: bool,
    pub zero_pad: bool,
    pub width: usize,
    pub conversion: char,
}

impl IntFormat {
    /// Parse a format at the start of `text`, returning it and its length.
    pub fn parse(text: &str) -> Option<(Self, usize)> {
        let bytes = text.as_bytes();
        if bytes.first() != Some(&b'%') {
            return None;
        }
        let mut format = Self::default();
        let mut pos = 1;
        while let Some(flag) = bytes.get(pos).filter(|c| b" #-+0".contains(*c)) {
            match flag {
                b'-' => format.left_align = true,
                b'+' => format.plus_sign = true,
                b' ' => format.space_sign = true,
                b'#' => format.alternate = true,
                _ => format.zero_pad = true,
            }
            pos += 1;
        }
        while let Some(digit) = bytes.get(pos).filter(|c| c.is_ascii_digit()) {
            format.width = format
                .width
                .saturating_mul(10)
                .saturating_add(usize::from(digit - b'0'));
            pos += 1;
        }
        let conversion = *bytes.get(pos).filter(|c| b"diouxXc".contains(*c))?;
        format.conversion = char::from(conversion);
        Some((format, pos + 1))
    }

    /// Render `value` through this format.
    pub fn render(&self, value: i64) -> String {
        let unsigned = value as u64;
        let (sign, prefix, body) = match self.conversion {
            'd' | 'i' => {
                let sign = if value < 0 {
                    "-"
                } else if self.plus_sign {
                    "+"
                } else if self.space_sign {
                    " "
                } else {
                    ""
                };
                (sign, "", value.unsigned_abs().to_string())
            }
            'o' => {
                let body = format!("{unsigned:o}");
                let prefix = if self.alternate && !body.starts_with('0') {
                    "0"
                } else {
                    ""
                };
                ("", prefix, body)
            }
            'x' => ("", self.hex_prefix(value, "0x"), format!("{unsigned:x}")),
            'X' => ("", self.hex_prefix(value, "0X"), format!("{unsigned:X}")),
            'c' => {
                let text = char::from(value as u8).to_string();
                return self.pad("", "", &text, false);
            }
            _ => ("", "", unsigned.to_string()),
        };
        self.pad(sign, prefix, &body, self.zero_pad)
    }

    fn hex_prefix(&self, value: i64, prefix: &'static str) -> &'static str {
        if self.alternate && value != 0 { prefix } else { "" }
    }

    fn pad(&self, sign: &str, prefix: &str, body: &str, zero_pad: bool) -> String {
        let len = sign.len() + prefix.len() + body.chars().count();
        let fill = self.width.saturating_sub(len);
        if self.left_align {
            format!("{sign}{prefix}{body}{}", " ".repeat(fill))
        } else if zero_pad {
            format!("{sign}{prefix}{}{body}", "0".repeat(fill))
        } else {
            format!("{}{sign}{prefix}{body}", " ".repeat(fill))
        }
    }
}

impl fmt::Display for IntFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("%")?;
        for (set, flag) in [
            (self.space_sign, ' '),
            (self.alternate, '#'),
            (self.left_align, '-'),
            (self.plus_sign, '+'),
            (self.zero_pad, '0'),
        ] {
            if set {
                write!(f, "{flag}")?;
            }
        }
        if self.width > 0 {
            write!(f, "{}", self.width)?;
        }
        write!(f, "{}", self.conversion)
    }
}

/// Parse a format followed by an expression, returning the consumed length
/// and the rendered value.
///
/// ```
/// use require_core::expr::parse_formatted;
///
/// assert_eq!(parse_formatted("%04x 255"), Some((8, "00ff".to_string())));
/// assert_eq!(parse_formatted("%q 1"), None);
/// ```
pub fn parse_formatted(text: &str) -> Option<(usize, String)> {
    let (format, len) = IntFormat::parse(text)?;
    let (expr_len, value) = parse_expression(&text[len..])?;
    Some((len + expr_len, format.render(value)))
}

/// A quoted string literal after slicing.
///
/// Each character is kept as written, so an escaped character stays a
/// backslash pair and counts as one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    quote: char,
    chars: Vec<String>,
}

impl StringLiteral {
    /// Number of characters, escapes counting as one.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Contents with escapes kept as written.
    pub fn raw(&self) -> String {
        self.chars.concat()
    }

    /// Contents with backslashes removed.
    pub fn value(&self) -> String {
        self.chars
            .iter()
            .map(|c| c.strip_prefix('\\').unwrap_or(c))
            .collect()
    }

    /// Contents re-quoted with the original quote character.
    pub fn quoted(&self) -> String {
        format!("{q}{}{q}", self.raw(), q = self.quote)
    }

    fn slice(&mut self, start: usize, len: usize) {
        self.chars.truncate(start + len);
        self.chars.drain(..start);
    }
}

/// Parse a quoted string at the start of `text`, followed by any number of
/// `[start]`, `[start,length]` or `[start:end]` slices.
///
/// Negative indices count from the end. Out of range slices are clamped and
/// may yield an empty string. An unterminated string runs to the end.
///
/// ```
/// use require_core::expr::parse_string;
///
/// let (len, s) = parse_string("'abcdef'[1:-1] tail").unwrap();
/// assert_eq!((len, s.raw().as_str()), (14, "bcde"));
/// ```
pub fn parse_string(text: &str) -> Option<(usize, StringLiteral)> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let mut chars = Vec::new();
    let mut pos = quote.len_utf8();
    let mut iter = text[pos..].chars();
    while let Some(c) = iter.next() {
        pos += c.len_utf8();
        if c == quote {
            break;
        }
        if c == '\\' {
            let Some(escaped) = iter.next() else { break };
            pos += escaped.len_utf8();
            chars.push(format!("\\{escaped}"));
        } else {
            chars.push(c.to_string());
        }
    }

    let mut literal = StringLiteral { quote, chars };
    let mut parser = Parser::new(text);
    parser.pos = pos;
    while let Some((start, len)) = parse_slice(&mut parser, literal.len()) {
        literal.slice(start, len);
    }
    Some((parser.pos, literal))
}

/// One `[...]` slice against a string of `length` characters. Leaves the
/// cursor untouched when no complete slice follows.
fn parse_slice(parser: &mut Parser<'_>, length: usize) -> Option<(usize, usize)> {
    if parser.peek() != Some(b'[') {
        return None;
    }
    let save = parser.pos;
    parser.pos += 1;
    // Widened so that bounds taken from the script cannot overflow.
    let n = i128::try_from(length).unwrap_or(i128::MAX);

    let mut start = parser.optional_expression().map_or(0, i128::from);
    if start < 0 {
        start += n;
    }
    let mut len = match parser.separator(b":,") {
        Some(b',') => parser.optional_expression().map_or(0, i128::from),
        Some(_) => {
            let end = match parser.optional_expression().map(i128::from) {
                Some(e) if e < 0 => e + n,
                Some(e) => e,
                None => n,
            };
            end - start
        }
        None => 1,
    };

    parser.skip_space();
    if parser.peek() != Some(b']') {
        parser.pos = save;
        return None;
    }
    parser.pos += 1;

    if start < 0 {
        len += start;
        start = 0;
    }
    if start > n {
        len = 0;
    }
    len = len.min(n - start).max(0);
    let start = usize::try_from(start.min(n)).unwrap_or(0);
    Some((start, usize::try_from(len).unwrap_or(0)))
}

/// Characters ending a plain word in [`replace_expressions`].
const WORD_END: &str = "%(\"', \t\n";

/// Replace every expression in `text` by its value.
///
/// Quoted strings are kept with their quotes (after slicing), `%`-formatted
/// expressions are rendered through their format (a format wrapped in
/// parentheses loses them), commas and plain words are copied.
///
/// ```
/// use require_core::expr::replace_expressions;
///
/// assert_eq!(replace_expressions("1+2, 'x'[0] name (%02d 7)"), "3, 'x' name 07");
/// ```
pub fn replace_expressions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let space = rest.len() - rest.trim_start().len();
        out.push_str(&rest[..space]);
        rest = &rest[space..];
        let Some(first) = rest.chars().next() else {
            break;
        };

        if first == '"' || first == '\'' {
            if let Some((len, literal)) = parse_string(rest) {
                out.push_str(&literal.quoted());
                rest = &rest[len..];
                continue;
            }
        }

        if first == '%' {
            if let Some((len, rendered)) = parse_formatted(rest) {
                rest = &rest[len..];
                if out.ends_with('(') && rest.starts_with(')') {
                    out.pop();
                    rest = &rest[1..];
                }
                out.push_str(&rendered);
            } else {
                out.push('%');
                rest = &rest[1..];
            }
            continue;
        }

        if let Some((len, value)) = parse_expression(rest) {
            out.push_str(&value.to_string());
            rest = &rest[len..];
            continue;
        }

        if first == ',' {
            out.push(',');
            rest = &rest[1..];
            continue;
        }

        let mut chars = rest.char_indices();
        let mut end = rest.len();
        while let Some((i, c)) = chars.next() {
            if i > 0 && WORD_END.contains(c) {
                end = i;
                break;
            }
            if c == '\\' {
                chars.next();
            }
        }
        out.push_str(&rest[..end]);
        rest = &rest[end..];
    }

    tracing::trace!("replace_expressions {text:?} -> {out:?}");
    out
}
