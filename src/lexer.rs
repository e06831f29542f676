/*!
  Turns one line of assembly source into tokens.

  Each token type has a rule, written as a `nom` parser. At every position all rules are tried
  and the longest match wins; ties go to the rule listed first in `RULES`. Matching is done on
  an ASCII-uppercased copy of the line, which keeps byte offsets identical to the original, so
  string literals and comments can be sliced from the original text with their case intact.

  Hex literals are written either with a `0x` prefix or bare. A bare literal must start with a
  decimal digit, otherwise it would be indistinguishable from an identifier: `0100` and `1F` are
  literals, `FF` is an identifier. Two hex digits make a byte, four make a word.
*/

use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{tag, take_while_m_n},
  character::complete::{alpha1, alphanumeric1, char as one_char, multispace1, none_of, one_of, satisfy},
  combinator::{eof, map, map_opt, map_res, opt, peek, recognize, rest, value},
  multi::many0_count,
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult
};
use string_cache::DefaultAtom;

use crate::bytecode::{unsigned_to_signed, OperandLength, Operation};
use crate::error::LexError;
use crate::register::Register;
use crate::token::{RefBase, RefOffset, Reference, Token, TokenKind};

/// What a rule recognized. `None` is whitespace, which produces no token.
type Lexeme = Option<TokenKind>;

/// A rule sees either the uppercased line or the original one.
#[derive(Clone, Copy)]
enum Case {
  Upper,
  Original
}

struct Rule {
  case  : Case,
  parse : fn(&str) -> IResult<&str, Lexeme>
}

/// Priority order: earlier rules win ties.
const RULES: &[Rule] = &[
  Rule { case: Case::Upper,    parse: label },
  Rule { case: Case::Original, parse: string_literal },
  Rule { case: Case::Original, parse: comment },
  Rule { case: Case::Upper,    parse: macro_name },
  Rule { case: Case::Upper,    parse: address_word_literal },
  Rule { case: Case::Upper,    parse: address_label },
  Rule { case: Case::Upper,    parse: word_literal },
  Rule { case: Case::Upper,    parse: byte_literal },
  Rule { case: Case::Upper,    parse: abs_ref_reg },
  Rule { case: Case::Upper,    parse: rel_ref_word_reg },
  Rule { case: Case::Upper,    parse: rel_ref_label_reg },
  Rule { case: Case::Upper,    parse: rel_ref_word_byte },
  Rule { case: Case::Upper,    parse: rel_ref_label_byte },
  Rule { case: Case::Upper,    parse: rel_ref_word },
  Rule { case: Case::Upper,    parse: rel_ref_label },
  Rule { case: Case::Upper,    parse: variable },
  Rule { case: Case::Upper,    parse: identifier },
  Rule { case: Case::Upper,    parse: whitespace },
];

/// Tokenizes a single line of assembly code. Comments are kept. Columns count characters.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
  let upper = line.to_ascii_uppercase();
  let mut tokens = Vec::new();
  let mut position = 0;

  while position < line.len() {
    let mut best: Option<(usize, Lexeme)> = None;

    for rule in RULES {
      let input = match rule.case {
        Case::Upper    => &upper[position..],
        Case::Original => &line[position..]
      };
      if let Ok((remaining, lexeme)) = (rule.parse)(input) {
        let length = input.len() - remaining.len();
        let longer = best.as_ref().map_or(true, |(best_length, _)| length > *best_length);
        if length > 0 && longer {
          best = Some((length, lexeme));
        }
      }
    }

    match best {

      Some((length, lexeme)) => {
        if let Some(kind) = lexeme {
          tokens.push(Token::new(kind, column(line, position)));
        }
        position += length;
      }

      None => return Err(unmatched(line, position)),

    } // end match best
  }

  Ok(tokens)
}

/// The character column of a byte offset.
fn column(line: &str, position: usize) -> usize {
  line[..position].chars().count()
}

/// The error for a position no rule matched.
fn unmatched(line: &str, position: usize) -> LexError {
  let remainder = &line[position..];
  let position = column(line, position);
  match remainder.chars().next() {

    Some(quote @ ('"' | '\'')) => {
      let literal = remainder.trim_end().to_string();
      // A closed literal that failed to unescape is reported by its closing quote.
      let literal = match remainder[1..].find(quote) {
        Some(end) => remainder[..end + 2].to_string(),
        None => literal
      };
      LexError::InvalidStringLiteral { literal, column: position }
    }

    Some(ch) => LexError::UnexpectedCharacter { ch, column: position },

    None => LexError::UnexpectedCharacter { ch: '\n', column: position },

  }
}

// region Building blocks

fn name(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    alt((alpha1, tag("_"))),
    many0_count(alt((alphanumeric1, tag("_"))))
  ))(input)
}

fn hex_digits(count: usize) -> impl Fn(&str) -> IResult<&str, &str> {
  move |input| take_while_m_n(count, count, |c: char| c.is_ascii_hexdigit())(input)
}

/// Exactly `count` hex digits, with a `0X` prefix or starting with a decimal digit.
fn hex_number(count: usize) -> impl Fn(&str) -> IResult<&str, i32> {
  move |input| {
    map_res(
      alt((
        preceded(tag("0X"), hex_digits(count)),
        preceded(peek(satisfy(|c| c.is_ascii_digit())), hex_digits(count))
      )),
      |digits| i32::from_str_radix(digits, 16)
    )(input)
  }
}

/// A four digit hex number read as a 16 bit two's complement value, so `FFFF` is -1.
fn signed_word(input: &str) -> IResult<&str, i32> {
  map(hex_number(4), |value| unsigned_to_signed(value as u16, OperandLength::Word) as i32)(input)
}

fn word_register(input: &str) -> IResult<&str, Register> {
  map_opt(name, |text| Register::from_str(text).ok().filter(|r| r.is_word()))(input)
}

/// A name that is neither a register nor an instruction.
fn label_name(input: &str) -> IResult<&str, DefaultAtom> {
  map_opt(name, |text| {
    match Register::from_str(text).is_ok() || Operation::from_str(text).is_ok() {
      true  => None,
      false => Some(DefaultAtom::from(text))
    }
  })(input)
}

/// The closing bracket with an optional `B` width suffix.
fn close_reference(input: &str) -> IResult<&str, OperandLength> {
  preceded(
    one_char(']'),
    map(opt(terminated(one_char('B'), peek_boundary)), |suffix| match suffix {
      Some(_) => OperandLength::Byte,
      None    => OperandLength::Word
    })
  )(input)
}

/// Succeeds without consuming if the next character cannot continue a name.
fn peek_boundary(input: &str) -> IResult<&str, ()> {
  alt((
    value((), eof),
    value((), peek(satisfy(|c| !(c.is_ascii_alphanumeric() || c == '_'))))
  ))(input)
}

fn reference<'a, B, O>(
  base: impl FnMut(&'a str) -> IResult<&'a str, B>,
  offset: impl FnMut(&'a str) -> IResult<&'a str, O>,
  build: impl Fn(B, O, OperandLength) -> TokenKind
) -> impl FnMut(&'a str) -> IResult<&'a str, Lexeme> {
  map(
    tuple((preceded(one_char('['), base), offset, close_reference)),
    move |(base, offset, length)| Some(build(base, offset, length))
  )
}

// endregion

// region Rules

fn label(input: &str) -> IResult<&str, Lexeme> {
  map(terminated(name, one_char(':')), |text| Some(TokenKind::Label(DefaultAtom::from(text))))(input)
}

fn string_literal(input: &str) -> IResult<&str, Lexeme> {
  let double = delimited(
    one_char('"'),
    recognize(many0_count(alt((preceded(one_char('\\'), satisfy(|_| true)), none_of("\\\""))))),
    one_char('"')
  );
  let single = delimited(
    one_char('\''),
    recognize(many0_count(alt((preceded(one_char('\\'), satisfy(|_| true)), none_of("\\'"))))),
    one_char('\'')
  );
  map_opt(alt((double, single)), |body: &str| unescape(body).map(|text| Some(TokenKind::StringLiteral(text))))(input)
}

/// Resolves backslash escapes. Unknown escapes make the literal invalid.
fn unescape(body: &str) -> Option<String> {
  let mut text = String::with_capacity(body.len());
  let mut chars = body.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      text.push(c);
      continue;
    }
    let escaped = match chars.next()? {
      'n'  => '\n',
      't'  => '\t',
      'r'  => '\r',
      '0'  => '\0',
      '\\' => '\\',
      '\'' => '\'',
      '"'  => '"',
      'x'  => {
        let digits: String = chars.by_ref().take(2).collect();
        if digits.len() != 2 {
          return None;
        }
        u8::from_str_radix(&digits, 16).ok()? as char
      }
      _ => return None
    };
    text.push(escaped);
  }
  Some(text)
}

fn comment(input: &str) -> IResult<&str, Lexeme> {
  map(preceded(one_char('#'), rest), |text: &str| Some(TokenKind::Comment(text.to_string())))(input)
}

fn macro_name(input: &str) -> IResult<&str, Lexeme> {
  map(preceded(one_char('.'), name), |text| Some(TokenKind::Macro(DefaultAtom::from(text))))(input)
}

fn address_word_literal(input: &str) -> IResult<&str, Lexeme> {
  map(preceded(one_char('^'), signed_word), |value| Some(TokenKind::AddressWordLiteral(value)))(input)
}

fn address_label(input: &str) -> IResult<&str, Lexeme> {
  map(preceded(one_char('^'), label_name), |label| Some(TokenKind::AddressLabel(label)))(input)
}

fn word_literal(input: &str) -> IResult<&str, Lexeme> {
  map(hex_number(4), |value| Some(TokenKind::WordLiteral(value)))(input)
}

fn byte_literal(input: &str) -> IResult<&str, Lexeme> {
  map(hex_number(2), |value| Some(TokenKind::ByteLiteral(value)))(input)
}

/// `[REG]`, `[REG+XX]` or `[REG-XX]`.
fn abs_ref_reg(input: &str) -> IResult<&str, Lexeme> {
  reference(
    word_register,
    opt(pair(one_of("+-"), hex_number(2))),
    |register, offset, length| {
      let offset = match offset {
        Some(('-', value)) => -value,
        Some((_, value))   => value,
        None               => 0
      };
      TokenKind::AbsRefReg(Reference::new(
        RefBase::Register(register),
        Some(RefOffset::Value(offset)),
        length
      ))
    }
  )(input)
}

/// `[XXXX+REG]`
fn rel_ref_word_reg(input: &str) -> IResult<&str, Lexeme> {
  reference(
    signed_word,
    preceded(one_char('+'), word_register),
    |base, register, length| TokenKind::RelRefWordReg(Reference::new(
      RefBase::Address(base),
      Some(RefOffset::Register(register)),
      length
    ))
  )(input)
}

/// `[LABEL+REG]`
fn rel_ref_label_reg(input: &str) -> IResult<&str, Lexeme> {
  reference(
    label_name,
    preceded(one_char('+'), word_register),
    |label, register, length| TokenKind::RelRefLabelReg(Reference::new(
      RefBase::Label(label),
      Some(RefOffset::Register(register)),
      length
    ))
  )(input)
}

/// `[XXXX+XX]`
fn rel_ref_word_byte(input: &str) -> IResult<&str, Lexeme> {
  reference(
    signed_word,
    preceded(one_char('+'), hex_number(2)),
    |base, offset, length| TokenKind::RelRefWordByte(Reference::new(
      RefBase::Address(base),
      Some(RefOffset::Value(offset)),
      length
    ))
  )(input)
}

/// `[LABEL+XX]`
fn rel_ref_label_byte(input: &str) -> IResult<&str, Lexeme> {
  reference(
    label_name,
    preceded(one_char('+'), hex_number(2)),
    |label, offset, length| TokenKind::RelRefLabelByte(Reference::new(
      RefBase::Label(label),
      Some(RefOffset::Value(offset)),
      length
    ))
  )(input)
}

/// `[XXXX]`
fn rel_ref_word(input: &str) -> IResult<&str, Lexeme> {
  reference(
    signed_word,
    |i| Ok((i, ())),
    |base, _, length| TokenKind::RelRefWord(Reference::new(RefBase::Address(base), None, length))
  )(input)
}

/// `[LABEL]`
fn rel_ref_label(input: &str) -> IResult<&str, Lexeme> {
  reference(
    label_name,
    |i| Ok((i, ())),
    |label, _, length| TokenKind::RelRefLabel(Reference::new(RefBase::Label(label), None, length))
  )(input)
}

fn variable(input: &str) -> IResult<&str, Lexeme> {
  map(preceded(one_char('$'), name), |text| Some(TokenKind::Variable(DefaultAtom::from(text))))(input)
}

/// Instruction names and registers are identifiers with reserved spellings.
fn identifier(input: &str) -> IResult<&str, Lexeme> {
  map(name, |text| {
    let kind = if let Ok(operation) = Operation::from_str(text) {
      TokenKind::Instruction(operation)
    } else if let Ok(register) = Register::from_str(text) {
      match register.is_word() {
        true  => TokenKind::WordRegister(register),
        false => TokenKind::ByteRegister(register)
      }
    } else {
      TokenKind::Identifier(DefaultAtom::from(text))
    };
    Some(kind)
  })(input)
}

fn whitespace(input: &str) -> IResult<&str, Lexeme> {
  value(None, multispace1)(input)
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(line: &str) -> Vec<TokenKind> {
    tokenize(line).unwrap().into_iter().map(|token| token.kind).collect()
  }

  fn atom(text: &str) -> DefaultAtom {
    DefaultAtom::from(text)
  }

  #[test]
  fn test_instruction_line() {
    let tokens = tokenize("  mov AX 0x1234 # set up").unwrap();
    assert_eq!(tokens, vec![
      Token::new(TokenKind::Instruction(Operation::Mov), 2),
      Token::new(TokenKind::WordRegister(Register::AX), 6),
      Token::new(TokenKind::WordLiteral(0x1234), 9),
      Token::new(TokenKind::Comment(" set up".to_string()), 16),
    ]);
  }

  #[test]
  fn test_labels_and_identifiers_are_case_insensitive() {
    assert_eq!(kinds("Loop: jmp loop"), vec![
      TokenKind::Label(atom("LOOP")),
      TokenKind::Instruction(Operation::Jmp),
      TokenKind::Identifier(atom("LOOP")),
    ]);
  }

  #[test]
  fn test_literals() {
    assert_eq!(kinds("0x12 0X00FF 0100 12 ^0x0010 ^FFFF ^start"), vec![
      TokenKind::ByteLiteral(0x12),
      TokenKind::WordLiteral(0x00FF),
      TokenKind::WordLiteral(0x0100),
      TokenKind::ByteLiteral(0x12),
      TokenKind::AddressWordLiteral(0x10),
      TokenKind::AddressLabel(atom("FFFF")),
      TokenKind::AddressLabel(atom("START")),
    ]);
    assert_eq!(kinds("^0FFFF"), vec![TokenKind::AddressWordLiteral(0x0FFF), TokenKind::Identifier(atom("F"))]);
    assert_eq!(kinds("^0xFFFF"), vec![TokenKind::AddressWordLiteral(-1)]);
    // Bare hex starting with a letter is a name.
    assert_eq!(kinds("FF"), vec![TokenKind::Identifier(atom("FF"))]);
  }

  #[test]
  fn test_registers() {
    assert_eq!(kinds("al SP dh"), vec![
      TokenKind::ByteRegister(Register::AL),
      TokenKind::WordRegister(Register::SP),
      TokenKind::ByteRegister(Register::DH),
    ]);
  }

  #[test]
  fn test_references() {
    let word = OperandLength::Word;
    let byte = OperandLength::Byte;
    assert_eq!(kinds("[BP-02]B [SI] [BX+0x10]"), vec![
      TokenKind::AbsRefReg(Reference::new(RefBase::Register(Register::BP), Some(RefOffset::Value(-2)), byte)),
      TokenKind::AbsRefReg(Reference::new(RefBase::Register(Register::SI), Some(RefOffset::Value(0)), word)),
      TokenKind::AbsRefReg(Reference::new(RefBase::Register(Register::BX), Some(RefOffset::Value(0x10)), word)),
    ]);
    assert_eq!(kinds("[1234+DI] [table+CX]B"), vec![
      TokenKind::RelRefWordReg(Reference::new(RefBase::Address(0x1234), Some(RefOffset::Register(Register::DI)), word)),
      TokenKind::RelRefLabelReg(Reference::new(RefBase::Label(atom("TABLE")), Some(RefOffset::Register(Register::CX)), byte)),
    ]);
    assert_eq!(kinds("[1234+56] [table+0x01]"), vec![
      TokenKind::RelRefWordByte(Reference::new(RefBase::Address(0x1234), Some(RefOffset::Value(0x56)), word)),
      TokenKind::RelRefLabelByte(Reference::new(RefBase::Label(atom("TABLE")), Some(RefOffset::Value(1)), word)),
    ]);
    assert_eq!(kinds("[0xFFFE]B [counter]"), vec![
      TokenKind::RelRefWord(Reference::new(RefBase::Address(-2), None, byte)),
      TokenKind::RelRefLabel(Reference::new(RefBase::Label(atom("COUNTER")), None, word)),
    ]);
  }

  #[test]
  fn test_width_suffix_must_end_the_token() {
    // `[X]BX` is a reference followed by a register, not a byte reference followed by `X`.
    assert_eq!(kinds("[SI]BX").len(), 2);
    assert_eq!(kinds("[SI]BX")[1], TokenKind::WordRegister(Register::BX));
  }

  #[test]
  fn test_macros_strings_and_variables() {
    assert_eq!(kinds(r#".dat 'It''s' "a\tb" $count"#), vec![
      TokenKind::Macro(atom("DAT")),
      TokenKind::StringLiteral("It".to_string()),
      TokenKind::StringLiteral("s".to_string()),
      TokenKind::StringLiteral("a\tb".to_string()),
      TokenKind::Variable(atom("COUNT")),
    ]);
    assert_eq!(kinds(r#""Hello, World!\x21""#), vec![TokenKind::StringLiteral("Hello, World!!".to_string())]);
  }

  #[test]
  fn test_comment_keeps_case() {
    assert_eq!(kinds("#Keep This"), vec![TokenKind::Comment("Keep This".to_string())]);
  }

  #[test]
  fn test_unexpected_character() {
    assert_eq!(
      tokenize("NOP @"),
      Err(LexError::UnexpectedCharacter { ch: '@', column: 4 })
    );
    assert_eq!(
      tokenize("  ."),
      Err(LexError::UnexpectedCharacter { ch: '.', column: 2 })
    );
    assert_eq!(
      tokenize(".DAT \"é→\" @"),
      Err(LexError::UnexpectedCharacter { ch: '@', column: 10 })
    );
  }

  #[test]
  fn test_columns_count_characters() {
    let tokens = tokenize(".DAT \"é→\" 0x01").unwrap();
    assert_eq!(tokens.last().map(|token| token.column), Some(10));
  }

  #[test]
  fn test_invalid_string_literal() {
    assert!(matches!(
      tokenize(".DAT \"unterminated"),
      Err(LexError::InvalidStringLiteral { column: 5, .. })
    ));
    assert!(matches!(
      tokenize(".DAT \"bad \\q escape\""),
      Err(LexError::InvalidStringLiteral { column: 5, .. })
    ));
  }
}
