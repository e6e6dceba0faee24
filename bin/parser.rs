/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! A parser for the text form of test functions, as written by
//! `Func::render`:
//!
//! ```text
//! ; comment
//! literals 42, 7
//! start:
//!     ldr     v0, =0
//!     bcond   lt, loop, exit
//! loop cold eh handler:
//!     ...
//! ```

use std::fmt;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::CharIndices;

use insnsched::Reg;

use crate::test_framework::*;

#[derive(Debug)]
pub enum ParseError {
  IoError(io::Error),
  Parse(String),
}

impl From<io::Error> for ParseError {
  fn from(err: io::Error) -> ParseError {
    ParseError::IoError(err)
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ParseError::IoError(err) => write!(fmt, "i/o error: {}", err),
      ParseError::Parse(msg) => write!(fmt, "{}", msg),
    }
  }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_file(path: PathBuf) -> ParseResult<Func> {
  let basename = match path.file_stem().and_then(|s| s.to_str()) {
    Some(s) => s.to_string(),
    None => return Err(ParseError::Parse("bad file name".to_string())),
  };
  let mut file = File::open(path)?;
  let mut content = String::new();
  file.read_to_string(&mut content)?;
  parse_content(&basename, &content)
}

fn is_alpha(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
  is_alpha(c) || c.is_ascii_digit() || c == '.'
}

fn is_number_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '+'
}

struct Parser<'str> {
  source: &'str str,
  iter: Peekable<CharIndices<'str>>,
  line: usize,
}

impl<'str> Parser<'str> {
  fn new(source: &'str str) -> Self {
    Self { source, iter: source.char_indices().peekable(), line: 1 }
  }

  // Parsing.
  fn peek(&mut self) -> Option<char> {
    self.iter.peek().map(|(_, c)| *c)
  }

  fn offset(&mut self) -> usize {
    match self.iter.peek() {
      Some((i, _)) => *i,
      None => self.source.len(),
    }
  }

  fn advance(&mut self) -> Option<char> {
    self.iter.next().map(|(_, c)| c)
  }

  // Higher level parsing.
  fn skip_whitespace_and_comments(&mut self) {
    while let Some(c) = self.peek() {
      if c == ' ' || c == '\t' || c == '\r' || c == '\n' {
        self.advance();
        if c == '\n' {
          self.line += 1;
        }
      } else if c == ';' {
        // It's a comment! skip until the end of line.
        while let Some(c) = self.advance() {
          if c == '\n' {
            self.line += 1;
            break;
          }
        }
      } else {
        break;
      }
    }
  }

  fn skip_spaces(&mut self) {
    while let Some(' ') | Some('\t') = self.peek() {
      self.advance();
    }
  }

  fn read_char(&mut self) -> ParseResult<char> {
    self.skip_whitespace_and_comments();
    match self.advance() {
      Some(c) => Ok(c),
      None => self.error("expected char"),
    }
  }

  fn try_read_char(&mut self, expected: char) -> bool {
    self.skip_whitespace_and_comments();
    if self.peek() == Some(expected) {
      self.advance();
      return true;
    }
    false
  }

  fn expect_char(&mut self, expected: char) -> ParseResult<()> {
    let c = self.read_char()?;
    if c != expected {
      self.error(&format!("expected char '{}', got '{}'", expected, c))
    } else {
      Ok(())
    }
  }

  fn take_while(&mut self, pred: fn(char) -> bool) -> &'str str {
    let start = self.offset();
    while let Some(c) = self.peek() {
      if !pred(c) {
        break;
      }
      self.advance();
    }
    let end = self.offset();
    let source: &'str str = self.source;
    &source[start..end]
  }

  fn try_read_ident_sameline(&mut self) -> Option<String> {
    self.skip_spaces();
    match self.peek() {
      Some(c) if is_alpha(c) => {}
      _ => return None,
    }
    Some(self.take_while(is_alpha_numeric).to_string())
  }

  fn try_read_ident(&mut self) -> Option<String> {
    self.skip_whitespace_and_comments();
    self.try_read_ident_sameline()
  }

  fn read_ident(&mut self) -> ParseResult<String> {
    match self.try_read_ident() {
      Some(s) => Ok(s),
      None => self.error("expected identifier or keyword"),
    }
  }

  fn read_string(&mut self) -> ParseResult<String> {
    self.skip_whitespace_and_comments();
    if self.advance() != Some('"') {
      return self.error("expected opening \"");
    }
    let mut out = String::new();
    while let Some(c) = self.advance() {
      match c {
        '"' => return Ok(out),
        '\\' => match self.advance() {
          Some('n') => out.push('\n'),
          Some('t') => out.push('\t'),
          Some(c) => out.push(c),
          None => break,
        },
        '\n' => {
          self.line += 1;
          out.push(c);
        }
        _ => out.push(c),
      }
    }
    self.error("unterminated string")
  }

  fn read_number_token(&mut self) -> ParseResult<&'str str> {
    self.skip_whitespace_and_comments();
    let tok = self.take_while(is_number_char);
    if tok.is_empty() {
      return self.error("expected number");
    }
    Ok(tok)
  }

  fn read_i64(&mut self) -> ParseResult<i64> {
    let tok = self.read_number_token()?;
    match tok.parse::<i64>() {
      Ok(n) => Ok(n),
      Err(_) => self.error(&format!("expected an integer, got '{}'", tok)),
    }
  }

  fn read_u32(&mut self) -> ParseResult<u32> {
    let tok = self.read_number_token()?;
    match tok.parse::<u32>() {
      Ok(n) => Ok(n),
      Err(_) => self.error(&format!("expected a count, got '{}'", tok)),
    }
  }

  fn read_f64(&mut self) -> ParseResult<f64> {
    let tok = self.read_number_token()?;
    match tok.parse::<f64>() {
      Ok(n) => Ok(n),
      Err(_) => self.error(&format!("expected a number, got '{}'", tok)),
    }
  }

  fn try_read_reg(&mut self) -> Option<Reg> {
    self.skip_whitespace_and_comments();
    match self.peek() {
      Some(c) if is_alpha(c) => {}
      _ => return None,
    }
    // Look ahead without consuming anything that isn't a register.
    let save = self.iter.clone();
    let ident = self.take_while(is_alpha_numeric);
    match parse_reg(ident) {
      Some(reg) => Some(reg),
      None => {
        self.iter = save;
        None
      }
    }
  }

  fn read_reg(&mut self) -> ParseResult<Reg> {
    match self.try_read_reg() {
      Some(reg) => Ok(reg),
      None => self.error("expected register"),
    }
  }

  fn read_ri(&mut self) -> ParseResult<RI> {
    if let Some(reg) = self.try_read_reg() {
      Ok(RI_R(reg))
    } else {
      Ok(RI_I(self.read_i64()?))
    }
  }

  fn read_am(&mut self) -> ParseResult<AM> {
    if self.try_read_char('=') {
      return Ok(AM_LIT(self.read_u32()?));
    }
    self.expect_char('[')?;
    let base = self.read_reg()?;
    let mut index = None;
    let mut offset = None;
    if self.try_read_char(',') {
      match self.try_read_reg() {
        Some(reg) => index = Some(reg),
        None => offset = Some(self.read_i64()?),
      }
    }
    self.expect_char(']')?;
    match (index, offset) {
      (Some(index), _) => Ok(AM_RR(base, index)),
      (None, Some(offset)) => {
        if self.try_read_char('!') {
          Ok(AM_PRE(base, offset))
        } else {
          Ok(AM_RI(base, offset))
        }
      }
      (None, None) => {
        // `[base], offset` is post-indexed.  Only look on this line: the
        // next line may start with anything.
        self.skip_spaces();
        if self.peek() == Some(',') {
          self.advance();
          Ok(AM_POST(base, self.read_i64()?))
        } else {
          Ok(AM_R(base))
        }
      }
    }
  }

  fn read_reg_list(&mut self) -> ParseResult<Vec<Reg>> {
    self.expect_char('(')?;
    let mut regs = Vec::new();
    if self.try_read_char(')') {
      return Ok(regs);
    }
    loop {
      regs.push(self.read_reg()?);
      if self.try_read_char(')') {
        return Ok(regs);
      }
      self.expect_char(',')?;
    }
  }

  fn read_label(&mut self) -> ParseResult<Label> {
    Ok(Label::new_unresolved(&self.read_ident()?))
  }

  fn read_cond(&mut self) -> ParseResult<Cond> {
    let name = self.read_ident()?;
    match Cond::from_name(&name) {
      Some(cond) => Ok(cond),
      None => self.error(&format!("unknown condition '{}'", name)),
    }
  }

  fn is_done(&mut self) -> bool {
    self.skip_whitespace_and_comments();
    self.peek().is_none()
  }

  fn error<T>(&self, msg: &str) -> ParseResult<T> {
    Err(ParseError::Parse(format!("error at line {}: {}", self.line, msg)))
  }

  // Parses an instruction whose mnemonic has been read.  Returns None if
  // `name` isn't a mnemonic.
  fn read_inst(&mut self, name: &str) -> ParseResult<Option<Inst>> {
    if let Some(op) = BinOp::from_name(name) {
      let dst = self.read_reg()?;
      self.expect_char(',')?;
      let src_left = self.read_reg()?;
      self.expect_char(',')?;
      let src_right = self.read_ri()?;
      return Ok(Some(Inst::Alu { op, dst, src_left, src_right }));
    }
    if let Some(op) = FpOp::from_name(name) {
      let dst = self.read_reg()?;
      self.expect_char(',')?;
      let src_left = self.read_reg()?;
      self.expect_char(',')?;
      let src_right = self.read_reg()?;
      return Ok(Some(Inst::Fpu { op, dst, src_left, src_right }));
    }

    let inst = match name {
      "mov" => {
        let dst = self.read_reg()?;
        self.expect_char(',')?;
        match self.read_ri()? {
          RI::Reg { reg } => Inst::MovR { dst, src: reg },
          RI::Imm { imm } => Inst::Mov { dst, imm },
        }
      }
      "fmov" => {
        let dst = self.read_reg()?;
        self.expect_char(',')?;
        Inst::FMov { dst, imm: self.read_f64()? }
      }
      "cmp" => {
        let src_left = self.read_reg()?;
        self.expect_char(',')?;
        Inst::Cmp { src_left, src_right: self.read_ri()? }
      }
      "ldr" => {
        let dst = self.read_reg()?;
        self.expect_char(',')?;
        Inst::Ldr { dst, addr: self.read_am()? }
      }
      "str" => {
        let src = self.read_reg()?;
        self.expect_char(',')?;
        Inst::Str { src, addr: self.read_am()? }
      }
      "ldadd" => {
        let dst = self.read_reg()?;
        self.expect_char(',')?;
        let src = self.read_reg()?;
        self.expect_char(',')?;
        self.expect_char('[')?;
        let base = self.read_reg()?;
        self.expect_char(']')?;
        Inst::LdAdd { dst, src, base }
      }
      "adrp" => {
        let dst = self.read_reg()?;
        self.expect_char(',')?;
        Inst::Adrp { dst, sym: self.read_u32()? }
      }
      "addlo12" => {
        let dst = self.read_reg()?;
        self.expect_char(',')?;
        let src = self.read_reg()?;
        self.expect_char(',')?;
        Inst::AddLo12 { dst, src, sym: self.read_u32()? }
      }
      "clinit" => Inst::Clinit { sym: self.read_u32()? },
      "clinit_companion" => Inst::ClinitCompanion { sym: self.read_u32()? },
      "bl" => {
        let callee = self.read_ident()?;
        match Builtin::from_name(&callee) {
          Some(callee) => Inst::Bl { callee },
          None => return self.error(&format!("unknown callee '{}'", callee)),
        }
      }
      "dmb" => Inst::Dmb,
      "asm" => {
        let text = self.read_string()?;
        let defs = self.read_reg_list()?;
        let uses = self.read_reg_list()?;
        let clobbers = self.read_reg_list()?;
        let memory = match self.read_ident()?.as_str() {
          "mem" => true,
          "nomem" => false,
          _ => return self.error("expected 'mem' or 'nomem'"),
        };
        Inst::Asm { text, defs, uses, clobbers, memory }
      }
      "chk" => {
        let index = self.read_reg()?;
        self.expect_char(',')?;
        Inst::Chk { index, bound: self.read_ri()? }
      }
      "b" => Inst::B { target: self.read_label()? },
      "bcond" => {
        let cond = self.read_cond()?;
        self.expect_char(',')?;
        let target_true = self.read_label()?;
        self.expect_char(',')?;
        let target_false = self.read_label()?;
        Inst::BCond { cond, target_true, target_false }
      }
      "cbz" => {
        let reg = self.read_reg()?;
        self.expect_char(',')?;
        let target_zero = self.read_label()?;
        self.expect_char(',')?;
        let target_nonzero = self.read_label()?;
        Inst::Cbz { reg, target_zero, target_nonzero }
      }
      "ret" => {
        // The returned register is optional, and on the same line.
        self.skip_spaces();
        let reg = match self.peek() {
          Some(c) if is_alpha(c) => Some(self.read_reg()?),
          _ => None,
        };
        Inst::Ret { reg }
      }
      "comment" => Inst::Comment { text: self.read_string()? },
      "debug" => Inst::DebugLoc { line: self.read_u32()? },
      "cfi" => Inst::Cfi { text: self.read_string()? },
      _ => return Ok(None),
    };
    Ok(Some(inst))
  }

  // After a block name: `[cold] [eh <handler>] :`
  fn read_block_attrs(&mut self, block: &mut Block) -> ParseResult<()> {
    loop {
      if self.try_read_char(':') {
        return Ok(());
      }
      match self.read_ident()?.as_str() {
        "cold" => block.cold = true,
        "eh" => block.eh_handler = Some(self.read_label()?),
        other => {
          return self.error(&format!("unexpected '{}' in block header", other))
        }
      }
    }
  }

  fn parse(&mut self, func: &mut Func) -> ParseResult<()> {
    self.skip_whitespace_and_comments();
    let mut pending: Option<Block> = None;
    let mut insts = Vec::new();

    let mut ident = match self.try_read_ident() {
      Some(ident) => ident,
      None => return self.error("empty function"),
    };
    if ident == "literals" {
      loop {
        func.literals.push(self.read_i64()?);
        if !self.try_read_char(',') {
          break;
        }
      }
      ident = self.read_ident()?;
    }

    loop {
      match self.read_inst(&ident)? {
        Some(inst) => {
          if pending.is_none() {
            return self.error("instruction outside a block");
          }
          insts.push(inst);
        }
        None => {
          // A new block.
          if let Some(block) = pending.take() {
            add_block(func, block, std::mem::take(&mut insts));
          }
          let mut block = Block::new(&ident, insnsched::InstIx::new(0), 0);
          self.read_block_attrs(&mut block)?;
          pending = Some(block);
        }
      }
      if self.is_done() {
        break;
      }
      ident = self.read_ident()?;
    }
    if let Some(block) = pending.take() {
      add_block(func, block, insts);
    }
    Ok(())
  }
}

fn add_block(func: &mut Func, block: Block, insts: Vec<Inst>) {
  let bix = func.block(&block.name, insts);
  let b = &mut func.blocks[bix.get() as usize];
  b.cold = block.cold;
  b.eh_handler = block.eh_handler;
}

pub fn parse_content(func_name: &str, content: &str) -> ParseResult<Func> {
  let mut func = Func::new(func_name);
  let mut parser = Parser::new(content);
  parser.parse(&mut func)?;
  match func.finish() {
    Ok(()) => Ok(func),
    Err(msg) => Err(ParseError::Parse(msg)),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use insnsched::{Function, RegClass};

  #[test]
  fn parse_small_function() {
    let text = r#"
      ; two blocks
      literals 5, -3
      start eh handler:
          ldr     v0, =1
          ldr     x3, [sp, -8]!
          str     v0, [x3], 16
          asm     "nop" (v1) (v0, x3) () nomem
          chk     v0, 10
          bcond   lt, handler, start
      handler cold:
          fmov    vd2, -1.5e3
          ret
    "#;
    let func = parse_content("small", text).expect("parses");
    assert_eq!(func.literals, vec![5, -3]);
    assert_eq!(func.blocks.len(), 2);
    assert_eq!(func.num_virtual_regs, 3);
    assert!(func.blocks[1].cold);
    assert_eq!(func.blocks[0].eh_handler.as_ref().map(|l| l.block_ix().get()), Some(1));
    match &func.insns[1] {
      Inst::Ldr { addr: AM::PreIndex { base, offset }, .. } => {
        assert_eq!(*base, sp());
        assert_eq!(*offset, -8);
      }
      other => panic!("unexpected {:?}", other),
    }
    match &func.insns[2] {
      Inst::Str { addr: AM::PostIndex { offset: 16, .. }, .. } => {}
      other => panic!("unexpected {:?}", other),
    }
    match &func.insns[6] {
      Inst::FMov { dst, imm } => {
        assert_eq!(dst.get_class(), RegClass::F64);
        assert_eq!(*imm, -1500.0);
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(func.insns[7], Inst::Ret { reg: None }));
    let succs = func.block_succs(insnsched::BlockIx::new(0));
    assert_eq!(succs.len(), 2);
  }

  #[test]
  fn rendered_test_cases_parse_back() {
    for name in crate::test_cases::builtin_names() {
      let func = crate::test_cases::find_func(name).expect("known test case");
      let mut text = String::new();
      func.render("test", &mut text).expect("render");
      let again = parse_content(name, &text).expect("reparses");
      let mut text2 = String::new();
      again.render("test", &mut text2).expect("render");
      assert_eq!(text, text2);
    }
  }

  #[test]
  fn errors() {
    assert!(parse_content("e", "").is_err());
    assert!(parse_content("e", "start:\n  mov v0, 1\n").is_err());
    assert!(parse_content("e", "start:\n  b nowhere\n").is_err());
    assert!(parse_content("e", "start:\n  ldr v0, [v1\n  ret\n").is_err());
    assert!(parse_content("e", "start:\n  bl nothing\n  ret\n").is_err());
  }
}
