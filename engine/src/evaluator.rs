//! Recursive-descent expression evaluator.
//!
//! Precedence, low to high, mirrors the reference evaluator's
//! `EvaluateSubExpression`/`SubExp1`..`SubExp11` chain exactly: `||` `&&`
//! `|` `^` `&` `==`/`!=` `<`/`<=`/`>`/`>=` `<<`/`>>` `+`/`-` `*`/`/`/`%`
//! postfix `.N` unary `+`/`-`/`~`/`!` atoms. Arithmetic is signed 64-bit
//! throughout; callers narrow the result at the point of use.

use crate::error::{AssemblyError, Result};
use crate::opcodes::{self, CpuVariant};
use crate::symbols::SymbolTable;
use crate::tokenizer::{Token, Tokenizer};

pub struct Evaluator<'a> {
    global: &'a SymbolTable,
    local: Option<&'a SymbolTable>,
    pc: u16,
    processor: CpuVariant,
}

impl<'a> Evaluator<'a> {
    pub fn new(global: &'a SymbolTable, pc: u16, processor: CpuVariant) -> Self {
        Evaluator {
            global,
            local: None,
            pc,
            processor,
        }
    }

    /// Add a subroutine-local scope to the lookup chain (consulted before
    /// the global table).
    pub fn with_local(mut self, local: &'a SymbolTable) -> Self {
        self.local = Some(local);
        self
    }

    pub fn evaluate(&self, expression: &str) -> Result<i64> {
        let mut tokens = Tokenizer::new(expression);
        let value = self.logical_or(&mut tokens)?;
        match tokens.get()? {
            Token::End => Ok(value),
            _ => Err(AssemblyError::error("Unexpected characters in expression")),
        }
    }

    fn logical_or(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.logical_and(t)?;
        while t.peek()? == Token::LogicalOr {
            t.get()?;
            let rhs = self.logical_and(t)?;
            lhs = ((lhs != 0) || (rhs != 0)) as i64;
        }
        Ok(lhs)
    }

    fn logical_and(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.bitwise_or(t)?;
        while t.peek()? == Token::LogicalAnd {
            t.get()?;
            let rhs = self.bitwise_or(t)?;
            lhs = ((lhs != 0) && (rhs != 0)) as i64;
        }
        Ok(lhs)
    }

    fn bitwise_or(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.bitwise_xor(t)?;
        while t.peek()? == Token::BitwiseOr {
            t.get()?;
            lhs |= self.bitwise_xor(t)?;
        }
        Ok(lhs)
    }

    fn bitwise_xor(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.bitwise_and(t)?;
        while t.peek()? == Token::BitwiseXor {
            t.get()?;
            lhs ^= self.bitwise_and(t)?;
        }
        Ok(lhs)
    }

    fn bitwise_and(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.equality(t)?;
        while t.peek()? == Token::BitwiseAnd {
            t.get()?;
            lhs &= self.equality(t)?;
        }
        Ok(lhs)
    }

    fn equality(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.relational(t)?;
        loop {
            match t.peek()? {
                Token::Equal => {
                    t.get()?;
                    lhs = (lhs == self.relational(t)?) as i64;
                }
                Token::NotEqual => {
                    t.get()?;
                    lhs = (lhs != self.relational(t)?) as i64;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn relational(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.shift(t)?;
        loop {
            match t.peek()? {
                Token::Less => {
                    t.get()?;
                    lhs = (lhs < self.shift(t)?) as i64;
                }
                Token::LessOrEqual => {
                    t.get()?;
                    lhs = (lhs <= self.shift(t)?) as i64;
                }
                Token::Greater => {
                    t.get()?;
                    lhs = (lhs > self.shift(t)?) as i64;
                }
                Token::GreaterOrEqual => {
                    t.get()?;
                    lhs = (lhs >= self.shift(t)?) as i64;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn shift(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.additive(t)?;
        loop {
            match t.peek()? {
                Token::ShiftLeft => {
                    t.get()?;
                    lhs <<= self.additive(t)?;
                }
                Token::ShiftRight => {
                    t.get()?;
                    lhs >>= self.additive(t)?;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn additive(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.multiplicative(t)?;
        loop {
            match t.peek()? {
                Token::Plus => {
                    t.get()?;
                    lhs += self.multiplicative(t)?;
                }
                Token::Minus => {
                    t.get()?;
                    lhs -= self.multiplicative(t)?;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn multiplicative(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut lhs = self.byte_select(t)?;
        loop {
            match t.peek()? {
                Token::Multiply => {
                    t.get()?;
                    lhs *= self.byte_select(t)?;
                }
                Token::Divide => {
                    t.get()?;
                    let rhs = self.byte_select(t)?;
                    if rhs == 0 {
                        return Err(AssemblyError::error("Division by zero"));
                    }
                    lhs /= rhs;
                }
                Token::Remainder => {
                    t.get()?;
                    let rhs = self.byte_select(t)?;
                    if rhs == 0 {
                        return Err(AssemblyError::error("Remainder by zero"));
                    }
                    lhs %= rhs;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    /// Postfix `.N` — selects byte `N` (0 = least significant) of the
    /// 64-bit value.
    fn byte_select(&self, t: &mut Tokenizer) -> Result<i64> {
        let mut value = self.unary(t)?;
        while t.peek()? == Token::Dot {
            t.get()?;
            match t.get()? {
                Token::Number(n) if (0..=7).contains(&n) => {
                    value = (value >> (n * 8)) & 0xFF;
                }
                _ => return Err(AssemblyError::error("Expected byte selector 0-7")),
            }
        }
        Ok(value)
    }

    fn unary(&self, t: &mut Tokenizer) -> Result<i64> {
        match t.peek()? {
            Token::Plus => {
                t.get()?;
                self.unary(t)
            }
            Token::Minus => {
                t.get()?;
                Ok(-self.unary(t)?)
            }
            Token::BitwiseNot => {
                t.get()?;
                Ok(!self.unary(t)?)
            }
            Token::LogicalNot => {
                t.get()?;
                Ok((self.unary(t)? == 0) as i64)
            }
            _ => self.atom(t),
        }
    }

    fn atom(&self, t: &mut Tokenizer) -> Result<i64> {
        match t.get()? {
            Token::Number(n) => Ok(n),
            Token::Dollar | Token::Dot => Ok(self.pc as i64),
            Token::OpenBrace => {
                let value = self.logical_or(t)?;
                match t.get()? {
                    Token::CloseBrace => Ok(value),
                    _ => Err(AssemblyError::error("Expected ')'")),
                }
            }
            Token::Label(name) => {
                if t.peek()? == Token::OpenBrace {
                    t.get()?;
                    self.function_call(t, &name)
                } else {
                    self.symbol_value(&name)
                }
            }
            _ => Err(AssemblyError::error("Unrecognised token in expression")),
        }
    }

    fn function_call(&self, t: &mut Tokenizer, name: &str) -> Result<i64> {
        match name {
            "CPU" | "PROCESSOR" => {
                let designation = t
                    .take_processor_designation()
                    .ok_or_else(|| AssemblyError::error("Expected Processor designation"))?;

                match t.get()? {
                    Token::CloseBrace => {}
                    _ => return Err(AssemblyError::error("Extra characters after Processor designation")),
                }

                let variant = opcodes::parse_cpu_variant(&designation)
                    .ok_or_else(|| AssemblyError::error("Unrecognised processor designation"))?;
                Ok((variant <= self.processor) as i64)
            }
            "HIGH" => {
                let value = self.logical_or(t)?;
                self.expect_close(t, "Incorrect number of arguments: HIGH expects 1 argument")?;
                Ok((value >> 8) & 0xFF)
            }
            "LOW" => {
                let value = self.logical_or(t)?;
                self.expect_close(t, "Incorrect number of arguments: LOW expects 1 argument")?;
                Ok(value & 0xFF)
            }
            "ISDEF" => self.isdef(t, true),
            "ISNDEF" => self.isdef(t, false),
            _ => Err(AssemblyError::error("Unknown function call")),
        }
    }

    fn expect_close(&self, t: &mut Tokenizer, arity_message: &str) -> Result<()> {
        match t.get()? {
            Token::CloseBrace => Ok(()),
            _ => Err(AssemblyError::error(arity_message)),
        }
    }

    fn isdef(&self, t: &mut Tokenizer, when_present: bool) -> Result<i64> {
        let name = match t.get()? {
            Token::Label(name) => name,
            _ => {
                let message = if when_present {
                    "ISDEF expects a single LABEL argument"
                } else {
                    "ISNDEF expects a single LABEL argument"
                };
                return Err(AssemblyError::error(message));
            }
        };
        match t.get()? {
            Token::CloseBrace => {}
            _ => return Err(AssemblyError::error("')' Expected")),
        }

        let present = self
            .local
            .map_or(false, |l| l.symbols.contains_key(&name))
            || self.global.symbols.contains_key(&name);

        Ok((present == when_present) as i64)
    }

    fn symbol_value(&self, name: &str) -> Result<i64> {
        if let Some(local) = self.local {
            if let Some(symbol) = local.symbols.get(name) {
                return match symbol.value {
                    Some(value) => {
                        symbol.ref_count.set(symbol.ref_count.get() + 1);
                        Ok(value as i64)
                    }
                    None => Err(AssemblyError::error(format!(
                        "Label '{}' is not yet assigned",
                        name
                    ))),
                };
            }
        }

        match self.global.symbols.get(name) {
            Some(symbol) => match symbol.value {
                Some(value) => {
                    symbol.ref_count.set(symbol.ref_count.get() + 1);
                    Ok(value as i64)
                }
                None => Err(AssemblyError::error(format!(
                    "Label '{}' is not yet assigned",
                    name
                ))),
            },
            None => Err(AssemblyError::error(format!("Label '{}' not found", name))),
        }
    }
}
