// ========================================================================================
//
//                          The rule evaluator: tokens in, one score out
//
// ========================================================================================
//
// A gene-reaction rule is a flat sequence of gene identifiers joined by the keywords
// `AND`/`OR`, optionally grouped by parentheses. There is NO operator precedence:
// operators are applied strictly in order of appearance, so
//
//     "g1 AND g2 OR g3"  ==  "(g1 AND g2) OR g3"  !=  "g1 AND (g2 OR g3)"
//
// Evaluation runs in two passes. The tokenizer turns the rule into a finite token
// list and pairs every `(` with its `)` by depth counting, rejecting unbalanced input
// before any value is read. The reduction pass then walks one group at a time with
// a small state machine that folds each operand into the running value as soon as
// an operator is pending. A parenthesized group is reduced recursively and its value
// is fed to the enclosing group exactly like a single gene's value.

use crate::lookup::ExpressionLookup;
use crate::types::OrPolicy;
use std::fmt;
use thiserror::Error;

/// Parenthesis depth beyond which a rule is rejected instead of recursed into.
pub const MAX_NESTING_DEPTH: usize = 128;

/// The reason a rule was rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxFault {
    /// A `(` that is never closed.
    UnmatchedOpen,
    /// A `)` with no `(` to close.
    UnmatchedClose,
    /// An operator at the end of a rule or group.
    DanglingOperator,
    /// An operator with nothing before it.
    MissingLeftOperand,
    /// Two operators in a row.
    ConsecutiveOperators,
    /// Two operands in a row without an operator between them.
    MissingOperator,
    /// `()` with nothing inside.
    EmptyGroup,
    /// Parentheses nested deeper than [`MAX_NESTING_DEPTH`].
    NestingTooDeep,
}

impl SyntaxFault {
    pub fn describe(self) -> &'static str {
        match self {
            Self::UnmatchedOpen => "opening parenthesis is never closed",
            Self::UnmatchedClose => "closing parenthesis has no matching opening parenthesis",
            Self::DanglingOperator => "operator is not followed by an operand",
            Self::MissingLeftOperand => "operator is not preceded by an operand",
            Self::ConsecutiveOperators => "two operators follow each other",
            Self::MissingOperator => "two operands are not joined by AND/OR",
            Self::EmptyGroup => "parentheses enclose nothing",
            Self::NestingTooDeep => "parentheses are nested too deeply",
        }
    }
}

impl fmt::Display for SyntaxFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("malformed rule at byte {offset}: {fault}")]
    Syntax { offset: usize, fault: SyntaxFault },
    #[error(
        "rule references '{identifier}' (byte {offset}), which is not part of the model's declared genes"
    )]
    UnknownIdentifier { identifier: String, offset: usize },
}

impl RuleError {
    fn syntax(offset: usize, fault: SyntaxFault) -> Self {
        Self::Syntax { offset, fault }
    }

    /// The syntax fault, if this is a syntax error.
    pub fn fault(&self) -> Option<SyntaxFault> {
        match self {
            Self::Syntax { fault, .. } => Some(*fault),
            Self::UnknownIdentifier { .. } => None,
        }
    }
}

// ========================================================================================
//                                   Tokenizer
// ========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'r> {
    Identifier(&'r str),
    Operator(Operator),
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'r> {
    kind: TokenKind<'r>,
    /// Byte offset of the token's first character within the rule.
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Or,
}

impl Operator {
    #[inline]
    fn apply(self, left: f64, right: f64, or_policy: OrPolicy) -> f64 {
        match self {
            Self::And => left.min(right),
            Self::Or => or_policy.combine(left, right),
        }
    }
}

#[inline]
fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || ch == '(' || ch == ')'
}

fn classify(word: &str, offset: usize) -> Token<'_> {
    let kind = if word.eq_ignore_ascii_case("and") {
        TokenKind::Operator(Operator::And)
    } else if word.eq_ignore_ascii_case("or") {
        TokenKind::Operator(Operator::Or)
    } else {
        TokenKind::Identifier(word)
    };
    Token { kind, offset }
}

/// Splits a rule into words and parentheses. Whitespace only separates.
fn tokenize(rule: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (offset, ch) in rule.char_indices() {
        if !is_separator(ch) {
            if word_start.is_none() {
                word_start = Some(offset);
            }
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push(classify(&rule[start..offset], start));
        }
        match ch {
            '(' => tokens.push(Token {
                kind: TokenKind::Open,
                offset,
            }),
            ')' => tokens.push(Token {
                kind: TokenKind::Close,
                offset,
            }),
            _ => {}
        }
    }
    if let Some(start) = word_start {
        tokens.push(classify(&rule[start..], start));
    }
    tokens
}

/// Whether `candidate` survives tokenization as exactly one identifier token.
pub fn is_valid_identifier(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.chars().any(is_separator)
        && !candidate.eq_ignore_ascii_case("and")
        && !candidate.eq_ignore_ascii_case("or")
}

// ========================================================================================
//                                Parsed rule
// ========================================================================================

/// A tokenized rule whose parentheses are known to balance.
#[derive(Debug)]
struct ParsedRule<'r> {
    tokens: Vec<Token<'r>>,
    /// For every `(` token, the index of its matching `)`. Unused for other tokens.
    partners: Vec<usize>,
}

impl<'r> ParsedRule<'r> {
    fn parse(rule: &'r str) -> Result<Self, RuleError> {
        let tokens = tokenize(rule);
        let mut partners = vec![0; tokens.len()];
        let mut open_stack: Vec<usize> = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Open => {
                    open_stack.push(index);
                    if open_stack.len() > MAX_NESTING_DEPTH {
                        return Err(RuleError::syntax(token.offset, SyntaxFault::NestingTooDeep));
                    }
                }
                TokenKind::Close => {
                    let open = open_stack
                        .pop()
                        .ok_or_else(|| RuleError::syntax(token.offset, SyntaxFault::UnmatchedClose))?;
                    partners[open] = index;
                }
                TokenKind::Identifier(_) | TokenKind::Operator(_) => {}
            }
        }

        // Report the outermost unclosed group; it is where the reader's eye should go.
        if let Some(&open) = open_stack.first() {
            return Err(RuleError::syntax(
                tokens[open].offset,
                SyntaxFault::UnmatchedOpen,
            ));
        }

        Ok(Self { tokens, partners })
    }

    /// Reduces the tokens in `start..end` (one group's contents) to a single value.
    ///
    /// `group_offset` is where the group begins in the rule text and is only used for
    /// error reporting.
    fn reduce(
        &self,
        start: usize,
        end: usize,
        group_offset: usize,
        lookup: &ExpressionLookup<'_>,
        or_policy: OrPolicy,
    ) -> Result<f64, RuleError> {
        let mut state = Reduction::default();
        let mut cursor = start;

        while cursor < end {
            let token = self.tokens[cursor];
            match token.kind {
                TokenKind::Identifier(identifier) => {
                    let value = lookup.get(identifier).ok_or_else(|| {
                        RuleError::UnknownIdentifier {
                            identifier: identifier.to_string(),
                            offset: token.offset,
                        }
                    })?;
                    state.push_operand(value, token.offset, or_policy)?;
                    cursor += 1;
                }
                TokenKind::Operator(operator) => {
                    state.push_operator(operator, token.offset)?;
                    cursor += 1;
                }
                TokenKind::Open => {
                    let close = self.partners[cursor];
                    let value = self.reduce(cursor + 1, close, token.offset, lookup, or_policy)?;
                    state.push_operand(value, token.offset, or_policy)?;
                    cursor = close + 1;
                }
                // Balanced input never reaches a `)` here: each one is consumed as the
                // `end` bound of the group it closes.
                TokenKind::Close => {
                    return Err(RuleError::syntax(token.offset, SyntaxFault::UnmatchedClose));
                }
            }
        }

        state.finish(group_offset)
    }
}

/// Left-to-right reduction state for one group.
///
/// The running value is the first operand. A second operand never needs a slot of its
/// own: it is folded into the running value the moment it arrives, which is exactly
/// what makes evaluation precedence-free.
#[derive(Debug, Default)]
struct Reduction {
    accumulated: Option<f64>,
    pending: Option<(Operator, usize)>,
}

impl Reduction {
    fn push_operand(
        &mut self,
        value: f64,
        offset: usize,
        or_policy: OrPolicy,
    ) -> Result<(), RuleError> {
        let next = match (self.accumulated, self.pending.take()) {
            (None, None) => value,
            (Some(left), Some((operator, _))) => operator.apply(left, value, or_policy),
            (Some(_), None) => return Err(RuleError::syntax(offset, SyntaxFault::MissingOperator)),
            (None, Some((_, operator_offset))) => {
                return Err(RuleError::syntax(
                    operator_offset,
                    SyntaxFault::MissingLeftOperand,
                ));
            }
        };
        self.accumulated = Some(next);
        Ok(())
    }

    fn push_operator(&mut self, operator: Operator, offset: usize) -> Result<(), RuleError> {
        if self.accumulated.is_none() {
            return Err(RuleError::syntax(offset, SyntaxFault::MissingLeftOperand));
        }
        if self.pending.is_some() {
            return Err(RuleError::syntax(offset, SyntaxFault::ConsecutiveOperators));
        }
        self.pending = Some((operator, offset));
        Ok(())
    }

    fn finish(self, group_offset: usize) -> Result<f64, RuleError> {
        if let Some((_, offset)) = self.pending {
            return Err(RuleError::syntax(offset, SyntaxFault::DanglingOperator));
        }
        self.accumulated
            .ok_or_else(|| RuleError::syntax(group_offset, SyntaxFault::EmptyGroup))
    }
}

// ========================================================================================
//                                   Public API
// ========================================================================================

/// Evaluates `rule` against one sample's lookup.
///
/// `AND` takes the minimum of its operands and `OR` merges them by `or_policy`. A
/// rule with no tokens at all (empty or whitespace only) scores 0.
pub fn evaluate(
    rule: &str,
    lookup: &ExpressionLookup<'_>,
    or_policy: OrPolicy,
) -> Result<f64, RuleError> {
    let parsed = ParsedRule::parse(rule)?;
    if parsed.tokens.is_empty() {
        return Ok(0.0);
    }
    parsed.reduce(0, parsed.tokens.len(), 0, lookup, or_policy)
}

/// Rewrites every identifier of `rule` through `rename`, keeping keywords, parentheses
/// and spacing untouched. Used to derive alias-keyed rules from primary-id rules.
pub fn translate_identifiers<'a, F>(rule: &str, mut rename: F) -> Result<String, RuleError>
where
    F: FnMut(&str) -> Option<&'a str>,
{
    let mut translated = String::with_capacity(rule.len());
    let mut cursor = 0;

    for token in tokenize(rule) {
        if let TokenKind::Identifier(identifier) = token.kind {
            let replacement = rename(identifier).ok_or_else(|| RuleError::UnknownIdentifier {
                identifier: identifier.to_string(),
                offset: token.offset,
            })?;
            translated.push_str(&rule[cursor..token.offset]);
            translated.push_str(replacement);
            cursor = token.offset + identifier.len();
        }
    }
    translated.push_str(&rule[cursor..]);
    Ok(translated)
}

/// The distinct identifiers a rule mentions, in order of first appearance.
pub fn identifiers(rule: &str) -> Vec<&str> {
    let mut seen = Vec::new();
    for token in tokenize(rule) {
        if let TokenKind::Identifier(identifier) = token.kind {
            if !seen.contains(&identifier) {
                seen.push(identifier);
            }
        }
    }
    seen
}
