//! Source expansion
//!
//! Rewrites each source line into canonical one-instruction-per-line
//! form. A line containing parenthesized sub-expressions is decoded
//! into the sub-instructions followed by the parent line, with each
//! sub-expression replaced by its first operand (the register the
//! sub-instruction populates). The expanded-to-source line map is kept
//! for diagnostics.

use rustc_hash::FxHashMap;

/// Expand source lines to flat form
///
/// Returns the expanded lines and a map from expanded line index to the
/// originating source line index.
pub fn expand_source(lines: &[String]) -> (Vec<String>, FxHashMap<usize, usize>) {
    let mut expanded = Vec::with_capacity(lines.len());
    let mut source_map = FxHashMap::default();

    for (source_index, line) in lines.iter().enumerate() {
        let stripped = line.trim_start();
        if stripped.contains('(') && !stripped.starts_with(';') {
            let indent = &line[..line.len() - stripped.len()];
            for decoded in decode_line(stripped) {
                source_map.insert(expanded.len(), source_index);
                expanded.push(format!("{}{}", indent, decoded));
            }
        } else {
            source_map.insert(expanded.len(), source_index);
            expanded.push(line.clone());
        }
    }

    (expanded, source_map)
}

/// One token of a line under expansion
enum Token {
    Atom(String),
    Group(Vec<Token>),
}

/// Decode a line with parenthesized sub-expressions into flat lines
///
/// Sub-expressions are emitted before their parent, innermost first;
/// the last returned line is the rewritten parent.
fn decode_line(line: &str) -> Vec<String> {
    let tokens = tokenize(line);
    let (mut lines, flat) = flatten(tokens);
    lines.push(flat.join(" "));
    lines
}

fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            chars.next();
            tokens.push(Token::Group(tokenize_group(&mut chars)));
        } else if c == '"' {
            tokens.push(Token::Atom(read_quoted(&mut chars)));
        } else {
            let mut atom = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '(' || c == ')' {
                    break;
                }
                atom.push(c);
                chars.next();
            }
            tokens.push(Token::Atom(atom));
        }
    }
    tokens
}

fn tokenize_group(chars: &mut std::iter::Peekable<std::str::Chars>) -> Vec<Token> {
    let mut tokens = Vec::new();
    while let Some(&c) = chars.peek() {
        if c == ')' {
            chars.next();
            break;
        } else if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            chars.next();
            tokens.push(Token::Group(tokenize_group(chars)));
        } else if c == '"' {
            tokens.push(Token::Atom(read_quoted(chars)));
        } else {
            let mut atom = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '(' || c == ')' {
                    break;
                }
                atom.push(c);
                chars.next();
            }
            tokens.push(Token::Atom(atom));
        }
    }
    tokens
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut atom = String::new();
    atom.push(chars.next().expect("caller saw an opening quote"));
    let mut escaped = false;
    for c in chars.by_ref() {
        atom.push(c);
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            break;
        }
    }
    atom
}

/// Flatten a token list: nested groups become leading lines, their
/// place in the parent taken by the register their result lands in
fn flatten(tokens: Vec<Token>) -> (Vec<String>, Vec<String>) {
    let mut lines = Vec::new();
    let mut flat = Vec::new();

    for token in tokens {
        match token {
            Token::Atom(atom) => flat.push(atom),
            Token::Group(inner) => {
                let (inner_lines, inner_flat) = flatten(inner);
                lines.extend(inner_lines);
                let replacement = result_operand(&inner_flat);
                lines.push(inner_flat.join(" "));
                flat.push(replacement);
            }
        }
    }

    (lines, flat)
}

/// The operand of a flat instruction naming the register its result
/// lands in: third for three-operand arithmetic and comparison, second
/// for two-operand moves and conversions, first for constructors
fn result_operand(flat: &[String]) -> String {
    let mnemonic = flat.first().map(String::as_str).unwrap_or("");
    let position = match mnemonic {
        "iadd" | "isub" | "imul" | "idiv" | "ilt" | "ilte" | "igt" | "igte" | "ieq" | "fadd"
        | "fsub" | "fmul" | "fdiv" | "flt" | "flte" | "fgt" | "fgte" | "feq" | "badd" | "bsub"
        | "blt" | "blte" | "bgt" | "bgte" | "beq" | "streq" | "and" | "or" => 3,
        "copy" | "move" | "itof" | "ftoi" | "stoi" | "stof" | "isnull" | "isptr" | "vlen"
        | "ref" | "ptr" | "deptr" | "vat" | "vpop" => 2,
        _ => 1,
    };
    flat.get(position).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(source: &[&str]) -> Vec<String> {
        source.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn test_plain_lines_pass_through() {
        let source = lines(&[".function: main", "    izero 0", "    end", ".end"]);
        let (expanded, map) = expand_source(&source);
        assert_eq!(expanded, source);
        assert_eq!(map[&2], 2);
    }

    #[test]
    fn test_single_subexpression() {
        let source = lines(&["    print (istore 1 42)"]);
        let (expanded, map) = expand_source(&source);
        assert_eq!(expanded, lines(&["    istore 1 42", "    print 1"]));
        assert_eq!(map[&0], 0);
        assert_eq!(map[&1], 0);
    }

    #[test]
    fn test_nested_subexpressions() {
        let source = lines(&["print (iadd (istore 1 40) (istore 2 2) 3)"]);
        let (expanded, _) = expand_source(&source);
        assert_eq!(
            expanded,
            lines(&["istore 1 40", "istore 2 2", "iadd 1 2 3", "print 3"])
        );
    }

    #[test]
    fn test_quoted_strings_survive() {
        let source = lines(&["print (strstore 1 \"a (quoted) string\")"]);
        let (expanded, _) = expand_source(&source);
        assert_eq!(
            expanded,
            lines(&["strstore 1 \"a (quoted) string\"", "print 1"])
        );
    }

    #[test]
    fn test_indent_preserved() {
        let source = lines(&["    print (izero 2)"]);
        let (expanded, _) = expand_source(&source);
        assert_eq!(expanded, lines(&["    izero 2", "    print 2"]));
    }
}
