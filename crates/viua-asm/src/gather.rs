//! Gathering pass
//!
//! Scans expanded source for top-level directives, collecting function
//! and block bodies as name-keyed ordered maps together with external
//! signatures, jump marks and named registers.

use crate::tokens::{after_chunk, chunk};
use crate::AsmError;
use rustc_hash::FxHashMap;

/// Functions or blocks gathered from a source file
#[derive(Debug, Default)]
pub struct Invocables {
    /// Definition order; address mapping and emission follow it
    pub names: Vec<String>,
    /// Names declared through `.signature:`/`.bsignature:` only
    pub signatures: Vec<String>,
    pub bodies: FxHashMap<String, Vec<String>>,
}

impl Invocables {
    /// Whether a name is defined locally or declared as a signature
    pub fn is_known(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
            || self.signatures.iter().any(|known| known == name)
    }
}

/// Collect `.function:` bodies and `.signature:` declarations
pub fn gather_functions(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
) -> Result<Invocables, AsmError> {
    gather(expanded, source_map, ".function:", ".signature:")
}

/// Collect `.block:` bodies and `.bsignature:` declarations
pub fn gather_blocks(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
) -> Result<Invocables, AsmError> {
    gather(expanded, source_map, ".block:", ".bsignature:")
}

fn gather(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    opening: &str,
    signature: &str,
) -> Result<Invocables, AsmError> {
    let mut invocables = Invocables::default();

    let mut index = 0;
    while index < expanded.len() {
        let line = expanded[index].trim();

        if chunk(line) == signature {
            invocables.signatures.push(after_chunk(line).to_string());
            index += 1;
            continue;
        }

        if chunk(line) != opening {
            // Skip over other definition blocks so their bodies are not
            // scanned for this kind's directives.
            if line.starts_with(".function:") || line.starts_with(".block:")
                || line.starts_with(".class:")
            {
                index = end_of_block(expanded, source_map, index)?;
            }
            index += 1;
            continue;
        }

        let name = chunk(after_chunk(line)).to_string();
        if name.is_empty() {
            return Err(AsmError::fatal_at(
                format!("`{}` directive without a name", opening),
                source_line(source_map, index),
            ));
        }
        if invocables.bodies.contains_key(&name) {
            return Err(AsmError::fatal_at(
                format!("duplicated definition of '{}'", name),
                source_line(source_map, index),
            ));
        }

        let end = end_of_block(expanded, source_map, index)?;
        let body: Vec<String> = expanded[index + 1..end]
            .iter()
            .map(|body_line| body_line.trim().to_string())
            .filter(|body_line| !body_line.is_empty() && !body_line.starts_with(';'))
            .collect();

        invocables.names.push(name.clone());
        invocables.bodies.insert(name, body);
        index = end + 1;
    }

    Ok(invocables)
}

/// Index of the `.end` closing the block opened at `start`
fn end_of_block(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    start: usize,
) -> Result<usize, AsmError> {
    for (offset, line) in expanded[start + 1..].iter().enumerate() {
        if line.trim() == ".end" {
            return Ok(start + 1 + offset);
        }
    }
    Err(AsmError::fatal_at(
        format!("missing `.end` for `{}`", expanded[start].trim()),
        source_line(source_map, start),
    ))
}

fn source_line(source_map: &FxHashMap<usize, usize>, expanded_index: usize) -> usize {
    source_map.get(&expanded_index).copied().unwrap_or(expanded_index)
}

/// Jump marks of a body: mark name mapped to the index of the next
/// instruction
pub fn get_marks(body: &[String]) -> FxHashMap<String, usize> {
    let mut marks = FxHashMap::default();
    let mut instruction = 0;
    for line in body {
        if chunk(line) == ".mark:" {
            marks.insert(chunk(after_chunk(line)).to_string(), instruction);
        } else if !line.starts_with('.') {
            instruction += 1;
        }
    }
    marks
}

/// Named registers of a body: `.name: <index> <name>` directives
pub fn get_names(body: &[String]) -> Result<FxHashMap<String, i32>, AsmError> {
    let mut names = FxHashMap::default();
    for line in body {
        if chunk(line) != ".name:" {
            continue;
        }
        let rest = after_chunk(line);
        let index = chunk(rest);
        let name = chunk(after_chunk(rest));
        let index: i32 = index.parse().map_err(|_| {
            AsmError::fatal(format!(
                "invalid register index in name directive: {}",
                index
            ))
        })?;
        names.insert(name.to_string(), index);
    }
    Ok(names)
}

/// Names of modules requested through `.link:` directives
pub fn get_links(expanded: &[String]) -> Vec<String> {
    expanded
        .iter()
        .map(|line| line.trim())
        .filter(|line| chunk(line) == ".link:")
        .map(|line| chunk(after_chunk(line)).to_string())
        .collect()
}

/// The function designated as main by a `.main:` directive, if any
pub fn get_main_function(expanded: &[String]) -> Option<String> {
    expanded
        .iter()
        .map(|line| line.trim())
        .find(|line| chunk(line) == ".main:")
        .map(|line| chunk(after_chunk(line)).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand_source;

    fn expand(source: &[&str]) -> (Vec<String>, FxHashMap<usize, usize>) {
        let lines: Vec<String> = source.iter().map(|line| line.to_string()).collect();
        expand_source(&lines)
    }

    #[test]
    fn test_gather_functions_and_blocks() {
        let (expanded, map) = expand(&[
            ".signature: printer.print",
            ".function: main",
            "    izero 0",
            "    end",
            ".end",
            ".block: handler",
            "    leave",
            ".end",
        ]);
        let functions = gather_functions(&expanded, &map).unwrap();
        let blocks = gather_blocks(&expanded, &map).unwrap();

        assert_eq!(functions.names, vec!["main"]);
        assert_eq!(functions.signatures, vec!["printer.print"]);
        assert_eq!(
            functions.bodies["main"],
            vec!["izero 0".to_string(), "end".to_string()]
        );
        assert_eq!(blocks.names, vec!["handler"]);
        assert!(functions.is_known("main"));
        assert!(functions.is_known("printer.print"));
        assert!(!functions.is_known("handler"));
    }

    #[test]
    fn test_duplicate_definition() {
        let (expanded, map) = expand(&[
            ".function: main",
            "    end",
            ".end",
            ".function: main",
            "    end",
            ".end",
        ]);
        let err = gather_functions(&expanded, &map).unwrap_err();
        assert!(err.message.contains("duplicated definition of 'main'"));
    }

    #[test]
    fn test_missing_end() {
        let (expanded, map) = expand(&[".function: main", "    izero 0"]);
        let err = gather_functions(&expanded, &map).unwrap_err();
        assert!(err.message.contains("missing `.end`"));
    }

    #[test]
    fn test_marks_and_names() {
        let body = vec![
            ".name: 1 counter".to_string(),
            "izero counter".to_string(),
            ".mark: loop".to_string(),
            "iinc counter".to_string(),
            "jump loop".to_string(),
        ];
        let marks = get_marks(&body);
        assert_eq!(marks["loop"], 1);

        let names = get_names(&body).unwrap();
        assert_eq!(names["counter"], 1);
    }

    #[test]
    fn test_links_and_main() {
        let (expanded, _) = expand(&[".link: mathlib", ".main: start", ".function: start", "end", ".end"]);
        assert_eq!(get_links(&expanded), vec!["mathlib"]);
        assert_eq!(get_main_function(&expanded), Some("start".to_string()));
    }
}
