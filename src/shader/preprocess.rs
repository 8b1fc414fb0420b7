//! `#include` and `#ifdef` handling for WGSL templates.
//!
//! WGSL has no preprocessor, so variants are produced textually before
//! the source reaches naga. Supported directives, one per line:
//!
//! ```text
//! #include "module.wgsl"
//! #ifdef NAME / #ifndef NAME / #else / #endif
//! ```
//!
//! Includes are expanded first (each module at most once), so an include
//! inside a disabled block contributes nothing.

use super::ShaderError;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Expands includes and conditionals
#[derive(Debug, Default, Clone)]
pub struct ShaderComposer {
    includes: HashMap<String, String>,
}

impl ShaderComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `source` available as `#include "path"`
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    pub fn compose(&self, source: &str, defines: &BTreeSet<&str>) -> Result<String, ShaderError> {
        let mut included = HashSet::new();
        let resolved = self.resolve_includes(source, &mut included)?;
        apply_conditionals(&resolved, defines)
    }

    fn resolve_includes(&self, source: &str, included: &mut HashSet<String>) -> Result<String, ShaderError> {
        let mut result = String::with_capacity(source.len());
        for line in source.lines() {
            match parse_include_directive(line.trim()) {
                Some(path) => {
                    if !included.insert(path.to_string()) {
                        continue;
                    }
                    let module = self
                        .includes
                        .get(path)
                        .ok_or_else(|| ShaderError::Preprocess(format!("include not found: \"{path}\"")))?;
                    result.push_str(&self.resolve_includes(module, included)?);
                }
                None => {
                    result.push_str(line);
                    result.push('\n');
                }
            }
        }
        Ok(result)
    }
}

fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

struct Block {
    /// Whether the enclosing blocks are all active
    parent_active: bool,
    /// Whether the current branch emits lines
    active: bool,
    seen_else: bool,
}

/// Keep the lines whose `#ifdef`/`#ifndef` conditions hold
pub fn apply_conditionals(source: &str, defines: &BTreeSet<&str>) -> Result<String, ShaderError> {
    let mut output = String::with_capacity(source.len());
    let mut stack: Vec<Block> = Vec::new();
    let active = |stack: &[Block]| stack.last().map_or(true, |b| b.active);

    for (number, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        match words.next() {
            Some(directive @ ("#ifdef" | "#ifndef")) => {
                let name = words
                    .next()
                    .ok_or_else(|| ShaderError::Preprocess(format!("line {}: {directive} without a name", number + 1)))?;
                let parent_active = active(&stack);
                let condition = defines.contains(name) == (directive == "#ifdef");
                stack.push(Block {
                    parent_active,
                    active: parent_active && condition,
                    seen_else: false,
                });
            }
            Some("#else") => {
                let block = stack
                    .last_mut()
                    .ok_or_else(|| ShaderError::Preprocess(format!("line {}: #else without #ifdef", number + 1)))?;
                if block.seen_else {
                    return Err(ShaderError::Preprocess(format!("line {}: duplicate #else", number + 1)));
                }
                block.seen_else = true;
                block.active = block.parent_active && !block.active;
            }
            Some("#endif") => {
                stack
                    .pop()
                    .ok_or_else(|| ShaderError::Preprocess(format!("line {}: #endif without #ifdef", number + 1)))?;
            }
            _ => {
                if active(&stack) {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(ShaderError::Preprocess(format!("{} unterminated #ifdef block(s)", stack.len())));
    }
    Ok(output)
}
