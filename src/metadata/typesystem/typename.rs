//! Reflection type names, as serialized in custom attribute and security blobs.
//!
//! ```text
//! Namespace.Outer+Inner`1[[Arg, ArgAssembly]][], Assembly, Version=1.0.0.0, ...
//! ```

use std::fmt;

use crate::{metadata::typesystem::AssemblyNameReference, Result};

/// A parsed reflection type name
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    /// Namespace of the outermost type
    pub namespace: String,
    /// Name of the outermost type
    pub name: String,
    /// Names of nested types, outermost first
    pub nested: Vec<String>,
    /// Generic arguments
    pub generic_arguments: Vec<TypeName>,
    /// Array, pointer and by-ref suffixes, verbatim
    pub suffix: String,
    /// Assembly part, if the name is assembly-qualified
    pub assembly: Option<AssemblyNameReference>,
}

impl TypeName {
    /// Parse a possibly assembly-qualified name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on an empty name, unbalanced brackets or a bad
    /// assembly part.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (type_part, assembly_part) = match find_top_level(input, ',') {
            Some(index) => (&input[..index], Some(input[index + 1..].trim())),
            None => (input, None),
        };

        let name_end = find_unescaped(type_part, &['[', '*', '&']).unwrap_or(type_part.len());
        let (full_name, mut rest) = type_part.split_at(name_end);
        if full_name.trim().is_empty() {
            return Err(malformed_error!("Empty type name in '{}'", input));
        }

        let mut generic_arguments = Vec::new();
        if rest.starts_with('[') && is_generic_argument_list(rest) {
            let close = matching_bracket(rest)
                .ok_or_else(|| malformed_error!("Unbalanced brackets in '{}'", input))?;
            for argument in split_top_level(&rest[1..close], ',') {
                let argument = argument.trim();
                let argument = argument
                    .strip_prefix('[')
                    .and_then(|inner| inner.strip_suffix(']'))
                    .unwrap_or(argument);
                generic_arguments.push(TypeName::parse(argument)?);
            }
            rest = &rest[close + 1..];
        }

        let mut parts = split_unescaped(full_name.trim(), '+').into_iter();
        let outermost = parts.next().unwrap_or_default();
        let (namespace, name) = match outermost.rfind('.') {
            Some(dot) => (outermost[..dot].to_string(), outermost[dot + 1..].to_string()),
            None => (String::new(), outermost),
        };

        let assembly = match assembly_part {
            Some(part) if !part.is_empty() => Some(AssemblyNameReference::parse(part)?),
            _ => None,
        };

        Ok(TypeName {
            namespace,
            name,
            nested: parts.collect(),
            generic_arguments,
            suffix: rest.trim().to_string(),
            assembly,
        })
    }

    /// Name of the innermost type
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.nested.last().unwrap_or(&self.name)
    }

    /// Full name without arguments, suffixes or assembly, `Outer/Inner` for nested types
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut result = if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        };
        for nested in &self.nested {
            result.push('/');
            result.push_str(nested);
        }
        result
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name().replace('/', "+"))?;
        if !self.generic_arguments.is_empty() {
            f.write_str("[")?;
            for (i, argument) in self.generic_arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "[{argument}]")?;
            }
            f.write_str("]")?;
        }
        f.write_str(&self.suffix)?;
        if let Some(assembly) = &self.assembly {
            write!(f, ", {}", assembly.display_name())?;
        }
        Ok(())
    }
}

fn is_generic_argument_list(rest: &str) -> bool {
    !matches!(rest[1..].chars().next(), None | Some(']' | ',' | '*'))
}

fn find_unescaped(input: &str, targets: &[char]) -> Option<usize> {
    let mut escaped = false;
    for (index, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if targets.contains(&c) {
            return Some(index);
        }
    }
    None
}

fn find_top_level(input: &str, target: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (index, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == target && depth == 0 => return Some(index),
            _ => {}
        }
    }
    None
}

fn matching_bracket(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (index, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(index) = find_top_level(rest, separator) {
        parts.push(&rest[..index]);
        rest = &rest[index + 1..];
    }
    parts.push(rest);
    parts
}

fn split_unescaped(input: &str, separator: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut escaped = false;
    for c in input.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
            continue;
        } else if c == separator {
            parts.push(String::new());
            continue;
        }
        if let Some(last) = parts.last_mut() {
            last.push(c);
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_nested() {
        let name = TypeName::parse("System.Reflection.BindingFlags").unwrap();
        assert_eq!(name.namespace, "System.Reflection");
        assert_eq!(name.name, "BindingFlags");
        assert!(name.assembly.is_none());

        let name = TypeName::parse("Outer.Space.Host+Inner+Deep").unwrap();
        assert_eq!(name.full_name(), "Outer.Space.Host/Inner/Deep");
        assert_eq!(name.simple_name(), "Deep");
        assert_eq!(name.to_string(), "Outer.Space.Host+Inner+Deep");
    }

    #[test]
    fn assembly_qualified_generic() {
        let name = TypeName::parse(
            "System.Collections.Generic.List`1[[System.Int32, mscorlib, Version=4.0.0.0, \
             Culture=neutral, PublicKeyToken=b77a5c561934e089]][], mscorlib, Version=4.0.0.0",
        )
        .unwrap();

        assert_eq!(name.name, "List`1");
        assert_eq!(name.suffix, "[]");
        assert_eq!(name.generic_arguments.len(), 1);
        assert_eq!(name.generic_arguments[0].full_name(), "System.Int32");
        assert_eq!(
            name.generic_arguments[0]
                .assembly
                .as_ref()
                .map(|assembly| assembly.name.as_str()),
            Some("mscorlib")
        );
        assert_eq!(name.assembly.unwrap().name, "mscorlib");
    }

    #[test]
    fn escapes_and_errors() {
        let name = TypeName::parse(r"Odd\+Name").unwrap();
        assert_eq!(name.name, "Odd+Name");
        assert!(name.nested.is_empty());

        assert!(TypeName::parse("").is_err());
        assert!(TypeName::parse("List`1[[A]").is_err());
        assert!(TypeName::parse("A, , Version=1.0").is_err());
    }
}
