use std::collections::HashMap;

use crate::error::AskError;

/// A named prompt with `{variable}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub body: &'static str,
}

pub const CODE_REVIEW: &str = "code_review";
pub const EXPLAIN_CODE: &str = "explain_code";

pub const BUILTIN: [Template; 5] = [
    Template {
        name: CODE_REVIEW,
        body: "Please review the following code:\n{code}\n\
               Focus on:\n\
               1. Code quality\n\
               2. Potential bugs\n\
               3. Performance improvements\n\
               4. Security considerations\n\
               5. Best practices",
    },
    Template {
        name: EXPLAIN_CODE,
        body: "Please explain how this code works:\n{code}\n\
               Provide:\n\
               1. High-level overview\n\
               2. Detailed explanation of key components\n\
               3. Flow of execution\n\
               4. Practical examples\n\
               5. Potential edge cases",
    },
    Template {
        name: "refactor",
        body: "Please suggest refactoring improvements for this code:\n{code}\n\
               Consider:\n\
               1. Clean code principles\n\
               2. Design patterns\n\
               3. Performance optimization\n\
               4. Code maintainability\n\
               5. Modern best practices",
    },
    Template {
        name: "debug",
        body: "Help debug this code:\n{code}\n\
               Error message:\n{error}\n\
               Please provide:\n\
               1. Error analysis\n\
               2. Potential causes\n\
               3. Solution suggestions\n\
               4. Prevention tips",
    },
    Template {
        name: "optimize",
        body: "Optimize this code for better performance:\n{code}\n\
               Consider:\n\
               1. Time complexity\n\
               2. Space complexity\n\
               3. Resource usage\n\
               4. Algorithm improvements\n\
               5. Language-specific optimizations",
    },
];

/// Look up a built-in template by name.
pub fn get(name: &str) -> Result<&'static Template, AskError> {
    BUILTIN.iter().find(|t| t.name == name).ok_or_else(|| {
        let known: Vec<&str> = BUILTIN.iter().map(|t| t.name).collect();
        AskError::Configuration(format!(
            "template '{name}' not found (available: {})",
            known.join(", ")
        ))
    })
}

impl Template {
    /// Substitute every `{ident}` placeholder. A placeholder with no matching
    /// variable is a validation error; braces that don't enclose an
    /// identifier are copied through untouched.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String, AskError> {
        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_ident(&after[..close]) => {
                    let key = &after[..close];
                    let value = vars.get(key).ok_or_else(|| {
                        AskError::validation(
                            "template",
                            format!("missing required variable in template {}: {key}", self.name),
                        )
                    })?;
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.body;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            if let Some(close) = after.find('}')
                && is_ident(&after[..close])
            {
                if !names.contains(&&after[..close]) {
                    names.push(&after[..close]);
                }
                rest = &after[close + 1..];
            } else {
                rest = after;
            }
        }
        names
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
