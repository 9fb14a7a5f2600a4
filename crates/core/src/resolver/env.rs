//! Environment-variable declaration matching

use crate::input::Input;
use crate::task::EnvVarDeclaration;
use crate::{Error, Result};
use globset::Glob;
use std::collections::BTreeMap;

/// Match the declaration's name patterns against an environment snapshot.
///
/// Each pattern is checked on its own; a required pattern matching no
/// variable fails the whole declaration.
pub(crate) fn resolve(
    task: &str,
    decl: &EnvVarDeclaration,
    environment: &BTreeMap<String, String>,
) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();
    for pattern in &decl.names {
        let matcher = Glob::new(pattern)
            .map_err(|e| {
                Error::invalid_declaration(task, format!("invalid variable pattern '{pattern}': {e}"))
            })?
            .compile_matcher();

        let before = inputs.len();
        inputs.extend(
            environment
                .iter()
                .filter(|(name, _)| matcher.is_match(name.as_str()))
                .map(|(name, value)| Input::env_var(name, value)),
        );

        if inputs.len() == before {
            if decl.optional {
                tracing::debug!(task = %task, pattern = %pattern, "Optional variable pattern matched nothing");
            } else {
                return Err(Error::pattern_matched_zero(task, pattern));
            }
        }
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("AWS_REGION".to_string(), "eu-west-1".to_string()),
            ("AWS_PROFILE".to_string(), "dev".to_string()),
            ("HOME".to_string(), "/home/dev".to_string()),
        ])
    }

    #[test]
    fn test_exact_and_glob_names() {
        let decl = EnvVarDeclaration {
            names: vec!["HOME".to_string(), "AWS_*".to_string()],
            optional: false,
        };
        let ids: Vec<String> = resolve("t.x", &decl, &env())
            .unwrap()
            .iter()
            .map(Input::identity)
            .collect();
        assert_eq!(ids, vec!["$HOME", "$AWS_PROFILE", "$AWS_REGION"]);
    }

    #[test]
    fn test_required_missing_variable_fails() {
        let decl = EnvVarDeclaration {
            names: vec!["HOME".to_string(), "CI".to_string()],
            optional: false,
        };
        let err = resolve("t.x", &decl, &env()).unwrap_err();
        assert!(matches!(err, Error::PatternMatchedZero { ref pattern, .. } if pattern == "CI"));
    }

    #[test]
    fn test_optional_missing_variable_is_skipped() {
        let decl = EnvVarDeclaration {
            names: vec!["CI".to_string(), "HOME".to_string()],
            optional: true,
        };
        assert_eq!(resolve("t.x", &decl, &env()).unwrap().len(), 1);
    }

    #[test]
    fn test_value_is_part_of_digest() {
        let decl = EnvVarDeclaration {
            names: vec!["HOME".to_string()],
            optional: false,
        };
        let mut other = env();
        other.insert("HOME".to_string(), "/root".to_string());
        let a = resolve("t.x", &decl, &env()).unwrap()[0].digest().unwrap();
        let b = resolve("t.x", &decl, &other).unwrap()[0].digest().unwrap();
        assert_ne!(a, b);
    }
}
