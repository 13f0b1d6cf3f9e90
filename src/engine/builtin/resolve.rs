// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Name resolution for parsed filters
//!
//! Every problem is collected, not just the first, so that one compile
//! reports all undefined variables and functions.

use super::SyntaxError;
use super::ast::{Filter, FilterRef, InterpPart};

/// Check that every variable and function reference resolves
pub(crate) fn resolve(filter: &FilterRef, globals: &[String]) -> Vec<SyntaxError> {
    let mut resolver = Resolver {
        scope: globals.to_vec(),
        problems: Vec::new(),
    };
    resolver.visit(filter);
    resolver.problems.sort_by_key(|problem| problem.offset);
    resolver.problems
}

struct Resolver {
    scope: Vec<String>,
    problems: Vec<SyntaxError>,
}

impl Resolver {
    fn scoped(&mut self, name: &str, body: &FilterRef) {
        self.scope.push(name.to_string());
        self.visit(body);
        self.scope.pop();
    }

    fn visit(&mut self, filter: &FilterRef) {
        match &**filter {
            Filter::Identity | Filter::Recurse | Filter::Literal(_) => {}
            Filter::Interpolated(parts) => {
                for part in parts {
                    if let InterpPart::Expr(expr) = part {
                        self.visit(expr);
                    }
                }
            }
            Filter::Variable { name, offset } => {
                if !self.scope.iter().any(|bound| bound == name) {
                    self.problems
                        .push(SyntaxError::new(format!("${name} is not defined"), *offset));
                }
            }
            Filter::Index { target, key } => {
                self.visit(target);
                self.visit(key);
            }
            Filter::Slice { target, from, to } => {
                self.visit(target);
                for bound in [from, to].into_iter().flatten() {
                    self.visit(bound);
                }
            }
            Filter::Iterate(inner) | Filter::Negate(inner) => self.visit(inner),
            Filter::Pipe(lhs, rhs)
            | Filter::Comma(lhs, rhs)
            | Filter::And(lhs, rhs)
            | Filter::Or(lhs, rhs)
            | Filter::Alternative(lhs, rhs)
            | Filter::Binary { lhs, rhs, .. } => {
                self.visit(lhs);
                self.visit(rhs);
            }
            Filter::Array(body) => {
                if let Some(body) = body {
                    self.visit(body);
                }
            }
            Filter::Object(entries) => {
                for (key, value) in entries {
                    self.visit(key);
                    self.visit(value);
                }
            }
            Filter::If {
                cond,
                then,
                otherwise,
            } => {
                self.visit(cond);
                self.visit(then);
                self.visit(otherwise);
            }
            Filter::Try { body, handler } => {
                self.visit(body);
                if let Some(handler) = handler {
                    self.visit(handler);
                }
            }
            Filter::Reduce {
                source,
                name,
                init,
                update,
            } => {
                self.visit(source);
                self.visit(init);
                self.scoped(name, update);
            }
            Filter::Bind { source, name, body } => {
                self.visit(source);
                self.scoped(name, body);
            }
            Filter::Call {
                name,
                args,
                native,
                offset,
            } => {
                if native.is_none() {
                    self.problems.push(SyntaxError::new(
                        format!("{name}/{} is not defined", args.len()),
                        *offset,
                    ));
                }
                for arg in args {
                    self.visit(arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtin::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn problems(source: &str, globals: &[&str]) -> Vec<String> {
        let globals: Vec<String> = globals.iter().map(|g| g.to_string()).collect();
        resolve(&parse_program(source).unwrap(), &globals)
            .into_iter()
            .map(|problem| problem.message)
            .collect()
    }

    #[test]
    fn test_bound_names_resolve() {
        assert!(problems("$x + 1", &["x"]).is_empty());
        assert!(problems(". as $y | $y", &[]).is_empty());
        assert!(problems("reduce .[] as $i (0; . + $i)", &[]).is_empty());
    }

    #[test]
    fn test_every_problem_is_reported_in_order() {
        assert_eq!(
            problems("$a, nosuch(1), $b", &[]),
            vec![
                "$a is not defined".to_string(),
                "nosuch/1 is not defined".to_string(),
                "$b is not defined".to_string(),
            ]
        );
    }

    #[test]
    fn test_binding_scope_ends_with_its_body() {
        assert_eq!(
            problems("(. as $x | $x), $x", &[]),
            vec!["$x is not defined".to_string()]
        );
        assert_eq!(
            problems("reduce $i as $i (0; .)", &[]),
            vec!["$i is not defined".to_string()]
        );
    }
}
