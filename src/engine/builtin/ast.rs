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

//! Filter syntax tree

use super::functions::Native;
use crate::engine::EngineValue;
use std::rc::Rc;

/// Shared filter node
pub(crate) type FilterRef = Rc<Filter>;

/// Binary operators evaluated over the cartesian product of their operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone)]
pub(crate) enum InterpPart {
    Text(String),
    Expr(FilterRef),
}

#[derive(Debug, Clone)]
pub(crate) enum Filter {
    /// `.`
    Identity,
    /// `..`
    Recurse,
    Literal(EngineValue),
    /// String with `\(...)` interpolations
    Interpolated(Vec<InterpPart>),
    Variable {
        name: String,
        offset: usize,
    },
    /// `target[key]`, also `.foo` and `."foo"`
    Index {
        target: FilterRef,
        key: FilterRef,
    },
    /// `target[from:to]`
    Slice {
        target: FilterRef,
        from: Option<FilterRef>,
        to: Option<FilterRef>,
    },
    /// `target[]`
    Iterate(FilterRef),
    Pipe(FilterRef, FilterRef),
    Comma(FilterRef, FilterRef),
    Negate(FilterRef),
    Binary {
        op: BinaryOp,
        lhs: FilterRef,
        rhs: FilterRef,
    },
    And(FilterRef, FilterRef),
    Or(FilterRef, FilterRef),
    /// `lhs // rhs`
    Alternative(FilterRef, FilterRef),
    /// `[body]`
    Array(Option<FilterRef>),
    /// `{key: value, ...}`
    Object(Vec<(FilterRef, FilterRef)>),
    If {
        cond: FilterRef,
        then: FilterRef,
        otherwise: FilterRef,
    },
    /// `try body catch handler`, `body?`
    Try {
        body: FilterRef,
        handler: Option<FilterRef>,
    },
    /// `reduce source as $name (init; update)`
    Reduce {
        source: FilterRef,
        name: String,
        init: FilterRef,
        update: FilterRef,
    },
    /// `source as $name | body`
    Bind {
        source: FilterRef,
        name: String,
        body: FilterRef,
    },
    Call {
        name: String,
        args: Vec<FilterRef>,
        native: Option<Native>,
        offset: usize,
    },
}

impl Filter {
    pub(crate) fn literal(value: impl Into<EngineValue>) -> FilterRef {
        Rc::new(Filter::Literal(value.into()))
    }

    pub(crate) fn identity() -> FilterRef {
        Rc::new(Filter::Identity)
    }

    pub(crate) fn field(target: FilterRef, name: &str) -> FilterRef {
        Rc::new(Filter::Index {
            target,
            key: Filter::literal(name),
        })
    }
}
