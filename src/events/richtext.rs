//! Schema-tolerant extraction from rich text blocks.
//!
//! Rich text is a tree of `blocks` and nested `elements`. Mentions put the
//! user-authored text at a fixed position in that tree, so extraction is a
//! walk along a known path where every step may find the wrong shape.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// One step in a path through a JSON tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Key(&'static str),
    Index(usize),
}

/// `blocks[0].elements[0].elements[1].text`: the rich text section's second
/// element, which follows the leading `@bot` user element.
pub const MENTION_TEXT_PATH: &[Step] = &[
    Step::Key("blocks"),
    Step::Index(0),
    Step::Key("elements"),
    Step::Index(0),
    Step::Key("elements"),
    Step::Index(1),
    Step::Key("text"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeProblem {
    Missing,
    NotAnObject,
    NotAnArray,
    OutOfRange { len: usize },
    NotAString,
}

impl fmt::Display for ShapeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeProblem::Missing => f.write_str("key does not exist"),
            ShapeProblem::NotAnObject => f.write_str("expected an object"),
            ShapeProblem::NotAnArray => f.write_str("expected an array"),
            ShapeProblem::OutOfRange { len } => write!(f, "index out of range (len {len})"),
            ShapeProblem::NotAString => f.write_str("expected a string"),
        }
    }
}

/// The tree did not have the expected shape at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected shape at {path}: {problem}")]
pub struct ShapeError {
    pub path: String,
    pub problem: ShapeProblem,
}

/// Follow `path` from `root`.
pub fn select<'a>(root: &'a Value, path: &[Step]) -> Result<&'a Value, ShapeError> {
    let mut current = root;
    for (depth, step) in path.iter().enumerate() {
        let fail = |problem| ShapeError {
            path: render(&path[..=depth]),
            problem,
        };
        current = match *step {
            Step::Key(key) => {
                let object = current
                    .as_object()
                    .ok_or_else(|| fail(ShapeProblem::NotAnObject))?;
                object
                    .get(key)
                    .ok_or_else(|| fail(ShapeProblem::Missing))?
            }
            Step::Index(index) => {
                let array = current
                    .as_array()
                    .ok_or_else(|| fail(ShapeProblem::NotAnArray))?;
                array
                    .get(index)
                    .ok_or_else(|| fail(ShapeProblem::OutOfRange { len: array.len() }))?
            }
        };
    }
    Ok(current)
}

/// Follow `path` and require a string leaf.
pub fn select_str<'a>(root: &'a Value, path: &[Step]) -> Result<&'a str, ShapeError> {
    select(root, path)?.as_str().ok_or_else(|| ShapeError {
        path: render(path),
        problem: ShapeProblem::NotAString,
    })
}

/// Text the user wrote after mentioning the app.
pub fn mention_text(event: &Value) -> Result<&str, ShapeError> {
    select_str(event, MENTION_TEXT_PATH)
}

fn render(path: &[Step]) -> String {
    let mut out = String::new();
    for step in path {
        match step {
            Step::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Step::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}
