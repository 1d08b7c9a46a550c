//! NER entity oracle
//!
//! Expected entities come from the same pipeline the demo app runs:
//! spaCy is invoked out of process and its (span, label) pairs become
//! the assertions against the rendered markup.

use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Model the demo app selects by default.
pub const DEFAULT_MODEL: &str = "en_core_web_sm";

/// One named entity predicted for the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

impl Entity {
    /// The form the demo app renders inside an annotation: the span
    /// text followed by its label.
    pub fn rendered(&self) -> String {
        format!("{} {}", self.text, self.label)
    }
}

/// Computes ground-truth entities with a spaCy model.
#[derive(Debug, Clone)]
pub struct EntityOracle {
    model: String,
    python: String,
}

impl EntityOracle {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            python: "python3".to_string(),
        }
    }

    /// Override the Python interpreter (e.g. a venv path).
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Check that the interpreter can import spaCy.
    pub fn check_available(&self) -> HarnessResult<()> {
        let status = Command::new(&self.python)
            .args(["-c", "import spacy"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => Ok(()),
            _ => Err(HarnessError::Oracle(format!(
                "spaCy not importable via {}",
                self.python
            ))),
        }
    }

    /// Python one-liner the oracle runs. The text goes over stdin so it
    /// needs no shell quoting; the answer is `[[text, label], ...]`
    /// JSON on stdout.
    fn program(&self) -> String {
        format!(
            "import json, sys, spacy\n\
             nlp = spacy.load({model:?})\n\
             doc = nlp(sys.stdin.read())\n\
             print(json.dumps([[e.text, e.label_] for e in doc.ents]))",
            model = self.model
        )
    }

    /// Entities for `text`, in document order.
    pub fn entities(&self, text: &str) -> HarnessResult<Vec<Entity>> {
        let program = self.program();

        let mut child = Command::new(&self.python)
            .args(["-c", &program])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HarnessError::Oracle(format!("{}: {}", self.python, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(HarnessError::Oracle(format!(
                "pipeline exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pairs: Vec<(String, String)> = serde_json::from_slice(&output.stdout)?;
        debug!("oracle produced {} entities", pairs.len());

        Ok(pairs
            .into_iter()
            .map(|(text, label)| Entity { text, label })
            .collect())
    }
}

impl Default for EntityOracle {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_matches_the_annotation_markup() {
        let entity = Entity {
            text: "David Robert Jones".to_string(),
            label: "PERSON".to_string(),
        };
        assert_eq!(entity.rendered(), "David Robert Jones PERSON");
    }

    #[test]
    fn pipeline_output_parses_as_pairs() {
        let json = r#"[["David Robert Jones", "PERSON"], ["8 January 1947", "DATE"]]"#;
        let pairs: Vec<(String, String)> = serde_json::from_str(json).expect("valid pairs");

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].1, "DATE");
    }

    #[test]
    fn generated_program_loads_the_configured_model() {
        let program = EntityOracle::new("en_core_web_lg").program();

        assert!(program.contains(r#"spacy.load("en_core_web_lg")"#));
        assert!(program.contains("sys.stdin.read()"));
    }
}
