use std::path::Path;

use itertools::Itertools;
use thiserror::Error;

use crate::{extract::RunFile, table::Value};

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("template `{template}` references `{{{placeholder}}}` which is not a parameter")]
    UnresolvedPlaceholder {
        template: String,
        placeholder: String,
    },
}

/// Cartesian product of parameter choices expanded through a filename
/// template, in parameter declaration order. Parameters not referenced by the
/// template are still attached to every run (e.g. a constant label).
#[derive(Debug, Clone)]
pub struct RunMatrix {
    template: String,
    params: Vec<(String, Vec<Value>)>,
}

impl RunMatrix {
    pub fn new(template: impl Into<String>) -> RunMatrix {
        RunMatrix {
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn param<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> RunMatrix {
        self.params
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn files(&self, base: &Path) -> Result<Vec<RunFile>, MatrixError> {
        if self.params.is_empty() {
            let name = self.format(&[])?;
            return Ok(vec![RunFile {
                path: base.join(name),
                params: Vec::new(),
            }]);
        }

        let mut out = Vec::new();
        for combo in self
            .params
            .iter()
            .map(|(_, vs)| vs.iter())
            .multi_cartesian_product()
        {
            let params: Vec<(String, Value)> = self
                .params
                .iter()
                .zip(&combo)
                .map(|((k, _), v)| (k.clone(), (*v).clone()))
                .collect();
            let name = self.format(&params)?;
            out.push(RunFile {
                path: base.join(name),
                params,
            });
        }
        Ok(out)
    }

    fn format(&self, params: &[(String, Value)]) -> Result<String, MatrixError> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                // Unterminated brace: keep it literal.
                out.push('{');
                rest = after;
                continue;
            };
            let key = &after[..end];
            match params.iter().find(|(k, _)| k == key) {
                Some((_, v)) => out.push_str(&v.to_string()),
                None => {
                    return Err(MatrixError::UnresolvedPlaceholder {
                        template: self.template.clone(),
                        placeholder: key.to_owned(),
                    });
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
