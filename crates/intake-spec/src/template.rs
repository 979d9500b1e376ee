//! Template variable substitution for questionnaire display text.

use std::collections::BTreeMap;

use handlebars::{Handlebars, RenderError, no_escape};
use thiserror::Error;

use crate::spec::Questionnaire;

pub type TemplateVars = BTreeMap<String, String>;

/// Modes describing how missing variables are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Missing variables emit an error.
    Strict,
    /// Missing variables render as empty text.
    Lenient,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to render template in {field}: {source}")]
    Render {
        field: String,
        #[source]
        source: Box<RenderError>,
    },
}

struct Renderer<'a> {
    engine: Handlebars<'static>,
    vars: &'a TemplateVars,
}

impl Renderer<'_> {
    fn render(&self, field: &str, text: &mut String) -> Result<(), TemplateError> {
        if !text.contains("{{") {
            return Ok(());
        }
        *text = self
            .engine
            .render_template(text.as_str(), self.vars)
            .map_err(|source| TemplateError::Render {
                field: field.to_string(),
                source: Box::new(source),
            })?;
        Ok(())
    }
}

/// Renders `{{variable}}` placeholders in every display string of the
/// questionnaire. Ids, option values and conditions are left untouched.
pub fn substitute_variables(
    questionnaire: &mut Questionnaire,
    vars: &TemplateVars,
    mode: ResolutionMode,
) -> Result<(), TemplateError> {
    let mut engine = Handlebars::new();
    engine.set_strict_mode(mode == ResolutionMode::Strict);
    engine.register_escape_fn(no_escape);
    let renderer = Renderer { engine, vars };

    renderer.render("questionnaire.title", &mut questionnaire.title)?;
    for step in &mut questionnaire.steps {
        renderer.render(&format!("steps.{}.title", step.id), &mut step.title)?;
        if let Some(description) = step.description.as_mut() {
            renderer.render(&format!("steps.{}.description", step.id), description)?;
        }
        for question in &mut step.questions {
            let field = format!("questions.{}", question.id);
            renderer.render(&field, &mut question.question_text)?;
            if let Some(placeholder) = question.placeholder.as_mut() {
                renderer.render(&format!("{field}.placeholder"), placeholder)?;
            }
            for option in &mut question.options {
                renderer.render(
                    &format!("{field}.options.{}", option.id),
                    &mut option.option_text,
                )?;
            }
        }
    }
    Ok(())
}
