//! Template variables.
//!
//! - Template: `{field|filter:args}` reference syntax
//! - Filters: the `Filter` capability and its registry
//! - Engine: substitution, static validation and preview

pub mod engine;
pub mod filters;
pub mod template;

pub use engine::{
    PreviewResult, PreviewSample, RenderedField, SubstitutionIssue, SubstitutionResult, TemplateField,
    TemplateValidation, VariableEngine,
};
pub use filters::{Filter, FilterRegistry};
pub use template::{extract_variables, parse, ExtractedVariable, FilterCall, Span, Template};
