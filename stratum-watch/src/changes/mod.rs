//! Template-to-template change classification.

mod detector;
mod tag;

pub use detector::{ChangeKind, TemplateChange, TemplateChangeDetector};
pub use tag::{ChangeTag, FieldChange};
