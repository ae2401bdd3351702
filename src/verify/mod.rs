pub mod labels;

pub use labels::{
    build_label_index, validate_labels, LabelEntry, LabelIndex, LabelIssue, LabelIssueKind,
    LabelValidationError, ValidationMode,
};
