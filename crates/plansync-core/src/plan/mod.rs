//! Plan files: the combined JSON format, legacy format detection, and
//! file-system helpers.

pub mod codec;
pub mod document;
pub mod files;

pub use codec::{PlanFileError, decode_plan, encode_plan};
pub use document::PlanDocument;
pub use files::{
    PlanFileFormat, canonical_plan_path, kml_name_filters, load_name_filters, save_name_filters,
    with_default_extension, write_atomic,
};
